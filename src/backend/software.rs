use wasm_bindgen::{Clamped, JsCast};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, ImageData};

use super::{BackendKind, RenderBackend};
use crate::engine::{NumericEngine, ObjectHandle};
use crate::error::{Result, ViewerError};
use crate::packer::{GeometryBuffers, UniformBlock};
use crate::textures::TextureSet;

/// Blits the engine's RGBA buffer onto a 2D canvas. The engine owns geometry,
/// textures and rasterization, so the update calls have nothing to upload.
pub struct SoftwareBackend {
    context: CanvasRenderingContext2d,
}

impl SoftwareBackend {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let context = match context_2d(&canvas)? {
            Some(context) => context,
            None => {
                // A failed hardware attempt may already own the canvas.
                log::warn!("canvas already has a GPU context, replacing it");
                let fresh = replace_canvas(&canvas)?;
                context_2d(&fresh)?
                    .ok_or_else(|| ViewerError::Js("2d context unavailable".into()))?
            }
        };
        log::info!("software backend ready");
        Ok(Self { context })
    }
}

fn context_2d(canvas: &HtmlCanvasElement) -> Result<Option<CanvasRenderingContext2d>> {
    let context = canvas.get_context("2d").map_err(ViewerError::js)?;
    Ok(context.and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok()))
}

fn replace_canvas(canvas: &HtmlCanvasElement) -> Result<HtmlCanvasElement> {
    let fresh = canvas
        .clone_node()
        .map_err(ViewerError::js)?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| ViewerError::Js("cloned node is not a canvas".into()))?;
    let parent = canvas
        .parent_node()
        .ok_or_else(|| ViewerError::Js("canvas is not attached".into()))?;
    parent.replace_child(&fresh, canvas).map_err(ViewerError::js)?;
    Ok(fresh)
}

impl RenderBackend for SoftwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn configure_engine(
        &self,
        engine: &mut dyn NumericEngine,
        object: ObjectHandle,
        textures: &TextureSet,
    ) {
        engine.set_raster_output(true);
        for slot in textures.present() {
            engine.set_texture(object, slot, textures.get(slot).cloned());
        }
    }

    fn update_vertex_data(&mut self, geometry: &GeometryBuffers) -> Result<()> {
        log::debug!("software backend draws {} vertices from the engine", geometry.vertices.len());
        Ok(())
    }

    fn update_uniforms(&mut self, _uniforms: &UniformBlock) {}

    fn update_textures(&mut self, _textures: &TextureSet) -> Result<()> {
        Ok(())
    }

    fn render(&mut self, engine: &dyn NumericEngine) -> Result<()> {
        let (width, height) = engine.frame_size();
        if width == 0 || height == 0 {
            return Ok(());
        }
        let pixels = engine.pixels();
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ViewerError::Js(format!(
                "pixel buffer has {} bytes, expected {expected}",
                pixels.len()
            )));
        }

        let image = ImageData::new_with_u8_clamped_array_and_sh(Clamped(pixels), width, height)
            .map_err(ViewerError::js)?;
        self.context
            .put_image_data(&image, 0.0, 0.0)
            .map_err(ViewerError::js)
    }

    fn resize(&mut self, width: u32, height: u32) {
        log::debug!("software frame is now {}x{}", width, height);
    }
}
