use std::cell::RefCell;
use std::rc::Rc;

use url::form_urlencoded;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, HtmlCanvasElement, KeyboardEvent, Response, Window};

use crate::backend::RenderBackend;
use crate::config::ViewerConfig;
use crate::engine::{NumericEngine, SceneEngine};
use crate::error::{Result, ViewerError};
use crate::input::Key;
use crate::model::ModelData;
use crate::packer::pack_geometry;
use crate::performance::{self, fps_label, FrameTimer, PerformanceSnapshot};
use crate::selector::select_backend;
use crate::session::{run_frame, Session};
use crate::textures::{TextureImage, TextureSet, TextureSlot};
use crate::utils;

const CANVAS_ID: &str = "viewer-canvas";
const RENDERER_INFO_ID: &str = "renderer-info";
const FPS_LABEL_ID: &str = "fps-label";

struct ViewerState {
    engine: SceneEngine,
    backend: Box<dyn RenderBackend>,
    session: Session,
    timer: FrameTimer,
    fps_label: Option<web_sys::Element>,
}

impl ViewerState {
    fn tick(&mut self) {
        let ViewerState {
            engine,
            backend,
            session,
            timer,
            fps_label: label,
        } = self;
        match run_frame(session, engine, backend.as_mut(), timer, performance::now()) {
            Ok(Some(fps)) => {
                if let Some(label) = label {
                    label.set_text_content(Some(&fps_label(fps)));
                }
            }
            Ok(None) => {}
            Err(e) => log::error!("frame failed: {e}"),
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.engine.resize(width, height);
        self.backend.resize(width, height);
    }
}

/// Handle returned to JS once the frame loop is running.
#[wasm_bindgen]
pub struct Viewer {
    state: Rc<RefCell<ViewerState>>,
}

#[wasm_bindgen]
impl Viewer {
    pub fn backend(&self) -> String {
        self.state.borrow().backend.kind().label().to_string()
    }

    pub fn performance(&self) -> PerformanceSnapshot {
        self.state.borrow().timer.snapshot(performance::now())
    }
}

/// Loads the configured model and starts rendering into `#viewer-canvas`.
#[wasm_bindgen]
pub async fn start_viewer() -> std::result::Result<Viewer, JsValue> {
    utils::init();
    Ok(start().await?)
}

async fn start() -> Result<Viewer> {
    let config = ViewerConfig::from_location()?;
    log::info!("starting viewer with {:?}", config);

    let window = web_sys::window().ok_or_else(|| ViewerError::Js("no window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| ViewerError::Js("no document".into()))?;

    let canvas = find_canvas(&document)?;
    let (width, height) = window_size(&window);
    canvas.set_width(width);
    canvas.set_height(height);

    let (mut backend, selector) = select_backend(canvas, config.fallback).await?;
    if let Some(info) = document.get_element_by_id(RENDERER_INFO_ID) {
        info.set_text_content(Some(&selector.describe()));
    }

    let model = match fetch_model(&window, &config.model_name).await {
        Ok(model) => model,
        Err(e) => {
            alert(&window, "Cannot fetch model");
            return Err(e);
        }
    };
    let textures = fetch_textures(&window, &config).await;

    let mut engine = SceneEngine::new(width, height);
    let object = engine.new_object();
    engine.set_scale(object, config.model_scale);
    model.load_into(&mut engine, object)?;

    backend.configure_engine(&mut engine, object, &textures);
    backend.update_textures(&textures)?;
    backend.update_vertex_data(&pack_geometry(&engine, object))?;

    let state = Rc::new(RefCell::new(ViewerState {
        engine,
        backend,
        session: Session::new(object, &config),
        timer: FrameTimer::new(),
        fps_label: document.get_element_by_id(FPS_LABEL_ID),
    }));

    install_key_listeners(&window, &state)?;
    install_resize_listener(&window, &state)?;
    start_frame_loop(state.clone())?;

    Ok(Viewer { state })
}

fn find_canvas(document: &Document) -> Result<HtmlCanvasElement> {
    document
        .get_element_by_id(CANVAS_ID)
        .ok_or_else(|| ViewerError::Js(format!("missing #{CANVAS_ID}")))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| ViewerError::Js(format!("#{CANVAS_ID} is not a canvas")))
}

fn window_size(window: &Window) -> (u32, u32) {
    let dimension = |value: std::result::Result<JsValue, JsValue>| {
        value.ok().and_then(|v| v.as_f64()).map_or(1, |v| v.max(1.0) as u32)
    };
    (dimension(window.inner_width()), dimension(window.inner_height()))
}

fn alert(window: &Window, message: &str) {
    if window.alert_with_message(message).is_err() {
        log::error!("{message}");
    }
}

async fn fetch_response(window: &Window, url: &str) -> Result<Response> {
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|e| ViewerError::startup(url, ViewerError::js(e).to_string()))?;
    let response: Response = response
        .dyn_into()
        .map_err(|_| ViewerError::startup(url, "not a Response"))?;
    if !response.ok() {
        return Err(ViewerError::startup(url, format!("HTTP {}", response.status())));
    }
    Ok(response)
}

async fn fetch_model(window: &Window, model_name: &str) -> Result<ModelData> {
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("model-name", model_name)
        .finish();
    let url = format!("/raw/model?{query}");
    let response = fetch_response(window, &url).await?;
    let text = JsFuture::from(response.text().map_err(ViewerError::js)?)
        .await
        .map_err(ViewerError::js)?
        .as_string()
        .ok_or_else(|| ViewerError::startup(&url, "body is not text"))?;
    Ok(ModelData::from_json(&text)?)
}

async fn fetch_texture(window: &Window, url: &str) -> Result<TextureImage> {
    let response = fetch_response(window, url).await?;
    let buffer = JsFuture::from(response.array_buffer().map_err(ViewerError::js)?)
        .await
        .map_err(ViewerError::js)?;
    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
    TextureImage::decode(&bytes)
}

/// Fetches every enabled map. A missing map keeps its default; all but the
/// emission map are announced to the user.
async fn fetch_textures(window: &Window, config: &ViewerConfig) -> TextureSet {
    let mut textures = TextureSet::new();
    for slot in TextureSlot::ALL {
        if !config.map_enabled(slot) {
            continue;
        }
        let url = format!("/source/{}/{}", config.model_name, slot.file_name());
        match fetch_texture(window, &url).await {
            Ok(image) => textures.set(slot, Some(image)),
            Err(e) => {
                log::warn!("{} map unavailable: {e}", slot.label());
                if slot != TextureSlot::Emission {
                    alert(
                        window,
                        &format!("Cannot fetch {} map", slot.label().to_lowercase()),
                    );
                }
            }
        }
    }
    textures
}

fn install_key_listeners(window: &Window, state: &Rc<RefCell<ViewerState>>) -> Result<()> {
    let down_state = state.clone();
    let keydown = Closure::wrap(Box::new(move |event: KeyboardEvent| {
        if let Some(key) = Key::from_code(&event.code()) {
            event.prevent_default();
            down_state.borrow_mut().session.key_down(key);
        }
    }) as Box<dyn FnMut(KeyboardEvent)>);
    window
        .add_event_listener_with_callback("keydown", keydown.as_ref().unchecked_ref())
        .map_err(ViewerError::js)?;
    keydown.forget();

    let up_state = state.clone();
    let keyup = Closure::wrap(Box::new(move |event: KeyboardEvent| {
        if let Some(key) = Key::from_code(&event.code()) {
            up_state.borrow_mut().session.key_up(key);
        }
    }) as Box<dyn FnMut(KeyboardEvent)>);
    window
        .add_event_listener_with_callback("keyup", keyup.as_ref().unchecked_ref())
        .map_err(ViewerError::js)?;
    keyup.forget();
    Ok(())
}

fn install_resize_listener(window: &Window, state: &Rc<RefCell<ViewerState>>) -> Result<()> {
    let resize_state = state.clone();
    let onresize = Closure::wrap(Box::new(move || {
        let Some(window) = web_sys::window() else {
            return;
        };
        let (width, height) = window_size(&window);
        // Look the canvas up again; the software backend may have swapped it.
        if let Some(canvas) = window.document().and_then(|d| find_canvas(&d).ok()) {
            canvas.set_width(width);
            canvas.set_height(height);
        }
        resize_state.borrow_mut().resize(width, height);
    }) as Box<dyn FnMut()>);
    window
        .add_event_listener_with_callback("resize", onresize.as_ref().unchecked_ref())
        .map_err(ViewerError::js)?;
    onresize.forget();
    Ok(())
}

fn request_animation_frame(callback: &Closure<dyn FnMut()>) -> Result<()> {
    web_sys::window()
        .ok_or_else(|| ViewerError::Js("no window".into()))?
        .request_animation_frame(callback.as_ref().unchecked_ref())
        .map(|_| ())
        .map_err(ViewerError::js)
}

/// Re-schedules itself every animation frame until the page goes away.
fn start_frame_loop(state: Rc<RefCell<ViewerState>>) -> Result<()> {
    let frame: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
    let next = frame.clone();

    *frame.borrow_mut() = Some(Closure::wrap(Box::new(move || {
        state.borrow_mut().tick();
        if let Some(callback) = next.borrow().as_ref() {
            if let Err(e) = request_animation_frame(callback) {
                log::error!("frame loop stopped: {e}");
            }
        }
    }) as Box<dyn FnMut()>));

    let scheduled = match frame.borrow().as_ref() {
        Some(callback) => request_animation_frame(callback),
        None => Ok(()),
    };
    scheduled
}
