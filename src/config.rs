use url::form_urlencoded;

use crate::textures::TextureSlot;

/// Viewer options read from the page query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub model_name: String,
    pub camera_speed: f32,
    pub rotation_speed: f32,
    pub model_scale: f32,
    pub diffuse_map: bool,
    pub normal_map: bool,
    pub specular_map: bool,
    pub emission_map: bool,
    pub model_rotation: bool,
    /// Skip the hardware backend and render in software.
    pub fallback: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            model_name: "Head".to_string(),
            camera_speed: 0.05,
            rotation_speed: 0.01,
            model_scale: 0.1,
            diffuse_map: true,
            normal_map: true,
            specular_map: true,
            emission_map: true,
            model_rotation: false,
            fallback: false,
        }
    }
}

impl ViewerConfig {
    /// Parses `?key=value&...`; unknown keys are ignored, malformed numbers
    /// keep their default.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut config = Self::default();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "model-name" => config.model_name = value.into_owned(),
                "camera-speed" => config.camera_speed = parse_float(&key, &value, config.camera_speed),
                "rotation-speed" => {
                    config.rotation_speed = parse_float(&key, &value, config.rotation_speed)
                }
                "model-scale" => config.model_scale = parse_float(&key, &value, config.model_scale),
                "diffuse-map" => config.diffuse_map = value == "true",
                "normal-map" => config.normal_map = value == "true",
                "specular-map" => config.specular_map = value == "true",
                "emission-map" => config.emission_map = value == "true",
                "model-rotation" => config.model_rotation = value == "true",
                "fallback" => config.fallback = value == "true",
                other => log::debug!("ignoring query parameter {other}"),
            }
        }
        config
    }

    #[cfg(target_arch = "wasm32")]
    pub fn from_location() -> crate::error::Result<Self> {
        let window = web_sys::window()
            .ok_or_else(|| crate::error::ViewerError::Js("no window".into()))?;
        let search = window
            .location()
            .search()
            .map_err(crate::error::ViewerError::js)?;
        Ok(Self::from_query(&search))
    }

    pub fn map_enabled(&self, slot: TextureSlot) -> bool {
        match slot {
            TextureSlot::Diffuse => self.diffuse_map,
            TextureSlot::Normal => self.normal_map,
            TextureSlot::Specular => self.specular_map,
            TextureSlot::Emission => self.emission_map,
        }
    }
}

fn parse_float(key: &str, value: &str, default: f32) -> f32 {
    match value.parse::<f32>() {
        Ok(parsed) if parsed.is_finite() => parsed,
        _ => {
            log::warn!("invalid value {value:?} for {key}, using {default}");
            default
        }
    }
}
