use wasm_bindgen::JsValue;

use crate::engine::EngineError;
use crate::model::ModelError;

pub type Result<T> = std::result::Result<T, ViewerError>;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// No WebGPU support, no adapter, device rejected, or pipeline creation failed.
    /// Recovered by falling back to the software backend.
    #[error("hardware rendering unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("failed to fetch {what}: {reason}")]
    StartupData { what: String, reason: String },

    #[error("invalid model data: {0}")]
    Model(#[from] ModelError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("texture decode failed: {0}")]
    Texture(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("browser API error: {0}")]
    Js(String),
}

impl ViewerError {
    pub fn hardware(reason: impl Into<String>) -> Self {
        Self::HardwareUnavailable(reason.into())
    }

    pub fn startup(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StartupData {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a thrown JS value, keeping its string form when it has one.
    pub fn js(value: JsValue) -> Self {
        Self::Js(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
    }
}

impl From<ViewerError> for JsValue {
    fn from(err: ViewerError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}
