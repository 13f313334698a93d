use crate::backend::BackendKind;
use crate::error::ViewerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Uninitialized,
    ProbingHardware,
    HardwareActive,
    SoftwareActive,
}

/// Decides once per session which backend renders.
/// `Uninitialized -> ProbingHardware -> {HardwareActive | SoftwareActive}`,
/// or straight to `SoftwareActive` when fallback was requested. Both active
/// states are terminal.
#[derive(Debug)]
pub struct BackendSelector {
    state: BackendState,
    fallback_reason: Option<String>,
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendSelector {
    pub fn new() -> Self {
        Self {
            state: BackendState::Uninitialized,
            fallback_reason: None,
        }
    }

    pub fn state(&self) -> BackendState {
        self.state
    }

    /// Returns `true` when the caller should try the hardware backend.
    pub fn begin(&mut self, fallback_requested: bool) -> bool {
        if self.state != BackendState::Uninitialized {
            log::warn!("backend selection already started ({:?})", self.state);
            return false;
        }
        if fallback_requested {
            log::info!("software rendering requested");
            self.fallback_reason = Some("requested".to_string());
            self.state = BackendState::SoftwareActive;
            false
        } else {
            self.state = BackendState::ProbingHardware;
            true
        }
    }

    pub fn hardware_succeeded(&mut self) {
        if self.state == BackendState::ProbingHardware {
            log::info!("hardware backend active");
            self.state = BackendState::HardwareActive;
        } else {
            log::warn!("ignoring hardware success in state {:?}", self.state);
        }
    }

    pub fn hardware_failed(&mut self, err: &ViewerError) {
        if self.state == BackendState::ProbingHardware {
            log::warn!("falling back to software rendering: {err}");
            self.fallback_reason = Some(err.to_string());
            self.state = BackendState::SoftwareActive;
        } else {
            log::warn!("ignoring hardware failure in state {:?}: {err}", self.state);
        }
    }

    pub fn active(&self) -> Option<BackendKind> {
        match self.state {
            BackendState::HardwareActive => Some(BackendKind::Hardware),
            BackendState::SoftwareActive => Some(BackendKind::Software),
            _ => None,
        }
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Text for the renderer info element.
    pub fn describe(&self) -> String {
        match (self.active(), self.fallback_reason()) {
            (Some(BackendKind::Software), Some(reason)) => {
                format!("Renderer: {} ({reason})", BackendKind::Software.label())
            }
            (Some(kind), _) => format!("Renderer: {}", kind.label()),
            (None, _) => "Renderer: initializing".to_string(),
        }
    }
}

/// Picks and initializes the backend for `canvas`. Hardware failures are
/// logged and demoted to the software backend.
#[cfg(target_arch = "wasm32")]
pub async fn select_backend(
    canvas: web_sys::HtmlCanvasElement,
    fallback_requested: bool,
) -> crate::error::Result<(Box<dyn crate::backend::RenderBackend>, BackendSelector)> {
    use crate::backend::{HardwareBackend, SoftwareBackend};

    let mut selector = BackendSelector::new();
    if selector.begin(fallback_requested) {
        match HardwareBackend::new(canvas.clone()).await {
            Ok(hardware) => {
                selector.hardware_succeeded();
                return Ok((Box::new(hardware), selector));
            }
            Err(err) => selector.hardware_failed(&err),
        }
    }
    let software = SoftwareBackend::new(canvas)?;
    Ok((Box::new(software), selector))
}
