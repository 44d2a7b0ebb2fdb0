use scene::Retired;

use crate::renderer::FramePlan;

/// Which drawing path is live. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    WebGl,
    Canvas2d,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::WebGl => "webgl",
            BackendKind::Canvas2d => "canvas2d",
        }
    }
}

/// Picks the backend: WebGL when preferred and available, else canvas 2D.
pub fn select_backend(prefer_webgl: bool, webgl_available: bool) -> BackendKind {
    if prefer_webgl && webgl_available {
        BackendKind::WebGl
    } else {
        BackendKind::Canvas2d
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The backend was destroyed or never initialized.
    NotReady,
    SurfaceLost(String),
    Backend(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::NotReady => write!(f, "renderer is not ready"),
            RenderError::SurfaceLost(msg) => write!(f, "surface lost: {msg}"),
            RenderError::Backend(msg) => write!(f, "render backend error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// A drawing backend consuming [`FramePlan`]s.
///
/// Backends own every GPU handle they create. `release` frees the buffers of
/// retired animations and `destroy` frees everything; both must be safe to
/// call more than once.
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    fn is_ready(&self) -> bool;

    fn update_size(&mut self, width: u32, height: u32);

    fn render(&mut self, plan: &FramePlan<'_>) -> Result<(), RenderError>;

    fn release(&mut self, retired: &Retired);

    fn destroy(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webgl_needs_both_preference_and_support() {
        assert_eq!(select_backend(true, true), BackendKind::WebGl);
        assert_eq!(select_backend(true, false), BackendKind::Canvas2d);
        assert_eq!(select_backend(false, true), BackendKind::Canvas2d);
        assert_eq!(BackendKind::Canvas2d.name(), "canvas2d");
    }
}
