//! Host-shell integration seam.
//!
//! The mini-app container exposes ambient capabilities (identity hint,
//! haptics, chrome tinting). They enter the engine through this injected
//! adapter rather than being read from process-wide globals.

/// Haptic feedback flavors the host may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VibrationKind {
    /// Light tick, e.g. a message was sent.
    Light,
    /// Notification-style pulse, e.g. a reply arrived.
    Notify,
    /// Error buzz, e.g. a failure notice.
    Error,
}

/// Capabilities provided by the hosting shell.
pub trait PlatformAdapter: Send + Sync {
    /// An identity suggested by the host (e.g. an account already signed
    /// in at the shell level), if any.
    fn identity_hint(&self) -> Option<String> {
        None
    }

    /// Trigger haptic feedback. Best-effort; hosts without haptics ignore it.
    fn vibrate(&self, _kind: VibrationKind) {}

    /// Tint the host chrome to match the active persona's accent color.
    fn set_chrome_color(&self, _color: &str) {}
}

/// Platform adapter that does nothing; used when no host shell is present.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlatform;

impl PlatformAdapter for NullPlatform {}
