//! Focus restoration after a capability is granted.
//!
//! Granting a permission usually happens in a system settings window. Once
//! the grant is observed, the application brings itself back to the
//! foreground, activating from whichever process was frontmost, or with a
//! plain activate when that cannot be determined.

use serde::Serialize;
use tracing::debug;

/// A running process that can hand focus back to us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRef {
    pub pid: u32,
    pub name: Option<String>,
}

/// Platform hooks for bringing the current process to the foreground.
///
/// Implementations wrap OS UI APIs and are called on the UI queue.
pub trait FocusRestorer: Send + Sync {
    /// The process currently in the foreground, if known.
    fn frontmost(&self) -> Option<ProcessRef>;

    /// Activate the current process, taking focus from `previous`.
    fn activate_from(&self, previous: &ProcessRef);

    /// Activate the current process without a known predecessor.
    fn activate(&self);
}

/// Restorer for headless use. Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFocus;

impl FocusRestorer for NoopFocus {
    fn frontmost(&self) -> Option<ProcessRef> {
        None
    }

    fn activate_from(&self, _previous: &ProcessRef) {}

    fn activate(&self) {}
}

/// Bring the current process forward, preferring to activate from the
/// frontmost process.
pub fn restore_focus(restorer: &dyn FocusRestorer) {
    match restorer.frontmost() {
        Some(previous) => {
            debug!(pid = previous.pid, "Activating from frontmost process");
            restorer.activate_from(&previous);
        }
        None => restorer.activate(),
    }
}
