//! Navigation seam for session loss
//!
//! When the session ends the client signals a hard redirect to the sign-in
//! route. What "redirect" means belongs to the host: a browser shell changes
//! location, the CLI prints a sign-in hint.

use tracing::warn;

use crate::attempt::SessionLoss;

/// Host-side handler for forced navigation.
pub trait Navigator: Send + Sync {
    /// Navigate to `route`, discarding the current view.
    fn redirect(&self, route: &str, reason: SessionLoss);
}

/// Navigator that only logs. Used when the host has nothing to navigate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, route: &str, reason: SessionLoss) {
        warn!(route, reason = reason.label(), "session ended, redirecting to sign-in");
    }
}
