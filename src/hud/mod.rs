//! Visual confirmation cue boundary
//!
//! The on-screen indicator itself lives in a separate overlay process; the
//! daemon only decides when it should appear and disappear.

use tokio::sync::broadcast;
use tracing::debug;

use crate::ipc::Notification;

/// The on-screen confirmation indicator.
///
/// Both calls are idempotent: showing an already-visible indicator and
/// dismissing an already-hidden one are no-ops. The guard driver relies on
/// this when a stale delayed dismiss fires after a new attempt started.
pub trait Hud: Send + Sync {
    /// Display the indicator
    fn show(&self);

    /// Hide the indicator
    fn dismiss(&self);
}

/// Production cue: publishes show/dismiss over the IPC notification channel
/// for the subscribed overlay process to render.
pub struct NotifyHud {
    notify_tx: broadcast::Sender<Notification>,
}

impl NotifyHud {
    /// Create a cue publishing on the given notification channel
    pub fn new(notify_tx: broadcast::Sender<Notification>) -> Self {
        Self { notify_tx }
    }
}

impl Hud for NotifyHud {
    fn show(&self) {
        debug!("hud show");
        // No subscribers simply means no overlay is connected yet.
        let _ = self.notify_tx.send(Notification::HudShow);
    }

    fn dismiss(&self) {
        debug!("hud dismiss");
        let _ = self.notify_tx.send(Notification::HudDismiss);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_hud_publishes() {
        let (tx, mut rx) = broadcast::channel(8);
        let hud = NotifyHud::new(tx);

        hud.show();
        hud.dismiss();

        assert_eq!(rx.try_recv().unwrap(), Notification::HudShow);
        assert_eq!(rx.try_recv().unwrap(), Notification::HudDismiss);
    }

    #[test]
    fn test_notify_hud_without_subscribers_is_silent() {
        let (tx, _) = broadcast::channel(8);
        let hud = NotifyHud::new(tx);

        // Must not panic or error when the overlay is not connected.
        hud.show();
        hud.dismiss();
        hud.dismiss();
    }
}
