//! Async driver mapping guard events onto the collaborators
//!
//! Subscribes to the machine's event stream and performs the side effects
//! the tap thread must not block on: HUD show/dismiss, the lingering
//! dismiss after a released attempt, ledger updates, and IPC notifications.
//!
//! The lingering dismiss is fire-and-forget: a new attempt during the
//! linger window re-shows the HUD and the stale dismiss later re-hides an
//! already-hidden or freshly re-shown cue. That is benign because `show`
//! and `dismiss` are idempotent by contract.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::events::GuardEvent;
use crate::hud::Hud;
use crate::ipc::Notification;
use crate::stats::QuitLedger;

/// Drives the HUD and the quit ledger from guard events
pub struct GuardDriver {
    hud: Arc<dyn Hud>,
    ledger: Arc<dyn QuitLedger>,
    notify_tx: broadcast::Sender<Notification>,
    hud_linger: Duration,
}

impl GuardDriver {
    /// Create a new driver
    pub fn new(
        hud: Arc<dyn Hud>,
        ledger: Arc<dyn QuitLedger>,
        notify_tx: broadcast::Sender<Notification>,
        hud_linger: Duration,
    ) -> Self {
        Self {
            hud,
            ledger,
            notify_tx,
            hud_linger,
        }
    }

    /// Run the driver until the guard event channel closes
    pub async fn run(&self, mut event_rx: broadcast::Receiver<GuardEvent>) {
        info!("guard driver started");

        loop {
            match event_rx.recv().await {
                Ok(event) => self.handle_event(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "guard event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("guard driver stopped");
    }

    fn handle_event(&self, event: GuardEvent) {
        match event {
            GuardEvent::CueShow => self.hud.show(),
            GuardEvent::CueDismiss => self.hud.dismiss(),
            GuardEvent::CueDismissDelayed => {
                let hud = Arc::clone(&self.hud);
                let linger = self.hud_linger;
                tokio::spawn(async move {
                    tokio::time::sleep(linger).await;
                    hud.dismiss();
                });
            }
            GuardEvent::QuitPrevented { swallowed } => {
                let total = self.ledger.record_prevented();
                info!(swallowed, total, "recorded prevented quit");
                let _ = self.notify_tx.send(Notification::QuitPrevented { total });
            }
            GuardEvent::QuitAllowed => {
                info!("quit allowed through after repeated presses");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

    use super::*;

    /// Hud fake counting shows minus dismisses
    #[derive(Default)]
    struct RecordingHud {
        shows: AtomicU64,
        balance: AtomicI64,
    }

    impl Hud for RecordingHud {
        fn show(&self) {
            self.shows.fetch_add(1, Ordering::SeqCst);
            self.balance.fetch_add(1, Ordering::SeqCst);
        }

        fn dismiss(&self) {
            self.balance.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingLedger {
        count: AtomicU64,
    }

    impl QuitLedger for RecordingLedger {
        fn record_prevented(&self) -> u64 {
            self.count.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn prevented(&self) -> u64 {
            self.count.load(Ordering::SeqCst)
        }
    }

    fn create_driver() -> (
        GuardDriver,
        Arc<RecordingHud>,
        Arc<RecordingLedger>,
        broadcast::Receiver<Notification>,
    ) {
        let hud = Arc::new(RecordingHud::default());
        let ledger = Arc::new(RecordingLedger::default());
        let (notify_tx, notify_rx) = broadcast::channel(16);
        let driver = GuardDriver::new(
            Arc::clone(&hud) as Arc<dyn Hud>,
            Arc::clone(&ledger) as Arc<dyn QuitLedger>,
            notify_tx,
            Duration::from_secs(1),
        );
        (driver, hud, ledger, notify_rx)
    }

    #[test]
    fn test_show_and_dismiss_follow_events() {
        let (driver, hud, _ledger, _rx) = create_driver();

        driver.handle_event(GuardEvent::CueShow);
        driver.handle_event(GuardEvent::CueShow);
        driver.handle_event(GuardEvent::CueDismiss);

        assert_eq!(hud.shows.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_dismiss_fires_after_linger() {
        let (driver, hud, _ledger, _rx) = create_driver();

        driver.handle_event(GuardEvent::CueShow);
        driver.handle_event(GuardEvent::CueDismissDelayed);
        assert_eq!(hud.balance.load(Ordering::SeqCst), 1, "still visible");

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(hud.balance.load(Ordering::SeqCst), 0, "dismissed after linger");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_dismiss_is_benign_for_idempotent_hud() {
        let (driver, hud, _ledger, _rx) = create_driver();

        // Release schedules a dismiss, then a new attempt re-shows before
        // the linger elapses. The stale dismiss still fires later.
        driver.handle_event(GuardEvent::CueShow);
        driver.handle_event(GuardEvent::CueDismissDelayed);
        tokio::time::sleep(Duration::from_millis(500)).await;
        driver.handle_event(GuardEvent::CueShow);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(hud.shows.load(Ordering::SeqCst), 2);
        // The stale dismiss ran; a real HUD treats the extra dismiss as a
        // no-op and the next CueShow re-displays it.
        assert_eq!(hud.balance.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prevention_increments_ledger_and_notifies() {
        let (driver, _hud, ledger, mut rx) = create_driver();

        driver.handle_event(GuardEvent::QuitPrevented { swallowed: 2 });
        driver.handle_event(GuardEvent::QuitPrevented { swallowed: 1 });

        assert_eq!(ledger.prevented(), 2);
        assert_eq!(rx.try_recv().unwrap(), Notification::QuitPrevented { total: 1 });
        assert_eq!(rx.try_recv().unwrap(), Notification::QuitPrevented { total: 2 });
    }

    #[test]
    fn test_quit_allowed_touches_nothing() {
        let (driver, hud, ledger, mut rx) = create_driver();

        driver.handle_event(GuardEvent::QuitAllowed);

        assert_eq!(hud.shows.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.prevented(), 0);
        assert!(rx.try_recv().is_err());
    }
}
