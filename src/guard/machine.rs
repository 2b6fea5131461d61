//! Press-counting confirmation state machine
//!
//! Owns the `tries` counter and the `armed` flag. Two conceptual states:
//! counting (armed) and escalated (disarmed, the quit was allowed through).
//! Runs on the tap thread; both handlers are dispatched serialized on the
//! tap run loop, so the fields need no synchronization.
//!
//! Side effects leave only as [`GuardEvent`]s on the broadcast channel; the
//! machine never calls the HUD or the ledger itself.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::events::GuardEvent;

/// What the tap callback should do with the current key-down event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDecision {
    /// Deliver the event to the foreground application unchanged
    Forward,
    /// Drop the event; the application never sees it
    Suppress,
}

/// The quit confirmation state machine
pub struct GuardMachine {
    /// Qualifying key-downs seen since the last reset
    tries: u32,
    /// False only between escalation and the next key-up
    armed: bool,
    /// Presses swallowed before escalation; the next press quits
    threshold: u32,
    /// Channel for emitting guard events
    event_tx: broadcast::Sender<GuardEvent>,
}

impl GuardMachine {
    /// Create a new machine, armed with zero tries
    pub fn new(threshold: u32, event_tx: broadcast::Sender<GuardEvent>) -> Self {
        Self {
            tries: 0,
            armed: true,
            threshold,
            event_tx,
        }
    }

    /// Qualifying key-downs counted so far
    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// Whether a fresh quit attempt may begin counting
    pub fn armed(&self) -> bool {
        self.armed
    }

    /// Handle a key-down for the monitored combination.
    ///
    /// Swallows and counts the first `threshold` presses while showing the
    /// confirmation cue; the press after that crosses the escalation
    /// transition and is forwarded so the quit goes through. Once escalated,
    /// further presses in the same hold are swallowed silently so the
    /// applications behind the quitting one do not quit as well.
    pub fn on_quit_key_down(&mut self) -> TapDecision {
        if self.armed && self.tries <= self.threshold {
            self.emit(GuardEvent::CueShow);
        }

        self.tries += 1;

        if self.tries > self.threshold && self.armed {
            debug!(tries = self.tries, "confirmation threshold crossed");
            self.tries = 0;
            self.armed = false;
            self.emit(GuardEvent::CueDismiss);
            self.emit(GuardEvent::QuitAllowed);
            return TapDecision::Forward;
        }

        debug!(tries = self.tries, "quit key-down swallowed");
        TapDecision::Suppress
    }

    /// Handle a key-up for the monitored combination.
    ///
    /// An armed release means the user backed out before confirming: the cue
    /// lingers briefly and one prevented quit is recorded. A disarmed
    /// release follows an allowed quit: the cue is dismissed at once and
    /// nothing is recorded. Either way the machine re-arms with zero tries.
    pub fn on_quit_key_up(&mut self) {
        if self.armed && self.tries <= self.threshold {
            info!(swallowed = self.tries, "accidental quit prevented");
            self.emit(GuardEvent::CueDismissDelayed);
            self.emit(GuardEvent::QuitPrevented {
                swallowed: self.tries,
            });
        } else {
            self.emit(GuardEvent::CueDismiss);
        }

        self.tries = 0;
        self.armed = true;
    }

    fn emit(&self, event: GuardEvent) {
        debug!(%event, "emitting guard event");
        let _ = self.event_tx.send(event);
    }
}
