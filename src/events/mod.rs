//! Events emitted by the quit guard state machine
//!
//! The machine runs on the event tap thread and never calls its
//! collaborators directly; every side effect is described by one of these
//! events and carried over a broadcast channel to the async driver.

/// Events emitted by the guard machine while counting quit presses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardEvent {
    /// The confirmation HUD should be visible (a press was swallowed)
    CueShow,

    /// The confirmation HUD should be hidden immediately
    CueDismiss,

    /// The confirmation HUD should be hidden after the linger delay
    CueDismissDelayed,

    /// The user released the combination before confirming; one accidental
    /// quit was prevented
    QuitPrevented {
        /// Number of key-downs swallowed during the attempt
        swallowed: u32,
    },

    /// The confirmation threshold was crossed and the quit was forwarded
    QuitAllowed,
}

impl std::fmt::Display for GuardEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardEvent::CueShow => write!(f, "CUE_SHOW"),
            GuardEvent::CueDismiss => write!(f, "CUE_DISMISS"),
            GuardEvent::CueDismissDelayed => write!(f, "CUE_DISMISS_DELAYED"),
            GuardEvent::QuitPrevented { swallowed } => {
                write!(f, "QUIT_PREVENTED ({} swallowed)", swallowed)
            }
            GuardEvent::QuitAllowed => write!(f, "QUIT_ALLOWED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = GuardEvent::QuitPrevented { swallowed: 3 };
        assert_eq!(event.to_string(), "QUIT_PREVENTED (3 swallowed)");
        assert_eq!(GuardEvent::CueShow.to_string(), "CUE_SHOW");
    }
}
