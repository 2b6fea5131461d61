//! Input event hook for the guarded quit shortcut
//!
//! Uses macOS CGEventTaps to intercept key-down and key-up events for the
//! monitored combination before they reach the foreground application.

mod keys;
mod listener;

pub use keys::KeyCombination;
pub use listener::{TapError, TapListener};
