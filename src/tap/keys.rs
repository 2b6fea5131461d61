//! The monitored key combination
//!
//! Identifies the quit shortcut by modifier flags, virtual key code, and the
//! command-key character it appears as in application menus.

use core_graphics::event::CGEventFlags;

/// Modifier key flag masks from macOS CGEventFlags
pub mod flags {
    use core_graphics::event::CGEventFlags;

    /// Command key modifier flag
    pub const COMMAND: CGEventFlags = CGEventFlags::CGEventFlagCommand;
}

/// macOS virtual key code for the letter Q on ANSI layouts
pub const KEY_Q: i64 = 12;

/// The modifier+key pairing guarded by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCombination {
    /// Modifier that must be present in the event's flags
    pub modifier: CGEventFlags,
    /// Virtual key code of the letter key
    pub key_code: i64,
    /// Canonical uppercase character the shortcut shows as in menus
    pub menu_char: char,
}

impl KeyCombination {
    /// The conventional quit shortcut, Cmd+Q
    pub const fn command_q() -> Self {
        Self {
            modifier: flags::COMMAND,
            key_code: KEY_Q,
            menu_char: 'Q',
        }
    }

    /// Whether an event with these flags and key code is the monitored
    /// combination. Modifier state is read from the event, so extra
    /// modifiers held alongside the required one still match.
    pub fn matches(&self, event_flags: CGEventFlags, key_code: i64) -> bool {
        event_flags.contains(self.modifier) && key_code == self.key_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_command_q() {
        let combo = KeyCombination::command_q();
        assert!(combo.matches(flags::COMMAND, KEY_Q));
    }

    #[test]
    fn test_missing_modifier_does_not_match() {
        let combo = KeyCombination::command_q();
        assert!(!combo.matches(CGEventFlags::empty(), KEY_Q));
    }

    #[test]
    fn test_wrong_key_code_does_not_match() {
        let combo = KeyCombination::command_q();
        // W sits next to Q on the keyboard
        assert!(!combo.matches(flags::COMMAND, 13));
    }

    #[test]
    fn test_extra_modifiers_still_match() {
        let combo = KeyCombination::command_q();
        let held = flags::COMMAND | CGEventFlags::CGEventFlagShift;
        assert!(combo.matches(held, KEY_Q));
    }
}
