//! Foreground application lookup via NSWorkspace

use objc::runtime::Object;
use objc::{class, msg_send, sel, sel_impl};

/// The application currently owning the menu bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuBarOwner {
    /// Unix process identifier
    pub pid: i32,
    /// Whether the application still reports ownership of the menu bar
    pub owns_menu_bar: bool,
}

/// Query NSWorkspace for the application that owns the menu bar.
///
/// Returns `None` when no application does (login window, transitions
/// between applications).
pub fn menu_bar_owner() -> Option<MenuBarOwner> {
    unsafe {
        let workspace: *mut Object = msg_send![class!(NSWorkspace), sharedWorkspace];
        let app: *mut Object = msg_send![workspace, menuBarOwningApplication];
        if app.is_null() {
            return None;
        }

        let pid: i32 = msg_send![app, processIdentifier];
        let owns_menu_bar: bool = msg_send![app, ownsMenuBar];

        Some(MenuBarOwner { pid, owns_menu_bar })
    }
}
