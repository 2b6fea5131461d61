//! Menu shortcut inspection via the accessibility tree
//!
//! Answers whether the foreground application currently binds the monitored
//! command-key character to a menu item. The lookup is positional, matching
//! the menu layout macOS applications follow in practice: top-level item 0
//! is the application's own menu, so the scan takes item 1 and descends into
//! its first submenu. Localized or unconventional menu layouts can defeat
//! this; the failure mode is answering false, which forwards the event.
//!
//! Every missing or empty attribute along the walk answers false. Nothing
//! here is an error: an application we cannot inspect is an application we
//! do not guard.

use std::ffi::c_void;

use core_foundation::base::{CFType, TCFType};
use core_foundation::string::CFString;
use core_foundation_sys::array::{CFArrayGetCount, CFArrayGetValueAtIndex, CFArrayRef};
use core_foundation_sys::base::{CFIndex, CFTypeRef};
use core_foundation_sys::string::CFStringRef;

type AXUIElementRef = *mut c_void;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXUIElementCreateApplication(pid: i32) -> AXUIElementRef;
    fn AXUIElementCopyAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        value: *mut CFTypeRef,
    ) -> i32;
}

// AXError codes
const K_AX_ERROR_SUCCESS: i32 = 0;

// AX attribute names
const K_AX_MENU_BAR_ATTRIBUTE: &str = "AXMenuBar";
const K_AX_CHILDREN_ATTRIBUTE: &str = "AXChildren";
const K_AX_MENU_ITEM_CMD_CHAR_ATTRIBUTE: &str = "AXMenuItemCmdChar";

/// Whether the application's menu bar binds `menu_char` as a command-key
/// shortcut under its first non-application top-level menu.
///
/// The match against `menu_char` is case-sensitive; menu items report the
/// canonical uppercase letter.
pub fn binds_menu_command(pid: i32, menu_char: char) -> bool {
    unsafe {
        let app = AXUIElementCreateApplication(pid);
        if app.is_null() {
            return false;
        }
        let app = CFType::wrap_under_create_rule(app as CFTypeRef);

        let menu_bar = match copy_attr(ax_ref(&app), K_AX_MENU_BAR_ATTRIBUTE) {
            Some(v) => v,
            None => return false,
        };

        let top_items = match copy_children(ax_ref(&menu_bar)) {
            Some(v) => v,
            None => return false,
        };

        // Item 0 is the application menu; the quit shortcut is filed under
        // the next top-level menu.
        let file_menu = match array_item(&top_items, 1) {
            Some(v) => v,
            None => return false,
        };

        let menus = match copy_children(file_menu) {
            Some(v) => v,
            None => return false,
        };
        let submenu = match array_item(&menus, 0) {
            Some(v) => v,
            None => return false,
        };

        let items = match copy_children(submenu) {
            Some(v) => v,
            None => return false,
        };

        let wanted = menu_char.to_string();
        let count = CFArrayGetCount(items.as_CFTypeRef() as CFArrayRef);
        for i in 0..count {
            let item = match array_item(&items, i) {
                Some(v) => v,
                None => continue,
            };
            let cmd_char = copy_string_attr(item, K_AX_MENU_ITEM_CMD_CHAR_ATTRIBUTE);
            if cmd_char.as_deref() == Some(wanted.as_str()) {
                return true;
            }
        }

        false
    }
}

fn ax_ref(element: &CFType) -> AXUIElementRef {
    element.as_CFTypeRef() as AXUIElementRef
}

/// Copy an attribute value, taking ownership per the create rule
unsafe fn copy_attr(element: AXUIElementRef, attribute: &str) -> Option<CFType> {
    let name = CFString::new(attribute);
    let mut value: CFTypeRef = std::ptr::null();
    let err = AXUIElementCopyAttributeValue(element, name.as_concrete_TypeRef(), &mut value);
    if err != K_AX_ERROR_SUCCESS || value.is_null() {
        return None;
    }
    Some(CFType::wrap_under_create_rule(value))
}

/// Copy the AXChildren attribute, answering None when absent or empty
unsafe fn copy_children(element: AXUIElementRef) -> Option<CFType> {
    let children = copy_attr(element, K_AX_CHILDREN_ATTRIBUTE)?;
    if CFArrayGetCount(children.as_CFTypeRef() as CFArrayRef) < 1 {
        return None;
    }
    Some(children)
}

/// Borrow element `index` from a wrapped children array.
///
/// The pointer stays valid only while `array` is alive; callers keep the
/// wrapper in scope for as long as they hold children of it.
unsafe fn array_item(array: &CFType, index: CFIndex) -> Option<AXUIElementRef> {
    let array_ref = array.as_CFTypeRef() as CFArrayRef;
    if index >= CFArrayGetCount(array_ref) {
        return None;
    }
    let item = CFArrayGetValueAtIndex(array_ref, index);
    if item.is_null() {
        return None;
    }
    Some(item as AXUIElementRef)
}

/// Copy a string-valued attribute
unsafe fn copy_string_attr(element: AXUIElementRef, attribute: &str) -> Option<String> {
    let name = CFString::new(attribute);
    let mut value: CFTypeRef = std::ptr::null();
    let err = AXUIElementCopyAttributeValue(element, name.as_concrete_TypeRef(), &mut value);
    if err != K_AX_ERROR_SUCCESS || value.is_null() {
        return None;
    }

    let s = CFString::wrap_under_create_rule(value as CFStringRef).to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
