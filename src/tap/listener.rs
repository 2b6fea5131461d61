//! Global quit-shortcut interception using macOS CGEventTaps
//!
//! Installs two active event taps, one for key-down and one for key-up,
//! on a dedicated thread running its own CFRunLoop. The key-down tap may
//! swallow events (returning NULL from the callback) so the guarded quit
//! never reaches the foreground application; the key-up tap only observes.
//!
//! Both callbacks receive the same `TapContext` through the tap's user-info
//! pointer and run serialized on the tap thread, so the guard machine inside
//! the context needs no locking.

use std::ffi::c_void;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use core_foundation::base::TCFType;
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_foundation_sys::base::{CFRelease, CFTypeRef};
use core_foundation_sys::runloop::CFRunLoopAddSource;
use core_graphics::event::{CGEventFlags, CGEventTapLocation, CGEventType};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::events::GuardEvent;
use crate::guard::{GuardMachine, TapDecision};
use crate::menu;

use super::keys::KeyCombination;

// Direct FFI for CGEventTap creation: the safe wrapper cannot drop events,
// and suppression is the whole point of the key-down tap.
extern "C" {
    fn CGEventTapCreate(
        tap: CGEventTapLocation,
        place: i32,
        options: i32,
        events_of_interest: u64,
        callback: extern "C" fn(
            proxy: *mut c_void,
            event_type: CGEventType,
            event: *mut c_void,
            user_info: *mut c_void,
        ) -> *mut c_void,
        user_info: *mut c_void,
    ) -> *mut c_void;

    fn CGEventTapEnable(tap: *mut c_void, enable: bool);

    fn CGEventGetFlags(event: *mut c_void) -> CGEventFlags;

    fn CGEventGetIntegerValueField(event: *mut c_void, field: i32) -> i64;

    fn CFMachPortCreateRunLoopSource(
        allocator: *mut c_void,
        port: *mut c_void,
        order: i64,
    ) -> *mut c_void;
}

// CGEventTapPlacement
const K_CG_HEAD_INSERT_EVENT_TAP: i32 = 0;

// CGEventTapOptions
const K_CG_EVENT_TAP_OPTION_DEFAULT: i32 = 0;

// CGEventField
const K_CG_KEYBOARD_EVENT_KEYCODE: i32 = 9;

/// Errors that can occur while installing the quit taps
#[derive(Debug, thiserror::Error)]
pub enum TapError {
    #[error("quit taps are already installed")]
    AlreadyRunning,

    #[error(
        "event tap creation denied - grant Input Monitoring / Accessibility \
         permission in System Settings"
    )]
    PermissionDenied,

    #[error("failed to create a run loop source for the event tap")]
    RunLoopSource,

    #[error("failed to spawn tap thread: {0}")]
    ThreadSpawn(String),
}

/// Installs and owns the key-down and key-up quit taps
pub struct TapListener {
    combination: KeyCombination,
    press_threshold: u32,
    event_tx: broadcast::Sender<GuardEvent>,
    running: Arc<AtomicBool>,
}

impl TapListener {
    /// Create a new listener for the given combination
    pub fn new(
        combination: KeyCombination,
        press_threshold: u32,
        event_tx: broadcast::Sender<GuardEvent>,
    ) -> Self {
        Self {
            combination,
            press_threshold,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install both taps and start the tap thread.
    ///
    /// Blocks until the taps are registered with the thread's run loop, so a
    /// denied tap creation surfaces here as [`TapError::PermissionDenied`]
    /// with no taps left installed.
    pub fn start(&self) -> Result<(), TapError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TapError::AlreadyRunning);
        }

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let combination = self.combination;
        let machine = GuardMachine::new(self.press_threshold, self.event_tx.clone());
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("quit-tap".to_string())
            .spawn(move || {
                info!("quit tap thread started");

                if let Err(e) = run_tap_loop(combination, machine, &running, ready_tx) {
                    error!(?e, "quit tap error");
                }

                running.store(false, Ordering::SeqCst);
                info!("quit tap thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(TapError::ThreadSpawn(e.to_string()));
        }

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(TapError::ThreadSpawn(
                    "tap thread exited before installing taps".to_string(),
                ))
            }
        }
    }

    /// Stop the tap thread; it tears the taps down on its next loop pass
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the taps are currently installed
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Per-thread state shared by both tap callbacks.
///
/// Created on the tap thread and handed to CoreGraphics as the user-info
/// pointer. Single-writer: only the two callbacks touch it, and both are
/// dispatched on the tap thread's run loop.
struct TapContext {
    combination: KeyCombination,
    machine: GuardMachine,
    down_tap: *mut c_void,
    up_tap: *mut c_void,
}

/// Create both taps, register them with this thread's run loop, report
/// readiness, and service the loop until the running flag clears.
fn run_tap_loop(
    combination: KeyCombination,
    machine: GuardMachine,
    running: &AtomicBool,
    ready_tx: std::sync::mpsc::Sender<Result<(), TapError>>,
) -> Result<(), TapError> {
    let ctx = Box::new(TapContext {
        combination,
        machine,
        down_tap: null_mut(),
        up_tap: null_mut(),
    });
    let ctx_ptr = Box::into_raw(ctx);

    unsafe {
        let down_tap = CGEventTapCreate(
            CGEventTapLocation::HID,
            K_CG_HEAD_INSERT_EVENT_TAP,
            K_CG_EVENT_TAP_OPTION_DEFAULT,
            1u64 << CGEventType::KeyDown as u64,
            key_down_callback,
            ctx_ptr as *mut c_void,
        );
        if down_tap.is_null() {
            drop(Box::from_raw(ctx_ptr));
            let _ = ready_tx.send(Err(TapError::PermissionDenied));
            return Err(TapError::PermissionDenied);
        }

        let up_tap = CGEventTapCreate(
            CGEventTapLocation::HID,
            K_CG_HEAD_INSERT_EVENT_TAP,
            K_CG_EVENT_TAP_OPTION_DEFAULT,
            1u64 << CGEventType::KeyUp as u64,
            key_up_callback,
            ctx_ptr as *mut c_void,
        );
        if up_tap.is_null() {
            CFRelease(down_tap as CFTypeRef);
            drop(Box::from_raw(ctx_ptr));
            let _ = ready_tx.send(Err(TapError::PermissionDenied));
            return Err(TapError::PermissionDenied);
        }

        (*ctx_ptr).down_tap = down_tap;
        (*ctx_ptr).up_tap = up_tap;

        let down_source = CFMachPortCreateRunLoopSource(null_mut(), down_tap, 0);
        let up_source = CFMachPortCreateRunLoopSource(null_mut(), up_tap, 0);
        if down_source.is_null() || up_source.is_null() {
            for cf in [down_source, up_source, down_tap, up_tap] {
                if !cf.is_null() {
                    CFRelease(cf as CFTypeRef);
                }
            }
            drop(Box::from_raw(ctx_ptr));
            let _ = ready_tx.send(Err(TapError::RunLoopSource));
            return Err(TapError::RunLoopSource);
        }

        let run_loop = CFRunLoop::get_current();
        CFRunLoopAddSource(
            run_loop.as_concrete_TypeRef(),
            down_source as *mut _,
            kCFRunLoopCommonModes,
        );
        CFRunLoopAddSource(
            run_loop.as_concrete_TypeRef(),
            up_source as *mut _,
            kCFRunLoopCommonModes,
        );

        CGEventTapEnable(down_tap, true);
        CGEventTapEnable(up_tap, true);

        info!("quit event taps created and enabled");
        let _ = ready_tx.send(Ok(()));

        // Service the run loop in short slices so the running flag is
        // honored promptly.
        while running.load(Ordering::SeqCst) {
            CFRunLoop::run_in_mode(
                kCFRunLoopDefaultMode,
                std::time::Duration::from_millis(100),
                true,
            );
        }

        CGEventTapEnable(down_tap, false);
        CGEventTapEnable(up_tap, false);
        for cf in [down_source, up_source, down_tap, up_tap] {
            CFRelease(cf as CFTypeRef);
        }
        drop(Box::from_raw(ctx_ptr));
    }

    Ok(())
}

/// Re-enable the taps after macOS disables them (slow callback or user
/// input timeout). Returns true if the event was such a pseudo event.
unsafe fn reenable_if_disabled(ctx: &TapContext, event_type: CGEventType) -> bool {
    if !matches!(
        event_type,
        CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput
    ) {
        return false;
    }

    warn!(?event_type, "event tap disabled, re-enabling");
    if !ctx.down_tap.is_null() {
        CGEventTapEnable(ctx.down_tap, true);
    }
    if !ctx.up_tap.is_null() {
        CGEventTapEnable(ctx.up_tap, true);
    }
    true
}

/// Key-down callback: filter to the monitored combination, verify the
/// foreground application actually binds it in its menus, then let the
/// guard machine decide. Returning the event forwards it; returning NULL
/// swallows it.
extern "C" fn key_down_callback(
    _proxy: *mut c_void,
    event_type: CGEventType,
    event: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void {
    let ctx = unsafe { &mut *(user_info as *mut TapContext) };

    unsafe {
        if reenable_if_disabled(ctx, event_type) {
            return event;
        }

        let flags = CGEventGetFlags(event);
        let key_code = CGEventGetIntegerValueField(event, K_CG_KEYBOARD_EVENT_KEYCODE);
        if !ctx.combination.matches(flags, key_code) {
            return event;
        }
    }

    // Fail open from here on: anything we cannot verify is forwarded.
    let app = match menu::menu_bar_owner() {
        Some(app) => app,
        None => return event,
    };
    if !app.owns_menu_bar {
        return event;
    }
    if !menu::binds_menu_command(app.pid, ctx.combination.menu_char) {
        return event;
    }

    match ctx.machine.on_quit_key_down() {
        TapDecision::Forward => event,
        TapDecision::Suppress => null_mut(),
    }
}

/// Key-up callback: filter on modifier and key code only, notify the guard
/// machine, and always forward the event unchanged.
extern "C" fn key_up_callback(
    _proxy: *mut c_void,
    event_type: CGEventType,
    event: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void {
    let ctx = unsafe { &mut *(user_info as *mut TapContext) };

    unsafe {
        if reenable_if_disabled(ctx, event_type) {
            return event;
        }

        let flags = CGEventGetFlags(event);
        let key_code = CGEventGetIntegerValueField(event, K_CG_KEYBOARD_EVENT_KEYCODE);
        if !ctx.combination.matches(flags, key_code) {
            return event;
        }
    }

    ctx.machine.on_quit_key_up();
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_creation() {
        let (tx, _rx) = broadcast::channel(16);
        let listener = TapListener::new(KeyCombination::command_q(), 4, tx);
        assert!(!listener.is_running());
    }
}
