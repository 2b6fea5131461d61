//! Quit confirmation logic
//!
//! `machine` holds the press-counting state machine that decides whether a
//! quit key-down is swallowed or forwarded; `driver` performs the resulting
//! HUD and ledger side effects on the async runtime.

mod driver;
mod machine;

pub use driver::GuardDriver;
pub use machine::{GuardMachine, TapDecision};
