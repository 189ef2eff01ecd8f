//! Daemon subsystem: the protection state machine, the event loop that
//! drives it, and signal handling.

pub mod controller;
#[cfg(feature = "daemon")]
pub mod loop_main;
#[cfg(feature = "daemon")]
pub mod signals;
