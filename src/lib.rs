#![forbid(unsafe_code)]

//! Freefall Guard (ffg) — system service that parks spinning-disk heads
//! during kernel-reported freefall events.
//!
//! The kernel's freefall sensor blocks a read on `/dev/freefall` until the
//! accelerometer reports the machine is falling; ffg answers each pulse by
//! writing the drive's `unload_heads` sysfs attribute (parking the heads),
//! lighting the protection LED, and arming an expiry timer whose length
//! depends on AC/lid state. Overlapping pulses extend the running session
//! instead of re-parking.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use freefall_guard::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use freefall_guard::core::config::Config;
//! use freefall_guard::daemon::controller::ProtectionController;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod platform;
