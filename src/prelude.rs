//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use freefall_guard::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, DurationPolicy};
pub use crate::core::errors::{FfgError, Result};

// Platform
pub use crate::platform::heads::{HeadParker, SysfsHeadParker};
pub use crate::platform::led::{Indicator, SysfsIndicator};
pub use crate::platform::power::{PowerProfile, PowerSource, SysfsPowerSource};
pub use crate::platform::sensor::{FreefallSensor, FreefallSource};

// Daemon
pub use crate::daemon::controller::{
    ControllerState, ExpiryOutcome, ProtectionController, ProtectionSession, TimerArm,
};

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
