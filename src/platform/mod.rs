//! Hardware abstraction: freefall sensor, head-park control, protection LED,
//! and power/lid state. Each concern is a trait with a sysfs implementation
//! and an in-memory mock for deterministic tests.

pub mod heads;
pub mod led;
pub mod power;
pub mod sensor;
