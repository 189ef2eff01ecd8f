//! Protection indicator LED.
//!
//! Failure here is never allowed to block head protection: some models ship
//! without the indicator, so every failure maps to `IndicatorUnavailable`
//! and the caller decides how loudly to log it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::errors::{FfgError, Result};

/// Protection indicator control surface.
pub trait Indicator: Send {
    /// Switch the indicator on or off.
    fn set(&self, on: bool) -> Result<()>;
}

/// Sysfs-backed indicator writing a brightness attribute.
#[derive(Debug)]
pub struct SysfsIndicator {
    brightness_path: PathBuf,
}

impl SysfsIndicator {
    #[must_use]
    pub fn new(brightness_path: &Path) -> Self {
        Self {
            brightness_path: brightness_path.to_path_buf(),
        }
    }

    /// Path of the brightness attribute (for diagnostics).
    #[must_use]
    pub fn brightness_path(&self) -> &Path {
        &self.brightness_path
    }
}

impl Indicator for SysfsIndicator {
    fn set(&self, on: bool) -> Result<()> {
        fs::write(&self.brightness_path, if on { "1" } else { "0" }).map_err(|error| {
            FfgError::IndicatorUnavailable {
                path: self.brightness_path.clone(),
                details: error.to_string(),
            }
        })
    }
}

// ──────────────────── mock ────────────────────

/// In-memory indicator recording every state change.
#[derive(Debug, Clone)]
pub struct MockIndicator {
    states: Arc<Mutex<Vec<bool>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MockIndicator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: Arc::new(Mutex::new(Vec::new())),
            unavailable: Arc::new(Mutex::new(false)),
        }
    }

    /// Simulate a model without the indicator: every `set` fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    /// All state changes issued so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<bool> {
        self.states.lock().clone()
    }
}

impl Default for MockIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Indicator for MockIndicator {
    fn set(&self, on: bool) -> Result<()> {
        if *self.unavailable.lock() {
            return Err(FfgError::IndicatorUnavailable {
                path: PathBuf::from("mock:led"),
                details: "injected indicator absence".to_string(),
            });
        }
        self.states.lock().push(on);
        Ok(())
    }
}
