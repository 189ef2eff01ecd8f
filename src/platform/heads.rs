//! Head-park control via the per-device `unload_heads` sysfs attribute.
//!
//! Parking writes the drive's unload timeout in milliseconds; unparking
//! writes zero. A write to an existing attribute that fails is retried once
//! before surfacing, since transient contention on the attribute is
//! plausible. A missing attribute is never retried: that means the device
//! is absent or the hardware does not support head unloading.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::errors::{FfgError, Result};

/// Park/unpark control surface for one block device.
pub trait HeadParker: Send {
    /// Park the heads, letting the drive self-unpark after `timeout`.
    fn park(&self, timeout: Duration) -> Result<()>;
    /// Unpark the heads immediately.
    fn unpark(&self) -> Result<()>;
    /// Device name this parker controls (e.g. `/dev/sda`).
    fn device(&self) -> &str;
}

/// Sysfs-backed head parker writing `/sys/block/<dev>/device/unload_heads`.
#[derive(Debug)]
pub struct SysfsHeadParker {
    device: String,
    control_path: PathBuf,
}

impl SysfsHeadParker {
    /// Validate the device name and derive its control attribute path.
    ///
    /// Accepts `/dev/<name>` with a non-empty, slash-free name, the same
    /// shape the kernel exposes under the sysfs block root.
    pub fn new(device: &str, sysfs_block_root: &Path) -> Result<Self> {
        let Some(name) = device.strip_prefix("/dev/") else {
            return Err(FfgError::InvalidDevice {
                device: device.to_string(),
                details: "device must start with /dev/".to_string(),
            });
        };
        if name.is_empty() || name.contains('/') {
            return Err(FfgError::InvalidDevice {
                device: device.to_string(),
                details: "device name must be a single non-empty component".to_string(),
            });
        }
        Ok(Self {
            device: device.to_string(),
            control_path: sysfs_block_root.join(name).join("device/unload_heads"),
        })
    }

    /// Path of the control attribute (for diagnostics).
    #[must_use]
    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    /// Check that the device exposes the unload_heads attribute.
    pub fn probe(&self) -> Result<()> {
        if self.control_path.exists() {
            Ok(())
        } else {
            Err(FfgError::DeviceControlUnavailable {
                path: self.control_path.clone(),
            })
        }
    }

    fn write_control(&self, millis: u64) -> Result<()> {
        self.probe()?;
        let payload = millis.to_string();
        match fs::write(&self.control_path, &payload) {
            Ok(()) => Ok(()),
            Err(first) => {
                // One immediate retry for transient contention on the attribute.
                fs::write(&self.control_path, &payload).map_err(|second| {
                    FfgError::DeviceControlWriteError {
                        path: self.control_path.clone(),
                        details: format!("{first}; retry: {second}"),
                    }
                })
            }
        }
    }
}

impl HeadParker for SysfsHeadParker {
    fn park(&self, timeout: Duration) -> Result<()> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.write_control(millis)
    }

    fn unpark(&self) -> Result<()> {
        self.write_control(0)
    }

    fn device(&self) -> &str {
        &self.device
    }
}

// ──────────────────── mock ────────────────────

/// A recorded park/unpark command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadCommand {
    /// Park with the given unload timeout in milliseconds.
    Park(u64),
    /// Unpark.
    Unpark,
}

/// In-memory head parker recording every command, for deterministic tests.
///
/// Cloning shares the recorder, so tests keep one handle for assertions and
/// hand the other to the controller.
#[derive(Debug, Clone)]
pub struct MockHeadParker {
    device: String,
    commands: Arc<Mutex<Vec<HeadCommand>>>,
    park_failures: Arc<Mutex<u32>>,
    unpark_failures: Arc<Mutex<u32>>,
}

impl MockHeadParker {
    #[must_use]
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            commands: Arc::new(Mutex::new(Vec::new())),
            park_failures: Arc::new(Mutex::new(0)),
            unpark_failures: Arc::new(Mutex::new(0)),
        }
    }

    /// Make the next `n` park calls fail with a write error.
    pub fn fail_next_parks(&self, n: u32) {
        *self.park_failures.lock() = n;
    }

    /// Make the next `n` unpark calls fail with a write error.
    pub fn fail_next_unparks(&self, n: u32) {
        *self.unpark_failures.lock() = n;
    }

    /// All commands issued so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<HeadCommand> {
        self.commands.lock().clone()
    }

    /// Number of park commands issued so far.
    #[must_use]
    pub fn park_count(&self) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| matches!(c, HeadCommand::Park(_)))
            .count()
    }

    /// Number of unpark commands issued so far.
    #[must_use]
    pub fn unpark_count(&self) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| matches!(c, HeadCommand::Unpark))
            .count()
    }

    fn write_error(&self) -> FfgError {
        FfgError::DeviceControlWriteError {
            path: PathBuf::from(format!("mock:{}", self.device)),
            details: "injected write failure".to_string(),
        }
    }
}

impl HeadParker for MockHeadParker {
    fn park(&self, timeout: Duration) -> Result<()> {
        let mut failures = self.park_failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(self.write_error());
        }
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.commands.lock().push(HeadCommand::Park(millis));
        Ok(())
    }

    fn unpark(&self) -> Result<()> {
        let mut failures = self.unpark_failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(self.write_error());
        }
        self.commands.lock().push(HeadCommand::Unpark);
        Ok(())
    }

    fn device(&self) -> &str {
        &self.device
    }
}
