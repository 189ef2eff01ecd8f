//! Blocking reader for the kernel freefall device.
//!
//! The kernel blocks the read until an interrupt reports freefall, then
//! delivers one byte holding the pulse count since the last read. The device
//! handle is opened once and held for the process lifetime; there is no way
//! to restart the stream.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::errors::{FfgError, Result};

/// Lazy, infinite sequence of freefall pulse counts.
pub trait FreefallSource: Send {
    /// Block until the next sensor delivery; returns the pulse count.
    fn next_pulse(&mut self) -> Result<u8>;
    /// Device path, for log context.
    fn path(&self) -> &Path;
}

/// `/dev/freefall` reader.
#[derive(Debug)]
pub struct FreefallSensor {
    path: PathBuf,
    device: File,
}

impl FreefallSensor {
    /// Open the sensor device in blocking mode.
    ///
    /// Failure here is fatal for the process: without the sensor there is
    /// nothing to monitor.
    pub fn open(path: &Path) -> Result<Self> {
        let device = File::open(path).map_err(|source| FfgError::SensorUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            device,
        })
    }
}

impl FreefallSource for FreefallSensor {
    fn next_pulse(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        match self.device.read(&mut buf) {
            Ok(1) => Ok(buf[0]),
            // EOF from a character device means the driver went away.
            Ok(_) => Err(FfgError::SensorReadError {
                path: self.path.clone(),
                details: "unexpected end of stream".to_string(),
            }),
            Err(error) => Err(FfgError::SensorReadError {
                path: self.path.clone(),
                details: error.to_string(),
            }),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

// ──────────────────── mock ────────────────────

/// One step of a scripted sensor.
#[derive(Debug, Clone)]
pub enum SensorStep {
    /// Deliver a pulse count after the given delay.
    Pulse(Duration, u8),
    /// Fail the read after the given delay.
    Fail(Duration, String),
}

/// Scripted sensor for event-loop tests. Once the script is exhausted the
/// reader blocks indefinitely, like the real device between falls.
#[derive(Debug, Clone)]
pub struct ScriptedFreefallSource {
    path: PathBuf,
    script: Arc<Mutex<Vec<SensorStep>>>,
}

impl ScriptedFreefallSource {
    #[must_use]
    pub fn new(script: Vec<SensorStep>) -> Self {
        Self {
            path: PathBuf::from("mock:freefall"),
            script: Arc::new(Mutex::new(script)),
        }
    }
}

impl FreefallSource for ScriptedFreefallSource {
    fn next_pulse(&mut self) -> Result<u8> {
        loop {
            let step = {
                let mut script = self.script.lock();
                if script.is_empty() {
                    None
                } else {
                    Some(script.remove(0))
                }
            };
            match step {
                Some(SensorStep::Pulse(delay, count)) => {
                    std::thread::sleep(delay);
                    return Ok(count);
                }
                Some(SensorStep::Fail(delay, details)) => {
                    std::thread::sleep(delay);
                    return Err(FfgError::SensorReadError {
                        path: self.path.clone(),
                        details,
                    });
                }
                None => std::thread::sleep(Duration::from_millis(20)),
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
