//! Logger thread and handle: hardware-path code never blocks on log IO.
//!
//! A dedicated thread owns the `JsonlWriter`; everything else sends
//! `ActivityEvent` via a bounded crossbeam channel. Non-blocking `try_send()`
//! ensures the controller is never stalled by logging back-pressure — a
//! freefall is exactly the wrong moment to wait on a disk write.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{FfgError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 256;

// ──────────────────── public event type ────────────────────

/// Events logged through the activity coordinator.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        device: String,
        config_hash: String,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
    },
    SessionStarted {
        device: String,
        duration_ms: u64,
        pulses: u8,
        on_ac: bool,
        lid_open: bool,
    },
    SessionExtended {
        device: String,
        duration_ms: u64,
        pulses: u8,
        on_ac: bool,
        lid_open: bool,
    },
    SessionEnded {
        device: String,
        protected_ms: u64,
        extensions: u32,
    },
    ParkFailed {
        device: String,
        error_code: String,
        error_message: String,
    },
    UnparkFailed {
        device: String,
        error_code: String,
        error_message: String,
    },
    IndicatorFailed {
        error_message: String,
    },
    PowerFallback {
        attribute: &'static str,
    },
    SensorReadFailed {
        path: String,
        details: String,
        consecutive: u32,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending log events.
///
/// Internally wraps a bounded crossbeam `Sender`. The `send()` method uses
/// `try_send()` so callers are never blocked by logging back-pressure.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
    // Keeps a detached handle's channel open so sends register as Full
    // (counted) instead of Disconnected (silently ignored).
    detached_rx: Option<Arc<Receiver<ActivityEvent>>>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown of the logger thread.
    pub fn shutdown(&self) {
        if self.detached_rx.is_some() {
            return;
        }
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }

    /// A handle with no logger thread behind it. Every send is counted as
    /// dropped. For tests and tools that do not run a logger.
    #[must_use]
    pub fn detached() -> Self {
        let (tx, rx) = bounded::<ActivityEvent>(0);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
            detached_rx: Some(Arc::new(rx)),
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Options for building the activity logger.
pub struct ActivityLoggerConfig {
    /// JSONL writer config.
    pub jsonl_config: JsonlConfig,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
}

impl Default for ActivityLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the logger thread and return a handle.
///
/// The returned handle is `Clone + Send` and can be shared across threads.
/// The logger thread runs until `handle.shutdown()` is called or all senders
/// are dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
        detached_rx: None,
    };

    let join = thread::Builder::new()
        .name("ffg-logger".to_string())
        .spawn(move || {
            logger_thread_main(rx, config.jsonl_config, dropped_clone);
        })
        .map_err(|e| FfgError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(
    rx: Receiver<ActivityEvent>,
    jsonl_config: JsonlConfig,
    dropped: Arc<AtomicU64>,
) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    // Process events until Shutdown or channel disconnect.
    while let Ok(event) = rx.recv() {
        // Report dropped events periodically.
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            jsonl.flush();
            jsonl.fsync();
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            device,
            config_hash,
        } => {
            let mut entry = LogEntry::new(EventType::DaemonStart, Severity::Info);
            entry.device = Some(device.clone());
            entry.details = Some(format!("version={version} config_hash={config_hash}"));
            entry
        }
        ActivityEvent::DaemonStopped {
            reason,
            uptime_secs,
        } => {
            let mut entry = LogEntry::new(EventType::DaemonStop, Severity::Info);
            entry.details = Some(format!("reason={reason} uptime_secs={uptime_secs}"));
            entry
        }
        ActivityEvent::SessionStarted {
            device,
            duration_ms,
            pulses,
            on_ac,
            lid_open,
        } => {
            let mut entry = LogEntry::new(EventType::SessionStart, Severity::Info);
            entry.device = Some(device.clone());
            entry.duration_ms = Some(*duration_ms);
            entry.pulses = Some(*pulses);
            entry.on_ac = Some(*on_ac);
            entry.lid_open = Some(*lid_open);
            entry
        }
        ActivityEvent::SessionExtended {
            device,
            duration_ms,
            pulses,
            on_ac,
            lid_open,
        } => {
            let mut entry = LogEntry::new(EventType::SessionExtend, Severity::Info);
            entry.device = Some(device.clone());
            entry.duration_ms = Some(*duration_ms);
            entry.pulses = Some(*pulses);
            entry.on_ac = Some(*on_ac);
            entry.lid_open = Some(*lid_open);
            entry
        }
        ActivityEvent::SessionEnded {
            device,
            protected_ms,
            extensions,
        } => {
            let mut entry = LogEntry::new(EventType::SessionEnd, Severity::Info);
            entry.device = Some(device.clone());
            entry.protected_ms = Some(*protected_ms);
            entry.extensions = Some(*extensions);
            entry
        }
        ActivityEvent::ParkFailed {
            device,
            error_code,
            error_message,
        } => {
            let mut entry = LogEntry::new(EventType::ParkFailed, Severity::Critical);
            entry.device = Some(device.clone());
            entry.error_code = Some(error_code.clone());
            entry.error_message = Some(error_message.clone());
            entry
        }
        ActivityEvent::UnparkFailed {
            device,
            error_code,
            error_message,
        } => {
            let mut entry = LogEntry::new(EventType::UnparkFailed, Severity::Warning);
            entry.device = Some(device.clone());
            entry.error_code = Some(error_code.clone());
            entry.error_message = Some(error_message.clone());
            entry.details =
                Some("relying on the drive's own unload timeout to unpark".to_string());
            entry
        }
        ActivityEvent::IndicatorFailed { error_message } => {
            let mut entry = LogEntry::new(EventType::IndicatorFailed, Severity::Warning);
            entry.error_message = Some(error_message.clone());
            entry.details = Some("indicator absence does not block head protection".to_string());
            entry
        }
        ActivityEvent::PowerFallback { attribute } => {
            let mut entry = LogEntry::new(EventType::PowerFallback, Severity::Warning);
            entry.path = Some((*attribute).to_string());
            entry.details = Some(
                "state unreadable, assuming the longer protection duration".to_string(),
            );
            entry
        }
        ActivityEvent::SensorReadFailed {
            path,
            details,
            consecutive,
        } => {
            let mut entry = LogEntry::new(EventType::SensorReadFailed, Severity::Warning);
            entry.path = Some(path.clone());
            entry.details = Some(format!("{details} (consecutive={consecutive})"));
            entry
        }
        ActivityEvent::Error { code, message } => {
            let mut entry = LogEntry::new(EventType::Error, Severity::Critical);
            entry.error_code = Some(code.clone());
            entry.error_message = Some(message.clone());
            entry
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::DaemonStop, Severity::Info),
    }
}
