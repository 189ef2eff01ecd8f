//! The daemon event loop: one consumer, two event producers.
//!
//! A dedicated sensor thread performs the blocking freefall reads and
//! forwards them over a bounded crossbeam channel. The main loop is the
//! single consumer, multiplexing via `select!` over the sensor channel, the
//! armed expiry timer (`at(deadline)`, or `never()` while Idle), and a short
//! default tick that polls the shutdown flag. Every session mutation happens
//! inside this one loop, so pulse processing and expiry processing can never
//! interleave mid-transition.
//!
//! Rearming the timer replaces the `at` receiver, which structurally cancels
//! the previous arm; the controller's generation check stays as the guard
//! against a superseded timer that fires anyway.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, at, bounded, never, select};

use crate::core::config::Config;
use crate::core::errors::{FfgError, Result};
use crate::daemon::controller::{ExpiryOutcome, ProtectionController};
use crate::daemon::signals::SignalHandler;
use crate::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use crate::logger::jsonl::JsonlConfig;
use crate::platform::heads::SysfsHeadParker;
use crate::platform::led::SysfsIndicator;
use crate::platform::power::SysfsPowerSource;
use crate::platform::sensor::{FreefallSensor, FreefallSource};

/// Sensor → main loop channel capacity. Pulses are rare; a small buffer only
/// papers over momentary scheduling delay.
const PULSE_CHANNEL_CAP: usize = 16;

/// How often the loop wakes to poll the shutdown flag while nothing else
/// happens.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Backoff inside the sensor thread after a failed read, so a persistently
/// broken device does not spin the CPU while the main loop counts failures.
const SENSOR_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Arguments for `ffg daemon`.
#[derive(Debug, Clone)]
pub struct DaemonArgs {
    /// Device to protect (e.g. `/dev/sda`).
    pub device: String,
    /// Run attached to the terminal (default; the service manager owns
    /// backgrounding).
    pub foreground: bool,
}

impl Default for DaemonArgs {
    fn default() -> Self {
        Self {
            device: "/dev/sda".to_string(),
            foreground: true,
        }
    }
}

enum SensorMessage {
    Pulse(u8),
    ReadFailed(String),
}

/// Build the hardware stack from config and run the daemon until shutdown.
pub fn run(config: &Config, args: &DaemonArgs) -> Result<()> {
    let (logger, logger_join) = spawn_logger(ActivityLoggerConfig {
        jsonl_config: JsonlConfig {
            path: config.logging.jsonl_log.clone(),
            fallback_path: config.logging.fallback_log.clone(),
            max_size_bytes: config.logging.max_size_bytes,
            max_rotated_files: config.logging.max_rotated_files,
            fsync_interval_secs: config.logging.fsync_interval_secs,
        },
        channel_capacity: config.logging.channel_capacity,
    })?;

    let parker = SysfsHeadParker::new(&args.device, &config.paths.sysfs_block_root)?;
    if let Err(error) = parker.probe() {
        // Keep consuming pulses anyway: the attribute can appear later
        // (device re-plug, driver reload), and each park attempt will
        // re-check it.
        logger.send(ActivityEvent::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        });
        eprintln!("[FFG-DAEMON] {error}");
    }

    // No head protection without the sensor; this one is fatal.
    let sensor = FreefallSensor::open(&config.paths.freefall_device)?;

    let controller = ProtectionController::new(
        Box::new(parker),
        Box::new(SysfsIndicator::new(&config.paths.led_brightness)),
        Box::new(SysfsPowerSource::new(
            &config.paths.ac_online,
            &config.paths.lid_state,
        )),
        config.protection.policy(),
        logger.clone(),
    );

    logger.send(ActivityEvent::DaemonStarted {
        version: env!("CARGO_PKG_VERSION").to_string(),
        device: args.device.clone(),
        config_hash: config.stable_hash().unwrap_or_default(),
    });
    if args.foreground {
        eprintln!(
            "[FFG-DAEMON] protecting {} (sensor {})",
            args.device,
            config.paths.freefall_device.display()
        );
    }

    let signals = SignalHandler::new();
    let result = run_event_loop(
        controller,
        Box::new(sensor),
        &signals,
        &logger,
        config.protection.max_sensor_read_failures,
    );

    logger.shutdown();
    let _ = logger_join.join();
    result
}

/// Drive the controller from a pulse source until shutdown or a fatal
/// sensor failure. Split from [`run`] so tests can inject a scripted source.
pub fn run_event_loop(
    mut controller: ProtectionController,
    source: Box<dyn FreefallSource>,
    signals: &SignalHandler,
    logger: &ActivityLoggerHandle,
    max_sensor_read_failures: u32,
) -> Result<()> {
    let started = Instant::now();
    let sensor_path = source.path().display().to_string();
    let pulse_rx = spawn_sensor_thread(source)?;

    let mut timer_rx: Receiver<Instant> = never();
    let mut armed_generation: u64 = 0;
    let mut consecutive_read_failures: u32 = 0;

    let result = loop {
        if signals.should_shutdown() {
            logger.send(ActivityEvent::DaemonStopped {
                reason: "shutdown-signal".to_string(),
                uptime_secs: started.elapsed().as_secs(),
            });
            break Ok(());
        }

        select! {
            recv(pulse_rx) -> msg => match msg {
                Ok(SensorMessage::Pulse(count)) => {
                    consecutive_read_failures = 0;
                    if let Some(arm) = controller.handle_pulse(count, Instant::now()) {
                        timer_rx = at(arm.deadline);
                        armed_generation = arm.generation;
                    }
                }
                Ok(SensorMessage::ReadFailed(details)) => {
                    consecutive_read_failures += 1;
                    logger.send(ActivityEvent::SensorReadFailed {
                        path: sensor_path.clone(),
                        details: details.clone(),
                        consecutive: consecutive_read_failures,
                    });
                    if consecutive_read_failures >= max_sensor_read_failures {
                        logger.send(ActivityEvent::DaemonStopped {
                            reason: "sensor-failure".to_string(),
                            uptime_secs: started.elapsed().as_secs(),
                        });
                        break Err(FfgError::SensorReadError {
                            path: sensor_path.clone().into(),
                            details: format!(
                                "{details} ({consecutive_read_failures} consecutive failures)"
                            ),
                        });
                    }
                }
                Err(_) => {
                    logger.send(ActivityEvent::DaemonStopped {
                        reason: "sensor-channel-closed".to_string(),
                        uptime_secs: started.elapsed().as_secs(),
                    });
                    break Err(FfgError::ChannelClosed { component: "sensor" });
                }
            },
            recv(timer_rx) -> _ => {
                if controller.handle_expiry(armed_generation, Instant::now())
                    == ExpiryOutcome::SessionEnded
                {
                    timer_rx = never();
                }
            }
            default(SIGNAL_POLL_INTERVAL) => {}
        }
    };

    // Never leave heads parked behind an exiting daemon; the hardware would
    // recover on its own timeout, but there is no reason to wait for it.
    controller.end_active_session(Instant::now());
    result
}

fn spawn_sensor_thread(mut source: Box<dyn FreefallSource>) -> Result<Receiver<SensorMessage>> {
    let (tx, rx) = bounded::<SensorMessage>(PULSE_CHANNEL_CAP);
    // The thread parks in the blocking read most of its life; it exits when
    // the main loop drops the receiver. Not joined: a blocking device read
    // cannot be interrupted portably, and process exit reclaims it.
    thread::Builder::new()
        .name("ffg-sensor".to_string())
        .spawn(move || {
            loop {
                match source.next_pulse() {
                    Ok(0) => {
                        // No freefall since last read; nothing to forward.
                    }
                    Ok(count) => {
                        if tx.send(SensorMessage::Pulse(count)).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        if tx.send(SensorMessage::ReadFailed(error.to_string())).is_err() {
                            break;
                        }
                        thread::sleep(SENSOR_ERROR_BACKOFF);
                    }
                }
            }
        })
        .map_err(|e| FfgError::Runtime {
            details: format!("failed to spawn sensor thread: {e}"),
        })?;
    Ok(rx)
}
