//! The protection state machine.
//!
//! Two states: **Idle** (no session) and **Protecting** (heads parked, LED
//! on, expiry timer armed). A freefall pulse while Idle opens a session;
//! pulses while Protecting only push the deadline out. Every timer arm is
//! tagged with a generation number, and an expiry carrying anything but the
//! current generation is a superseded timer and is ignored — the arm/cancel
//! of the timer and the deadline mutation happen together, under the single
//! caller the event loop provides.
//!
//! Hardware failures are absorbed here: a transition always completes even
//! if a side effect failed, so the machine can never wedge half-way.

use std::time::Instant;

use crate::core::config::DurationPolicy;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::platform::heads::HeadParker;
use crate::platform::led::Indicator;
use crate::platform::power::PowerSource;

// ──────────────────── session ────────────────────

/// The bounded interval during which heads are kept parked. At most one
/// exists at a time, owned exclusively by the controller.
#[derive(Debug, Clone)]
pub struct ProtectionSession {
    /// Target block device.
    pub device: String,
    /// When the park command was issued.
    pub started_at: Instant,
    /// When the session should end. Only ever extended, never pulled in.
    pub deadline: Instant,
    /// Generation of the live timer arm; older arms are superseded.
    pub generation: u64,
    /// How many pulses extended this session.
    pub extensions: u32,
}

/// Controller state, derived from session presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No active session.
    Idle,
    /// Session active: heads parked, LED on, timer armed.
    Protecting,
}

/// A request to (re)arm the expiry timer. Arming a new one supersedes every
/// earlier arm for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerArm {
    /// Absolute expiry instant.
    pub deadline: Instant,
    /// Generation to hand back via [`ProtectionController::handle_expiry`].
    pub generation: u64,
}

/// What an expiry delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// The session ended: heads unparked, LED off.
    SessionEnded,
    /// The timer was superseded (or no session exists); nothing happened.
    Stale,
}

// ──────────────────── controller ────────────────────

/// Consumes pulse and expiry events, drives the hardware, owns the session.
pub struct ProtectionController {
    heads: Box<dyn HeadParker>,
    indicator: Box<dyn Indicator>,
    power: Box<dyn PowerSource>,
    policy: DurationPolicy,
    logger: ActivityLoggerHandle,
    session: Option<ProtectionSession>,
    timer_generation: u64,
    indicator_warned: bool,
}

impl ProtectionController {
    pub fn new(
        heads: Box<dyn HeadParker>,
        indicator: Box<dyn Indicator>,
        power: Box<dyn PowerSource>,
        policy: DurationPolicy,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            heads,
            indicator,
            power,
            policy,
            logger,
            session: None,
            timer_generation: 0,
            indicator_warned: false,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        if self.session.is_some() {
            ControllerState::Protecting
        } else {
            ControllerState::Idle
        }
    }

    /// Active session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&ProtectionSession> {
        self.session.as_ref()
    }

    /// Process a freefall pulse.
    ///
    /// Returns the timer arm the caller must install, or `None` when no
    /// timer change is needed (pulse count of zero, or park failure).
    pub fn handle_pulse(&mut self, count: u8, now: Instant) -> Option<TimerArm> {
        if count == 0 {
            return None;
        }

        let reading = self.power.profile();
        if reading.ac_fallback {
            self.logger
                .send(ActivityEvent::PowerFallback { attribute: "ac_online" });
        }
        if reading.lid_fallback {
            self.logger
                .send(ActivityEvent::PowerFallback { attribute: "lid_state" });
        }
        let duration = reading.profile.protection_duration(&self.policy);

        if let Some(session) = self.session.as_mut() {
            // Heads are already parked; only the deadline moves.
            session.deadline = session.deadline.max(now + duration);
            session.extensions += 1;
            self.timer_generation += 1;
            session.generation = self.timer_generation;
            self.logger.send(ActivityEvent::SessionExtended {
                device: session.device.clone(),
                duration_ms: duration_millis(duration),
                pulses: count,
                on_ac: reading.profile.on_ac,
                lid_open: reading.profile.lid_open,
            });
            return Some(TimerArm {
                deadline: session.deadline,
                generation: self.timer_generation,
            });
        }

        // Park before touching the LED, so a park failure leaves no
        // misleading indicator behind.
        if let Err(error) = self.heads.park(self.policy.park_timeout) {
            self.logger.send(ActivityEvent::ParkFailed {
                device: self.heads.device().to_string(),
                error_code: error.code().to_string(),
                error_message: error.to_string(),
            });
            return None;
        }
        self.set_indicator(true);

        self.timer_generation += 1;
        let deadline = now + duration;
        self.session = Some(ProtectionSession {
            device: self.heads.device().to_string(),
            started_at: now,
            deadline,
            generation: self.timer_generation,
            extensions: 0,
        });
        self.logger.send(ActivityEvent::SessionStarted {
            device: self.heads.device().to_string(),
            duration_ms: duration_millis(duration),
            pulses: count,
            on_ac: reading.profile.on_ac,
            lid_open: reading.profile.lid_open,
        });
        Some(TimerArm {
            deadline,
            generation: self.timer_generation,
        })
    }

    /// Process an expiry delivery for the timer armed with `generation`.
    pub fn handle_expiry(&mut self, generation: u64, now: Instant) -> ExpiryOutcome {
        match self.session.take() {
            Some(session) if session.generation == generation => {
                self.close_session(&session, now);
                ExpiryOutcome::SessionEnded
            }
            other => {
                // Superseded timer; the session (if any) stays untouched.
                self.session = other;
                ExpiryOutcome::Stale
            }
        }
    }

    /// End any active session immediately. Used on daemon shutdown so heads
    /// are not left parked behind a dead process.
    pub fn end_active_session(&mut self, now: Instant) {
        if let Some(session) = self.session.take() {
            self.close_session(&session, now);
        }
    }

    fn close_session(&mut self, session: &ProtectionSession, now: Instant) {
        if let Err(error) = self.heads.unpark() {
            // The drive unparks itself once its unload timeout lapses, so
            // this degrades protection-off latency, not safety.
            self.logger.send(ActivityEvent::UnparkFailed {
                device: session.device.clone(),
                error_code: error.code().to_string(),
                error_message: error.to_string(),
            });
        }
        self.set_indicator(false);
        self.logger.send(ActivityEvent::SessionEnded {
            device: session.device.clone(),
            protected_ms: duration_millis(now.saturating_duration_since(session.started_at)),
            extensions: session.extensions,
        });
    }

    fn set_indicator(&mut self, on: bool) {
        if let Err(error) = self.indicator.set(on) {
            if !self.indicator_warned {
                self.indicator_warned = true;
                self.logger.send(ActivityEvent::IndicatorFailed {
                    error_message: error.to_string(),
                });
            }
        }
    }
}

fn duration_millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ──────────────────── tests ────────────────────
