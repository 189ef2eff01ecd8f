//! Protection lifecycle scenarios exercised through the public library API
//! with mock hardware.

use std::time::{Duration, Instant};

use freefall_guard::core::config::DurationPolicy;
use freefall_guard::daemon::controller::{
    ControllerState, ExpiryOutcome, ProtectionController,
};
use freefall_guard::logger::activity::ActivityLoggerHandle;
use freefall_guard::platform::heads::{HeadCommand, MockHeadParker};
use freefall_guard::platform::led::MockIndicator;
use freefall_guard::platform::power::{MockPowerSource, PowerProfile};

fn policy() -> DurationPolicy {
    DurationPolicy {
        short: Duration::from_secs(2),
        long: Duration::from_secs(20),
        park_timeout: Duration::from_secs(21),
    }
}

fn controller(
    heads: &MockHeadParker,
    led: &MockIndicator,
    power: &MockPowerSource,
) -> ProtectionController {
    ProtectionController::new(
        Box::new(heads.clone()),
        Box::new(led.clone()),
        Box::new(power.clone()),
        policy(),
        ActivityLoggerHandle::detached(),
    )
}

#[test]
fn on_ac_with_lid_open_runs_a_two_second_session() {
    let heads = MockHeadParker::new("/dev/sda");
    let led = MockIndicator::new();
    let power = MockPowerSource::new(Some(true), Some(true));
    let mut ctl = controller(&heads, &led, &power);

    let t0 = Instant::now();
    let arm = ctl.handle_pulse(1, t0).expect("session starts");
    assert_eq!(arm.deadline, t0 + Duration::from_secs(2));
    assert_eq!(ctl.state(), ControllerState::Protecting);

    // No further pulses: the timer fires at its armed deadline.
    let outcome = ctl.handle_expiry(arm.generation, arm.deadline);
    assert_eq!(outcome, ExpiryOutcome::SessionEnded);
    assert_eq!(ctl.state(), ControllerState::Idle);
    assert_eq!(
        heads.recorded(),
        vec![HeadCommand::Park(21_000), HeadCommand::Unpark]
    );
    assert_eq!(led.recorded(), vec![true, false]);
}

#[test]
fn battery_lid_closed_session_extends_and_ignores_the_stale_timer() {
    let heads = MockHeadParker::new("/dev/sda");
    let led = MockIndicator::new();
    let power = MockPowerSource::new(Some(false), Some(false));
    let mut ctl = controller(&heads, &led, &power);

    let t0 = Instant::now();
    let first = ctl.handle_pulse(1, t0).expect("session starts");
    assert_eq!(first.deadline, t0 + Duration::from_secs(20));

    // Second pulse at t=5s while still protecting: deadline moves to t=25s,
    // no duplicate park.
    let second = ctl
        .handle_pulse(1, t0 + Duration::from_secs(5))
        .expect("session extends");
    assert_eq!(second.deadline, t0 + Duration::from_secs(25));
    assert_eq!(heads.park_count(), 1);
    assert_eq!(led.recorded(), vec![true]);

    // The timer originally armed for t=20s fires and is ignored.
    let stale = ctl.handle_expiry(first.generation, t0 + Duration::from_secs(20));
    assert_eq!(stale, ExpiryOutcome::Stale);
    assert_eq!(ctl.state(), ControllerState::Protecting);
    assert_eq!(heads.unpark_count(), 0);

    // The timer for t=25s fires and ends the session.
    let live = ctl.handle_expiry(second.generation, t0 + Duration::from_secs(25));
    assert_eq!(live, ExpiryOutcome::SessionEnded);
    assert_eq!(heads.unpark_count(), 1);
    assert_eq!(led.recorded(), vec![true, false]);
}

#[test]
fn park_failure_aborts_the_session_and_the_next_pulse_retries() {
    let heads = MockHeadParker::new("/dev/sda");
    let led = MockIndicator::new();
    let power = MockPowerSource::new(Some(true), Some(true));
    let mut ctl = controller(&heads, &led, &power);

    heads.fail_next_parks(1);
    let t0 = Instant::now();
    assert!(ctl.handle_pulse(1, t0).is_none(), "no timer armed");
    assert_eq!(ctl.state(), ControllerState::Idle, "no session created");
    assert!(led.recorded().is_empty(), "LED never turned on");

    // Monitoring continues: the next pulse retries protection independently.
    let arm = ctl
        .handle_pulse(1, t0 + Duration::from_secs(3))
        .expect("retry succeeds");
    assert_eq!(ctl.state(), ControllerState::Protecting);
    assert_eq!(heads.park_count(), 1);
    assert_eq!(led.recorded(), vec![true]);

    let outcome = ctl.handle_expiry(arm.generation, arm.deadline);
    assert_eq!(outcome, ExpiryOutcome::SessionEnded);
}

#[test]
fn unreadable_power_state_selects_the_protective_duration() {
    let heads = MockHeadParker::new("/dev/sda");
    let led = MockIndicator::new();
    // Both attributes unreadable: the daemon must assume battery + closed lid.
    let power = MockPowerSource::new(None, None);
    let mut ctl = controller(&heads, &led, &power);

    let t0 = Instant::now();
    let arm = ctl.handle_pulse(1, t0).expect("session starts");
    assert_eq!(arm.deadline, t0 + Duration::from_secs(20));
}

#[test]
fn duration_policy_matrix() {
    let cases = [
        (Some(true), Some(true), 2),
        (Some(true), Some(false), 2),
        (Some(false), Some(true), 2),
        (Some(false), Some(false), 20),
    ];
    for (ac, lid, expected_secs) in cases {
        let heads = MockHeadParker::new("/dev/sda");
        let led = MockIndicator::new();
        let power = MockPowerSource::new(ac, lid);
        let mut ctl = controller(&heads, &led, &power);

        let t0 = Instant::now();
        let arm = ctl.handle_pulse(1, t0).expect("session starts");
        assert_eq!(
            arm.deadline,
            t0 + Duration::from_secs(expected_secs),
            "ac={ac:?} lid={lid:?}"
        );
    }
}

#[test]
fn profile_duration_matches_controller_behavior() {
    let p = policy();
    let profile = PowerProfile {
        on_ac: false,
        lid_open: false,
    };
    assert_eq!(profile.protection_duration(&p), Duration::from_secs(20));
    let profile = PowerProfile {
        on_ac: true,
        lid_open: false,
    };
    assert_eq!(profile.protection_duration(&p), Duration::from_secs(2));
}

#[test]
fn many_extensions_still_end_in_a_single_unpark() {
    let heads = MockHeadParker::new("/dev/sda");
    let led = MockIndicator::new();
    let power = MockPowerSource::new(Some(false), Some(false));
    let mut ctl = controller(&heads, &led, &power);

    let t0 = Instant::now();
    let mut arm = ctl.handle_pulse(1, t0).expect("session starts");
    for i in 1..=10 {
        arm = ctl
            .handle_pulse(1, t0 + Duration::from_secs(i))
            .expect("session extends");
    }

    assert_eq!(heads.park_count(), 1);
    let outcome = ctl.handle_expiry(arm.generation, arm.deadline);
    assert_eq!(outcome, ExpiryOutcome::SessionEnded);
    assert_eq!(heads.unpark_count(), 1);
    assert_eq!(led.recorded(), vec![true, false]);
}
