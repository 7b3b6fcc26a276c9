//! Integration test: step acknowledgement timeout.

use std::thread;
use std::time::{Duration, Instant};

use atc_changer::runtime::Atc;
use atc_changer::sim::SimulatedMotion;
use atc_changer::state::machine::{StepOutcome, StepResult};
use atc_common::prelude::*;

use super::Recorder;

fn fast_changer(step_timeout_ms: u64, watchdog_poll_ms: u64) -> Atc {
    let mut config = ChangerConfig::with_pockets(12);
    config.step_timeout_ms = step_timeout_ms;
    config.rotation_step_ms = 1;
    config.watchdog_poll_ms = watchdog_poll_ms;
    Atc::from_config(config, SimulatedMotion::new()).unwrap()
}

#[test]
fn overdue_step_faults_on_check() {
    let atc = fast_changer(5000, 2);
    let recorder = Recorder::attach(&atc);
    atc.start_cycle(4).unwrap();

    assert!(atc.check_timeouts(Instant::now()).is_none());
    let err = atc
        .check_timeouts(Instant::now() + Duration::from_secs(6))
        .unwrap();
    assert!(matches!(err, AtcError::StepTimeout { step: 0, limit_ms: 5000 }));

    assert_eq!(atc.mode(), AtcMode::Fault);
    assert_eq!(recorder.faults(), vec![FaultReason::StepTimeout]);
    assert_eq!(FaultReason::StepTimeout.to_string(), "step timeout");
    assert!(atc.query_state().cycle.is_none());
}

#[test]
fn late_completion_event_faults() {
    // Slow watchdog so the late event reaches the deadline check first.
    let atc = fast_changer(10, 10_000);
    atc.start_cycle(4).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert!(matches!(
        atc.advance_step(StepResult::Done),
        Err(AtcError::StepTimeout { .. })
    ));
    assert_eq!(atc.mode(), AtcMode::Fault);
    // Anything after the fault is a stale event.
    assert_eq!(
        atc.advance_step(StepResult::Done).unwrap(),
        StepOutcome::Ignored
    );
}

#[test]
fn stalled_cycle_faults_without_further_calls() {
    let atc = fast_changer(10, 2);
    let recorder = Recorder::attach(&atc);
    atc.start_cycle(4).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while atc.mode() != AtcMode::Fault && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(atc.mode(), AtcMode::Fault);
    assert_eq!(
        atc.query_state().last_fault,
        Some(FaultReason::StepTimeout)
    );
    assert_eq!(recorder.faults(), vec![FaultReason::StepTimeout]);
}

#[test]
fn watchdog_leaves_idle_changer_alone() {
    let atc = fast_changer(10, 1);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(atc.mode(), AtcMode::Ready);
}
