//! Integration test: interlock gating of every motion command.

use atc_changer::state::machine::StepResult;
use atc_common::prelude::*;

use super::{Recorder, loaded_changer};

#[test]
fn door_opening_mid_cycle_faults_next_step() {
    let (atc, sim) = loaded_changer(12);
    let recorder = Recorder::attach(&atc);
    atc.start_cycle(5).unwrap();
    let before = atc.query_state().pockets;

    assert!(atc.update_interlock(InterlockField::DoorClosed, false));
    // The flip alone does not fault.
    assert_eq!(atc.mode(), AtcMode::Busy);
    let issued = sim.commands().len();

    let err = atc.advance_step(StepResult::Done).unwrap_err();
    assert_eq!(err, AtcError::InterlockViolation(InterlockFault::DOOR_OPEN));
    assert_eq!(atc.mode(), AtcMode::Fault);
    assert_eq!(recorder.faults(), vec![FaultReason::InterlockViolation]);
    assert_eq!(FaultReason::InterlockViolation.to_string(), "InterlockViolation");

    let snap = atc.query_state();
    assert!(snap.cycle.is_none());
    assert_eq!(sim.commands().len(), issued);
    let occupancy = |pockets: &[atc_changer::state::pockets::Pocket]| {
        pockets.iter().map(|p| p.occupant).collect::<Vec<_>>()
    };
    assert_eq!(occupancy(&snap.pockets[..]), occupancy(&before[..]));
    assert_eq!(snap.pockets[4].health, PocketHealth::Faulted);
}

#[test]
fn blocked_start_outside_cycle_does_not_fault() {
    let (atc, sim) = loaded_changer(12);
    atc.set_interlocks(InterlockState {
        door_closed: true,
        air_pressure_ok: false,
        encoder_ready: false,
    });
    let err = atc.start_cycle(3).unwrap_err();
    assert_eq!(
        err,
        AtcError::InterlockViolation(
            InterlockFault::AIR_PRESSURE_LOW | InterlockFault::ENCODER_NOT_READY
        )
    );
    assert_eq!(atc.mode(), AtcMode::Ready);
    assert!(sim.commands().is_empty());

    atc.set_interlocks(InterlockState::default());
    atc.start_cycle(3).unwrap();
    assert_eq!(atc.mode(), AtcMode::Busy);
}

#[test]
fn interlock_notifications_only_on_change() {
    let (atc, _) = loaded_changer(4);
    let recorder = Recorder::attach(&atc);
    assert!(!atc.update_interlock(InterlockField::EncoderReady, true));
    assert!(atc.update_interlock(InterlockField::EncoderReady, false));
    let events = recorder.take();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        AtcEvent::Interlocks(InterlockState {
            encoder_ready: false,
            ..
        })
    ));
}

#[test]
fn restored_interlock_lets_cycle_continue() {
    let (atc, _) = loaded_changer(12);
    atc.start_cycle(3).unwrap();
    atc.update_interlock(InterlockField::AirPressure, false);
    atc.update_interlock(InterlockField::AirPressure, true);
    atc.advance_step(StepResult::Done).unwrap();
    assert_eq!(atc.mode(), AtcMode::Busy);
}
