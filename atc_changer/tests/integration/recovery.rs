//! Integration test: guided recovery from Fault.

use atc_changer::command::motion::MotionCommand;
use atc_changer::runtime::Atc;
use atc_changer::safety::recovery::RecoveryStep;
use atc_changer::sim::SimulatedMotion;
use atc_changer::state::machine::StepResult;
use atc_common::prelude::*;

use super::{Recorder, assert_progress_sequence, assert_unique_tools, loaded_changer};

/// Cycle toward pocket 5 aborted after the unload step.
fn interrupted() -> (Atc, SimulatedMotion) {
    let (atc, sim) = loaded_changer(12);
    atc.start_cycle(5).unwrap();
    atc.advance_step(StepResult::Done).unwrap();
    assert!(atc.abort());
    sim.clear();
    (atc, sim)
}

#[test]
fn jog_with_low_air_stays_in_manual_jog() {
    let (atc, sim) = interrupted();
    let mut session = atc.start_recovery().unwrap();
    atc.update_interlock(InterlockField::AirPressure, false);

    assert!(matches!(
        session.manual_jog_to_pocket(3),
        Err(AtcError::InterlockViolation(_))
    ));
    assert!(sim.commands().is_empty());
    assert_eq!(session.step(), RecoveryStep::ManualJog);
    assert!(session.is_active());
    assert_eq!(atc.mode(), AtcMode::Fault);
}

#[test]
fn each_action_reports_increasing_progress() {
    let (atc, _) = interrupted();
    let recorder = Recorder::attach(&atc);
    let mut session = atc.start_recovery().unwrap();
    assert_eq!(
        recorder.recovery_progress(),
        vec![("Starting recovery...".to_string(), 0)]
    );
    recorder.take();

    let check = |name: &str, expected: &[u8]| {
        let percents: Vec<u8> = recorder.recovery_progress().iter().map(|(_, p)| *p).collect();
        assert_eq!(percents, expected, "{name}");
        assert_progress_sequence(&percents);
        recorder.take();
    };

    session.resume_mid_change().unwrap();
    check("resume", &[25, 40, 60, 80, 100]);
    session.home_atc().unwrap();
    check("home", &[10, 30, 60, 100]);
    session.manual_jog_to_pocket(9).unwrap();
    check("jog", &[20, 50, 100]);
    session.clear_fault().unwrap();
    check("clear", &[30, 60, 100]);
}

#[test]
fn complete_recovery_returns_to_ready() {
    let (atc, _) = interrupted();
    let recorder = Recorder::attach(&atc);
    let before: Vec<_> = atc.query_state().pockets.iter().map(|p| p.occupant).collect();

    let mut session = atc.start_recovery().unwrap();
    session.home_atc().unwrap();
    session.clear_fault().unwrap();
    session.complete_recovery().unwrap();
    assert_eq!(session.step(), RecoveryStep::Complete);

    let snap = atc.query_state();
    assert_eq!(snap.mode, AtcMode::Ready);
    assert!(snap.cycle.is_none());
    assert_eq!(snap.carousel_pocket, 1);
    let after: Vec<_> = snap.pockets.iter().map(|p| p.occupant).collect();
    assert_eq!(after, before);
    assert_unique_tools(&atc);

    let events = recorder.take();
    assert!(events.contains(&AtcEvent::Recovery(RecoveryEvent::Status(
        "Recovery completed successfully".into()
    ))));
    assert!(events.contains(&AtcEvent::Mode {
        mode: AtcMode::Ready
    }));

    atc.start_cycle(5).unwrap();
    assert_eq!(atc.mode(), AtcMode::Busy);
}

#[test]
fn recovery_motion_goes_through_motion_layer() {
    let (atc, sim) = interrupted();
    let mut session = atc.start_recovery().unwrap();
    session.manual_jog_to_pocket(3).unwrap();
    session.home_atc().unwrap();
    assert_eq!(
        sim.commands(),
        vec![
            MotionCommand::Rotate {
                steps: 2,
                direction: Direction::Cw
            },
            MotionCommand::Home,
        ]
    );
}

#[test]
fn recovery_requires_fault() {
    let (atc, _) = loaded_changer(12);
    assert!(matches!(
        atc.start_recovery(),
        Err(AtcError::NotReady {
            mode: AtcMode::Ready
        })
    ));
}

#[test]
fn desynchronized_boot_forces_recovery() {
    let (atc, _) = loaded_changer(4);
    let boot = BootRecord {
        occupancy: vec![None, Some(2), Some(3), None],
        spindle_tool: Some(9),
        carousel_pocket: 1,
        cycle_target: None,
    };
    let sweep = SensorSweep {
        occupied: vec![false, true, false, false],
        carousel_pocket: Some(1),
    };
    assert_eq!(atc.activate(&boot, &sweep).unwrap(), AtcMode::Fault);
    assert_eq!(
        atc.start_cycle(2),
        Err(AtcError::NotReady {
            mode: AtcMode::Fault
        })
    );

    // Operator confirms pocket 3 is empty during recovery.
    let mut session = atc.start_recovery().unwrap();
    atc.confirm_occupancy(3, None).unwrap();
    session.clear_fault().unwrap();
    session.complete_recovery().unwrap();
    assert_eq!(atc.mode(), AtcMode::Ready);
    assert_eq!(atc.boot_record().occupancy, vec![None, Some(2), None, None]);
}

#[test]
fn abandoned_cycle_at_boot_requires_recovery() {
    let (atc, _) = loaded_changer(12);
    atc.start_cycle(5).unwrap();
    let record = atc.boot_record();
    assert_eq!(record.cycle_target, Some(5));

    // Restart from the persisted record.
    let (fresh, _) = loaded_changer(12);
    let sweep = SensorSweep {
        occupied: record.occupancy.iter().map(Option::is_some).collect(),
        carousel_pocket: Some(record.carousel_pocket),
    };
    assert_eq!(fresh.activate(&record, &sweep).unwrap(), AtcMode::Fault);
    assert_eq!(
        fresh.query_state().last_fault,
        Some(FaultReason::AbandonedCycle)
    );

    let mut session = fresh.start_recovery().unwrap();
    session.resume_mid_change().unwrap();
    session.clear_fault().unwrap();
    session.complete_recovery().unwrap();
    assert_eq!(fresh.boot_record().cycle_target, None);
}
