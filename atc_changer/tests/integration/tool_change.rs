//! Integration test: full tool-change cycles.

use atc_changer::command::motion::MotionCommand;
use atc_changer::state::machine::{StepOutcome, StepResult};
use atc_common::prelude::*;

use super::{Recorder, assert_progress_sequence, assert_unique_tools, loaded_changer};

fn run_to_completion(atc: &atc_changer::runtime::Atc) -> StepOutcome {
    loop {
        match atc.advance_step(StepResult::Done).unwrap() {
            StepOutcome::Advanced { .. } => {}
            other => return other,
        }
    }
}

#[test]
fn twelve_pocket_change_to_five() {
    let (atc, sim) = loaded_changer(12);
    let recorder = Recorder::attach(&atc);

    atc.start_cycle(5).unwrap();
    assert_eq!(atc.mode(), AtcMode::Busy);
    let outcome = run_to_completion(&atc);

    assert_eq!(
        outcome,
        StepOutcome::Completed {
            pocket: 5,
            spindle_tool: Some(105)
        }
    );
    assert_eq!(recorder.progress(), vec![33, 66, 100]);

    let snap = atc.query_state();
    assert_eq!(snap.mode, AtcMode::Ready);
    assert!(snap.cycle.is_none());
    // Previous spindle tool now stored in pocket 5.
    assert_eq!(snap.pockets[4].state(), PocketState::Occupied(1));
    // Pocket previously at the spindle stays empty.
    assert_eq!(snap.pockets[0].state(), PocketState::Empty);
    assert_eq!(snap.spindle_tool, Some(105));
    assert_eq!(snap.carousel_pocket, 5);

    assert_eq!(
        sim.commands(),
        vec![
            MotionCommand::Unload { pocket: 5 },
            MotionCommand::Rotate {
                steps: 4,
                direction: Direction::Cw
            },
            MotionCommand::Load { pocket: 5 },
        ]
    );
    assert_unique_tools(&atc);
}

#[test]
fn consecutive_changes_keep_tools_unique() {
    let (atc, _) = loaded_changer(8);
    for target in [3, 7, 2, 8, 3] {
        atc.start_cycle(target).unwrap();
        run_to_completion(&atc);
        assert_eq!(atc.mode(), AtcMode::Ready);
        assert_eq!(atc.query_state().carousel_pocket, target);
        assert_unique_tools(&atc);
    }
}

#[test]
fn second_start_without_completion_fails() {
    let (atc, sim) = loaded_changer(12);
    atc.start_cycle(4).unwrap();
    let before = atc.query_state();
    let issued = sim.commands().len();

    assert_eq!(
        atc.start_cycle(6),
        Err(AtcError::NotReady { mode: AtcMode::Busy })
    );
    let after = atc.query_state();
    assert_eq!(after.pockets, before.pockets);
    assert_eq!(after.interlocks, before.interlocks);
    assert_eq!(after.cycle.unwrap().target_pocket, 4);
    assert_eq!(sim.commands().len(), issued);
}

#[test]
fn start_in_fault_fails_until_recovery() {
    let (atc, _) = loaded_changer(12);
    atc.report_fault(FaultReason::EncoderMismatch);
    let before = atc.query_state();
    assert_eq!(
        atc.start_cycle(3),
        Err(AtcError::NotReady { mode: AtcMode::Fault })
    );
    assert_eq!(atc.query_state(), before);
}

#[test]
fn step_event_without_cycle_changes_nothing() {
    let (atc, _) = loaded_changer(12);
    let recorder = Recorder::attach(&atc);
    let before = atc.query_state();
    assert_eq!(
        atc.advance_step(StepResult::Done).unwrap(),
        StepOutcome::Ignored
    );
    assert_eq!(atc.query_state(), before);
    assert!(recorder.take().is_empty());
}

#[test]
fn auxiliary_steps_extend_progress() {
    let mut config = ChangerConfig::with_pockets(6);
    config.steps.insert(
        1,
        CycleStepConfig::new(StepKind::Auxiliary, "Opening cover"),
    );
    config.steps.push(CycleStepConfig::new(StepKind::Auxiliary, "Closing cover"));
    assert!(config.validate().is_ok());

    let sim = atc_changer::sim::SimulatedMotion::new();
    let atc = atc_changer::runtime::Atc::from_config(config, sim.clone()).unwrap();
    let recorder = Recorder::attach(&atc);
    atc.start_cycle(2).unwrap();
    run_to_completion(&atc);

    assert_eq!(recorder.progress(), vec![20, 40, 60, 80, 100]);
    assert_progress_sequence(&recorder.progress());
    // Auxiliary steps issue no motion.
    assert_eq!(sim.commands().len(), 3);
}

#[test]
fn invalid_targets_have_no_side_effects() {
    let (atc, sim) = loaded_changer(12);
    let recorder = Recorder::attach(&atc);
    for target in [0, 13, 1] {
        assert!(matches!(
            atc.start_cycle(target),
            Err(AtcError::InvalidTarget { .. })
        ));
    }
    assert_eq!(atc.mode(), AtcMode::Ready);
    assert!(sim.commands().is_empty());
    assert!(recorder.take().is_empty());
}
