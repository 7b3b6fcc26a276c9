//! Integration test: serialized entry points under concurrent callers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use atc_changer::state::machine::{StepOutcome, StepResult};
use atc_common::prelude::*;

use super::{Recorder, assert_unique_tools, loaded_changer};

#[test]
fn concurrent_starts_admit_one_cycle() {
    let (atc, _) = loaded_changer(12);
    let started = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (2..=9)
        .map(|target| {
            let atc = atc.clone();
            let started = Arc::clone(&started);
            thread::spawn(move || {
                if atc.start_cycle(target).is_ok() {
                    started.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(atc.mode(), AtcMode::Busy);
}

#[test]
fn sensor_thread_and_cycle_driver() {
    let (atc, _) = loaded_changer(12);

    let sensors = {
        let atc = atc.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                atc.update_interlock(InterlockField::EncoderReady, true);
                let _ = atc.query_state();
            }
        })
    };

    for target in [4, 9, 2] {
        atc.start_cycle(target).unwrap();
        while let StepOutcome::Advanced { .. } = atc.advance_step(StepResult::Done).unwrap() {}
        assert_eq!(atc.mode(), AtcMode::Ready);
    }
    sensors.join().unwrap();
    assert_unique_tools(&atc);
}

#[test]
fn listener_removal_does_not_affect_state() {
    let (atc, _) = loaded_changer(12);
    let recorder = Recorder::attach(&atc);
    let counter = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&counter);
    let id = atc.subscribe(move |_: &AtcEvent| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    atc.start_cycle(3).unwrap();
    assert!(atc.unsubscribe(id));
    let seen = counter.load(Ordering::SeqCst);
    atc.advance_step(StepResult::Done).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), seen);
    assert_eq!(atc.mode(), AtcMode::Busy);
    assert_eq!(recorder.progress(), vec![33, 66]);
}
