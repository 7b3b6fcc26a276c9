//! Shared fixtures for the integration tests.

mod concurrency;
mod interlocks;
mod recovery;
mod timeout;
mod tool_change;

use std::sync::Arc;

use atc_changer::runtime::Atc;
use atc_changer::sim::SimulatedMotion;
use atc_common::prelude::*;
use parking_lot::Mutex;

/// Listener that records every notification.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<AtcEvent>>>,
}

impl Recorder {
    pub fn attach(atc: &Atc) -> Self {
        let recorder = Self::default();
        let sink = Arc::clone(&recorder.events);
        atc.subscribe(move |e: &AtcEvent| sink.lock().push(e.clone()));
        recorder
    }

    pub fn take(&self) -> Vec<AtcEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn progress(&self) -> Vec<u8> {
        self.events
            .lock()
            .iter()
            .filter_map(AtcEvent::progress_percent)
            .collect()
    }

    pub fn recovery_progress(&self) -> Vec<(String, u8)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                AtcEvent::Recovery(RecoveryEvent::Progress { step, percent }) => {
                    Some((step.clone(), *percent))
                }
                _ => None,
            })
            .collect()
    }

    pub fn faults(&self) -> Vec<FaultReason> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                AtcEvent::Fault { reason } => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Changer with `pockets` pockets, tool `100 + n` in pocket n except the
/// home pocket, and tool 1 in the spindle.
pub fn loaded_changer(pockets: u8) -> (Atc, SimulatedMotion) {
    let sim = SimulatedMotion::new();
    let atc = Atc::from_config(ChangerConfig::with_pockets(pockets), sim.clone()).unwrap();
    for pocket in 2..=pockets {
        atc.confirm_occupancy(pocket, Some(100 + ToolNumber::from(pocket)))
            .unwrap();
    }
    atc.confirm_spindle(Some(1)).unwrap();
    sim.clear();
    (atc, sim)
}

/// Assert the uniqueness invariant over pockets and spindle.
pub fn assert_unique_tools(atc: &Atc) {
    let snap = atc.query_state();
    let mut tools: Vec<ToolNumber> = snap.pockets.iter().filter_map(|p| p.occupant).collect();
    tools.extend(snap.spindle_tool);
    let count = tools.len();
    tools.sort_unstable();
    tools.dedup();
    assert_eq!(tools.len(), count, "duplicate tool in {snap:?}");
}

/// Strictly increasing, bounded, ending at 100.
pub fn assert_progress_sequence(percents: &[u8]) {
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|w| w[0] < w[1]), "{percents:?}");
    assert!(percents.iter().all(|p| *p <= 100));
    assert_eq!(percents.last(), Some(&100));
}
