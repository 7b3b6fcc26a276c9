//! Tool-change cycle.
//!
//! A fixed, ordered step sequence built from the configured step list.
//! Each step carries its own progress percent: `(i + 1) * 100 / n`, so
//! progress is strictly increasing and reaches 100 only on the final step.
//! The cycle never retries a step; failures surface through the owning
//! state machine.

use std::time::{Duration, Instant};

use atc_common::changer::config::{ChangerConfig, StepKind};
use atc_common::changer::state::PocketId;
use atc_common::consts::MAX_CYCLE_STEPS;

/// One planned step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStep {
    pub kind: StepKind,
    pub description: String,
    pub progress_percent: u8,
}

/// Read-only view of an active cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleProgress {
    pub target_pocket: PocketId,
    pub step_index: usize,
    pub step_count: usize,
    pub description: String,
    pub percent: u8,
}

/// Active tool-change cycle. Exists only while the changer is Busy.
#[derive(Debug, Clone)]
pub struct ToolChangeCycle {
    target_pocket: PocketId,
    steps: heapless::Vec<CycleStep, MAX_CYCLE_STEPS>,
    current_step_index: usize,
    started_at: Instant,
    step_started_at: Instant,
    step_limit: Duration,
}

impl ToolChangeCycle {
    /// Plan a cycle toward `target` from the configured steps.
    ///
    /// `step_limit` is the acknowledgement bound of the first step.
    pub fn plan(config: &ChangerConfig, target: PocketId, now: Instant, step_limit: Duration) -> Self {
        let n = config.steps.len().clamp(1, MAX_CYCLE_STEPS);
        let steps = config
            .steps
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, step)| CycleStep {
                kind: step.kind,
                description: step.describe(target),
                progress_percent: ((i + 1) * 100 / n) as u8,
            })
            .collect();
        Self {
            target_pocket: target,
            steps,
            current_step_index: 0,
            started_at: now,
            step_started_at: now,
            step_limit,
        }
    }

    #[inline]
    pub const fn target_pocket(&self) -> PocketId {
        self.target_pocket
    }

    #[inline]
    pub const fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    #[inline]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[CycleStep] {
        &self.steps
    }

    /// Step currently awaiting its completion event.
    pub fn current_step(&self) -> Option<&CycleStep> {
        self.steps.get(self.current_step_index)
    }

    /// Whether the current step is the last one.
    #[inline]
    pub fn is_final_step(&self) -> bool {
        self.current_step_index + 1 >= self.steps.len()
    }

    /// Move to the next step. Returns `None` when already on the final step.
    pub fn advance(&mut self, now: Instant, step_limit: Duration) -> Option<&CycleStep> {
        if self.is_final_step() {
            return None;
        }
        self.current_step_index += 1;
        self.step_started_at = now;
        self.step_limit = step_limit;
        self.steps.get(self.current_step_index)
    }

    /// Acknowledgement bound of the current step.
    #[inline]
    pub const fn step_limit(&self) -> Duration {
        self.step_limit
    }

    /// Whether the current step's acknowledgement is overdue at `now`.
    pub fn is_overdue(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.step_started_at) > self.step_limit
    }

    /// Snapshot for display.
    pub fn progress(&self) -> CycleProgress {
        let (description, percent) = self
            .current_step()
            .map(|s| (s.description.clone(), s.progress_percent))
            .unwrap_or_default();
        CycleProgress {
            target_pocket: self.target_pocket,
            step_index: self.current_step_index,
            step_count: self.steps.len(),
            description,
            percent,
        }
    }
}
