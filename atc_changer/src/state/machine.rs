//! ATC state machine: Ready → Busy → Ready, Busy/Ready → Fault,
//! Fault → Ready (recovery only).
//!
//! Owns the pocket registry, the interlock monitor and the single active
//! tool-change cycle. Notifications are queued in an outbox and drained by
//! the caller after the state mutation, so listeners never run while the
//! state is locked.
//!
//! Invariants:
//! - Busy ⇔ exactly one active cycle.
//! - Fault ⇒ no active cycle.
//! - A fault never changes pocket occupancy; the last confirmed occupancy
//!   stays authoritative.

use std::fmt;
use std::time::{Duration, Instant};

use atc_common::changer::config::{ChangerConfig, StepKind};
use atc_common::changer::error::{AtcError, FaultReason};
use atc_common::changer::event::AtcEvent;
use atc_common::changer::safety::{InterlockField, InterlockState};
use atc_common::changer::state::{
    AtcMode, BootRecord, PocketHealth, PocketId, SensorSweep, ToolNumber,
};
use tracing::{debug, error, info, warn};

use super::cycle::{CycleProgress, ToolChangeCycle};
use super::pockets::{Pocket, PocketRegistry};
use crate::command::motion::{MotionCommand, MotionLayer, plan_rotation};
use crate::safety::interlock::InterlockMonitor;
use crate::safety::recovery::RecoveryToken;

/// Completion event reported by the motion layer for the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Done,
    Failed(String),
}

/// Result of a step completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Next step issued.
    Advanced { step_index: usize, percent: u8 },
    /// Final step confirmed; changer back to Ready.
    Completed {
        pocket: PocketId,
        spindle_tool: Option<ToolNumber>,
    },
    /// No active cycle. Late or duplicate event, nothing changed.
    Ignored,
}

/// Consistent read of the whole changer state.
#[derive(Debug, Clone, PartialEq)]
pub struct AtcSnapshot {
    pub mode: AtcMode,
    pub cycle: Option<CycleProgress>,
    pub pockets: Vec<Pocket>,
    pub interlocks: InterlockState,
    pub spindle_tool: Option<ToolNumber>,
    pub carousel_pocket: PocketId,
    pub last_fault: Option<FaultReason>,
    pub recovery_active: bool,
}

/// Top-level changer state machine.
pub struct AtcStateMachine {
    mode: AtcMode,
    config: ChangerConfig,
    interlocks: InterlockMonitor,
    pockets: PocketRegistry,
    motion: Box<dyn MotionLayer>,
    cycle: Option<ToolChangeCycle>,
    spindle_tool: Option<ToolNumber>,
    /// Pocket aligned with the spindle (last confirmed).
    carousel_pocket: PocketId,
    /// Target of the last cycle discarded by a fault.
    interrupted_target: Option<PocketId>,
    last_fault: Option<FaultReason>,
    recovery_active: bool,
    outbox: Vec<AtcEvent>,
}

impl fmt::Debug for AtcStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtcStateMachine")
            .field("mode", &self.mode)
            .field("cycle", &self.cycle)
            .field("spindle_tool", &self.spindle_tool)
            .field("carousel_pocket", &self.carousel_pocket)
            .field("last_fault", &self.last_fault)
            .finish_non_exhaustive()
    }
}

impl AtcStateMachine {
    /// Create a Ready state machine from its collaborators.
    ///
    /// The carousel is assumed at `config.home_pocket` with an empty
    /// spindle until [`activate`](Self::activate) or a confirmed event
    /// says otherwise.
    pub fn new(
        config: ChangerConfig,
        interlocks: InterlockMonitor,
        pockets: PocketRegistry,
        motion: Box<dyn MotionLayer>,
    ) -> Self {
        let carousel_pocket = config.home_pocket;
        Self {
            mode: AtcMode::Ready,
            config,
            interlocks,
            pockets,
            motion,
            cycle: None,
            spindle_tool: None,
            carousel_pocket,
            interrupted_target: None,
            last_fault: None,
            recovery_active: false,
            outbox: Vec::new(),
        }
    }

    /// Create with default interlocks and an empty registry sized from config.
    pub fn from_config(config: ChangerConfig, motion: Box<dyn MotionLayer>) -> Self {
        let pockets = PocketRegistry::new(config.pockets);
        Self::new(config, InterlockMonitor::default(), pockets, motion)
    }

    // ─── Reads ──────────────────────────────────────────────────────

    #[inline]
    pub const fn mode(&self) -> AtcMode {
        self.mode
    }

    #[inline]
    pub const fn interlocks(&self) -> InterlockState {
        self.interlocks.state()
    }

    #[inline]
    pub const fn pockets(&self) -> &PocketRegistry {
        &self.pockets
    }

    #[inline]
    pub const fn spindle_tool(&self) -> Option<ToolNumber> {
        self.spindle_tool
    }

    #[inline]
    pub const fn carousel_pocket(&self) -> PocketId {
        self.carousel_pocket
    }

    #[inline]
    pub const fn config(&self) -> &ChangerConfig {
        &self.config
    }

    pub fn active_cycle(&self) -> Option<&ToolChangeCycle> {
        self.cycle.as_ref()
    }

    pub fn last_fault(&self) -> Option<&FaultReason> {
        self.last_fault.as_ref()
    }

    /// Target of the last cycle discarded by a fault, until recovery clears it.
    #[inline]
    pub const fn interrupted_target(&self) -> Option<PocketId> {
        self.interrupted_target
    }

    #[inline]
    pub const fn recovery_active(&self) -> bool {
        self.recovery_active
    }

    /// Mode, cycle progress and pocket snapshot. Available in every mode.
    pub fn query_state(&self) -> AtcSnapshot {
        AtcSnapshot {
            mode: self.mode,
            cycle: self.cycle.as_ref().map(ToolChangeCycle::progress),
            pockets: self.pockets.all().copied().collect(),
            interlocks: self.interlocks.state(),
            spindle_tool: self.spindle_tool,
            carousel_pocket: self.carousel_pocket,
            last_fault: self.last_fault.clone(),
            recovery_active: self.recovery_active,
        }
    }

    /// Record for the external tool-table layer to persist.
    ///
    /// `cycle_target` is set while a cycle is in flight or an interrupted
    /// cycle has not been recovered, so a restart comes up in Fault.
    pub fn boot_record(&self) -> BootRecord {
        BootRecord {
            occupancy: self.pockets.occupancy(),
            spindle_tool: self.spindle_tool,
            carousel_pocket: self.carousel_pocket,
            cycle_target: self
                .cycle
                .as_ref()
                .map(ToolChangeCycle::target_pocket)
                .or(self.interrupted_target),
        }
    }

    /// Take all queued notifications.
    pub fn drain_events(&mut self) -> Vec<AtcEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    /// Start a tool change toward `target`.
    ///
    /// Requires Ready, a valid target distinct from the pocket at the
    /// spindle, and closed interlocks. Every rejection leaves all state
    /// untouched.
    pub fn start_cycle(&mut self, target: PocketId, now: Instant) -> Result<(), AtcError> {
        if self.mode != AtcMode::Ready {
            return Err(AtcError::NotReady { mode: self.mode });
        }
        self.validate_target(target)?;
        self.interlocks.require()?;

        let first_kind = self
            .config
            .steps
            .first()
            .map_or(StepKind::Auxiliary, |s| s.kind);
        let limit = self.step_limit(first_kind, target);
        let cycle = ToolChangeCycle::plan(&self.config, target, now, limit);
        let first = cycle.current_step().cloned();

        info!(
            pocket = target,
            from = self.carousel_pocket,
            spindle_tool = ?self.spindle_tool,
            "tool change started"
        );
        self.cycle = Some(cycle);
        self.set_mode(AtcMode::Busy);

        if let Some(step) = first {
            self.emit(AtcEvent::progress(step.description, step.progress_percent));
            if let Err(err) = self.issue_step(step.kind, target) {
                return Err(self.escalate(err));
            }
        }
        Ok(())
    }

    /// Handle the completion event of the current step.
    ///
    /// Without an active cycle the event is ignored with a warning. An
    /// overdue or failed step, a closed gate before the next step, or a
    /// registry conflict on the final step moves the changer to Fault.
    pub fn advance_step(
        &mut self,
        result: StepResult,
        now: Instant,
    ) -> Result<StepOutcome, AtcError> {
        let Some(cycle) = self.cycle.as_ref() else {
            warn!(?result, mode = %self.mode, "step event without active cycle ignored");
            return Ok(StepOutcome::Ignored);
        };
        let index = cycle.current_step_index();
        let target = cycle.target_pocket();

        if cycle.is_overdue(now) {
            let limit_ms = cycle.step_limit().as_millis() as u64;
            return Err(self.escalate(AtcError::StepTimeout {
                step: index,
                limit_ms,
            }));
        }
        if let StepResult::Failed(reason) = result {
            return Err(self.escalate(AtcError::StepFailed {
                step: index,
                reason,
            }));
        }
        if cycle.is_final_step() {
            return self.complete_cycle();
        }
        let next_kind = cycle
            .steps()
            .get(index + 1)
            .map_or(StepKind::Auxiliary, |s| s.kind);

        if let Err(err) = self.interlocks.require() {
            return Err(self.escalate(err));
        }

        let limit = self.step_limit(next_kind, target);
        let Some(step) = self
            .cycle
            .as_mut()
            .and_then(|c| c.advance(now, limit))
            .cloned()
        else {
            return Ok(StepOutcome::Ignored);
        };

        debug!(
            step = index + 1,
            percent = step.progress_percent,
            "{}",
            step.description
        );
        self.emit(AtcEvent::progress(
            step.description.clone(),
            step.progress_percent,
        ));
        if let Err(err) = self.issue_step(step.kind, target) {
            return Err(self.escalate(err));
        }
        Ok(StepOutcome::Advanced {
            step_index: index + 1,
            percent: step.progress_percent,
        })
    }

    /// Fault the changer if the current step's acknowledgement is overdue.
    pub fn check_timeouts(&mut self, now: Instant) -> Option<AtcError> {
        let cycle = self.cycle.as_ref()?;
        if !cycle.is_overdue(now) {
            return None;
        }
        let err = AtcError::StepTimeout {
            step: cycle.current_step_index(),
            limit_ms: cycle.step_limit().as_millis() as u64,
        };
        Some(self.escalate(err))
    }

    /// Enter Fault, discarding any active cycle.
    ///
    /// Pocket occupancy is left as last confirmed; the interrupted cycle's
    /// target pocket is marked faulted. Repeated reports while in Fault
    /// are logged and otherwise ignored.
    pub fn report_fault(&mut self, reason: FaultReason) {
        if self.mode == AtcMode::Fault {
            warn!(%reason, "fault reported while already in Fault");
            return;
        }
        if let Some(cycle) = self.cycle.take() {
            let target = cycle.target_pocket();
            warn!(
                pocket = target,
                step = cycle.current_step_index(),
                "tool change abandoned"
            );
            self.interrupted_target = Some(target);
            if self.mark_faulted(target) {
                self.emit_pocket(target);
            }
        }
        error!(%reason, "ATC fault");
        self.last_fault = Some(reason.clone());
        self.set_mode(AtcMode::Fault);
        self.emit(AtcEvent::Fault { reason });
    }

    // ─── Sensor / Confirmed Events ──────────────────────────────────

    /// Update one interlock input. Returns true if it changed.
    ///
    /// A change never faults by itself; the gate is enforced before the
    /// next command.
    pub fn update_interlock(&mut self, field: InterlockField, value: bool) -> bool {
        let changed = self.interlocks.update(field, value);
        if changed {
            self.emit(AtcEvent::Interlocks(self.interlocks.state()));
        }
        changed
    }

    /// Replace all interlock inputs. Returns true if anything changed.
    pub fn set_interlocks(&mut self, state: InterlockState) -> bool {
        let changed = self.interlocks.replace(state);
        if changed {
            self.emit(AtcEvent::Interlocks(state));
        }
        changed
    }

    /// Confirmed load/unload of a pocket outside a cycle.
    ///
    /// Rejected while Busy. A duplicate tool moves the changer to Fault.
    pub fn confirm_occupancy(
        &mut self,
        pocket: PocketId,
        occupant: Option<ToolNumber>,
    ) -> Result<(), AtcError> {
        if self.mode == AtcMode::Busy {
            return Err(AtcError::NotReady { mode: self.mode });
        }
        if let Some(tool) = occupant {
            if self.spindle_tool == Some(tool) {
                return Err(self.escalate(AtcError::DuplicateTool { tool, pocket }));
            }
        }
        match self.pockets.set_occupant(pocket, occupant) {
            Ok(()) => {
                info!(pocket, ?occupant, "pocket occupancy confirmed");
                self.emit_pocket(pocket);
                Ok(())
            }
            Err(err @ AtcError::DuplicateTool { .. }) => Err(self.escalate(err)),
            Err(err) => Err(err),
        }
    }

    /// Confirmed spindle contents outside a cycle.
    pub fn confirm_spindle(&mut self, tool: Option<ToolNumber>) -> Result<(), AtcError> {
        if self.mode == AtcMode::Busy {
            return Err(AtcError::NotReady { mode: self.mode });
        }
        if let Some(tool) = tool {
            if let Some(pocket) = self.pockets.find_tool(tool) {
                return Err(self.escalate(AtcError::DuplicateTool { tool, pocket }));
            }
        }
        info!(?tool, "spindle tool confirmed");
        self.spindle_tool = tool;
        Ok(())
    }

    /// Re-initialize from the last persisted record and a fresh sweep.
    ///
    /// Comes up in Fault when the record shows a cycle in flight, when the
    /// record is inconsistent, or when the sweep disagrees with it.
    /// Disagreeing pockets are marked faulted.
    pub fn activate(&mut self, boot: &BootRecord, sweep: &SensorSweep) -> Result<AtcMode, AtcError> {
        if self.mode != AtcMode::Ready {
            return Err(AtcError::NotReady { mode: self.mode });
        }
        self.pockets.reset();
        self.spindle_tool = None;
        self.interrupted_target = None;
        self.last_fault = None;

        let count = self.pockets.len();
        let mut desync = boot.occupancy.len() != count || sweep.occupied.len() != count;
        if desync {
            warn!(
                pockets = count,
                record = boot.occupancy.len(),
                sweep = sweep.occupied.len(),
                "activation data does not cover the carousel"
            );
        }

        for (i, occupant) in boot.occupancy.iter().take(count).enumerate() {
            let pocket = (i + 1) as PocketId;
            if let Err(err) = self.pockets.set_occupant(pocket, *occupant) {
                warn!(pocket, %err, "persisted occupancy rejected");
                self.mark_faulted(pocket);
                desync = true;
            }
        }

        if let Some(tool) = boot.spindle_tool {
            match self.pockets.find_tool(tool) {
                Some(pocket) => {
                    warn!(tool, pocket, "spindle tool also recorded in a pocket");
                    self.mark_faulted(pocket);
                    desync = true;
                }
                None => self.spindle_tool = Some(tool),
            }
        }

        let mut encoder_mismatch = false;
        if self.pockets.contains(boot.carousel_pocket) {
            self.carousel_pocket = boot.carousel_pocket;
        } else {
            warn!(pocket = boot.carousel_pocket, "persisted carousel pocket out of range");
            encoder_mismatch = true;
        }
        if let Some(sensed) = sweep.carousel_pocket {
            if sensed != self.carousel_pocket {
                warn!(
                    recorded = self.carousel_pocket,
                    sensed, "encoder disagrees with recorded carousel pocket"
                );
                encoder_mismatch = true;
            }
        }

        let mismatched: Vec<PocketId> = self
            .pockets
            .all()
            .filter(|p| sweep.occupied.get(p.id as usize - 1).copied() != Some(p.occupant.is_some()))
            .map(|p| p.id)
            .collect();
        for pocket in &mismatched {
            self.mark_faulted(*pocket);
        }
        if !mismatched.is_empty() {
            warn!(?mismatched, "sensor sweep disagrees with registry");
            desync = true;
        }

        let pockets: Vec<PocketId> = self.pockets.all().map(|p| p.id).collect();
        for pocket in pockets {
            self.emit_pocket(pocket);
        }

        let reason = if let Some(target) = boot.cycle_target {
            if self.mark_faulted(target) {
                self.emit_pocket(target);
            }
            self.interrupted_target = Some(target);
            Some(FaultReason::AbandonedCycle)
        } else if desync {
            Some(FaultReason::Desynchronized)
        } else if encoder_mismatch {
            Some(FaultReason::EncoderMismatch)
        } else {
            None
        };

        match reason {
            Some(reason) => self.report_fault(reason),
            None => info!(
                carousel_pocket = self.carousel_pocket,
                spindle_tool = ?self.spindle_tool,
                "activated, registry matches sensor sweep"
            ),
        }
        Ok(self.mode)
    }

    /// Re-emit every pocket state (for a display attaching late).
    pub fn pocket_notifications(&mut self) {
        let pockets: Vec<PocketId> = self.pockets.all().map(|p| p.id).collect();
        for pocket in pockets {
            self.emit_pocket(pocket);
        }
    }

    /// Operator message to the display layer.
    pub fn message(&mut self, text: impl Into<String>) {
        self.emit(AtcEvent::Message(text.into()));
    }

    // ─── Recovery ───────────────────────────────────────────────────

    /// Fault → Ready. Only a completed recovery session holds a token.
    pub fn resolve_fault(&mut self, _token: RecoveryToken) -> Result<(), AtcError> {
        if self.mode != AtcMode::Fault {
            return Err(AtcError::NotReady { mode: self.mode });
        }
        if self.pockets.has_faults() {
            return Err(AtcError::RecoveryIncomplete("pockets still marked faulted"));
        }
        self.interlocks.require()?;

        info!(previous = ?self.last_fault, "fault resolved by recovery");
        self.interrupted_target = None;
        self.last_fault = None;
        self.set_mode(AtcMode::Ready);
        Ok(())
    }

    pub(crate) fn begin_recovery(&mut self) -> Result<(), AtcError> {
        if self.mode != AtcMode::Fault {
            return Err(AtcError::NotReady { mode: self.mode });
        }
        if self.recovery_active {
            return Err(AtcError::RecoveryInProgress);
        }
        self.recovery_active = true;
        Ok(())
    }

    pub(crate) fn end_recovery(&mut self) {
        self.recovery_active = false;
    }

    /// Gated motion command on behalf of a recovery action.
    ///
    /// Only valid in Fault; grants no bypass of the interlock gate.
    pub(crate) fn recovery_motion(&mut self, command: MotionCommand) -> Result<(), AtcError> {
        if self.mode != AtcMode::Fault {
            return Err(AtcError::NotReady { mode: self.mode });
        }
        self.issue(command)
    }

    pub(crate) fn require_interlocks(&self) -> Result<(), AtcError> {
        self.interlocks.require()
    }

    pub(crate) fn set_carousel_pocket(&mut self, pocket: PocketId) {
        debug!(pocket, "carousel position confirmed");
        self.carousel_pocket = pocket;
    }

    /// Restore pocket health and forget the interrupted cycle.
    pub(crate) fn clear_faults(&mut self) {
        for pocket in self.pockets.clear_faults() {
            self.emit_pocket(pocket);
        }
        self.interrupted_target = None;
    }

    pub(crate) fn notify(&mut self, event: AtcEvent) {
        self.emit(event);
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn validate_target(&self, target: PocketId) -> Result<(), AtcError> {
        let Some(pocket) = self.pockets.get(target) else {
            return Err(AtcError::InvalidTarget {
                pocket: target,
                reason: "pocket out of range",
            });
        };
        if target == self.carousel_pocket {
            return Err(AtcError::InvalidTarget {
                pocket: target,
                reason: "pocket already at spindle",
            });
        }
        if pocket.health == PocketHealth::Faulted {
            return Err(AtcError::InvalidTarget {
                pocket: target,
                reason: "pocket faulted",
            });
        }
        Ok(())
    }

    /// Acknowledgement bound for a step of `kind` toward `target`.
    fn step_limit(&self, kind: StepKind, target: PocketId) -> Duration {
        let base = self.config.step_timeout();
        if kind != StepKind::Rotate {
            return base;
        }
        let (steps, _) = plan_rotation(self.carousel_pocket, target, self.pockets.len() as u8);
        base + self.config.rotation_step() * steps
    }

    fn issue_step(&mut self, kind: StepKind, target: PocketId) -> Result<(), AtcError> {
        let command = match kind {
            StepKind::Unload => MotionCommand::Unload { pocket: target },
            StepKind::Rotate => {
                let (steps, direction) =
                    plan_rotation(self.carousel_pocket, target, self.pockets.len() as u8);
                MotionCommand::Rotate { steps, direction }
            }
            StepKind::Load => MotionCommand::Load { pocket: target },
            StepKind::Auxiliary => return Ok(()),
        };
        self.issue(command)
    }

    /// Gate check immediately followed by the command.
    fn issue(&mut self, command: MotionCommand) -> Result<(), AtcError> {
        self.interlocks.require()?;
        debug!(%command, "motion command");
        self.motion
            .issue(command)
            .map_err(|e| AtcError::Motion(e.to_string()))
    }

    fn complete_cycle(&mut self) -> Result<StepOutcome, AtcError> {
        let Some(target) = self.cycle.as_ref().map(ToolChangeCycle::target_pocket) else {
            return Ok(StepOutcome::Ignored);
        };
        let incoming = self.pockets.get(target).and_then(|p| p.occupant);
        let outgoing = self.spindle_tool;

        if let Some(tool) = outgoing {
            if incoming == Some(tool) {
                return Err(self.escalate(AtcError::DuplicateTool { tool, pocket: target }));
            }
        }
        if let Err(err) = self.pockets.set_occupant(target, outgoing) {
            return Err(self.escalate(err));
        }

        self.cycle = None;
        self.spindle_tool = incoming;
        self.carousel_pocket = target;
        self.emit_pocket(target);
        info!(
            pocket = target,
            stored = ?outgoing,
            spindle_tool = ?incoming,
            "tool change complete"
        );
        self.set_mode(AtcMode::Ready);
        Ok(StepOutcome::Completed {
            pocket: target,
            spindle_tool: incoming,
        })
    }

    /// Fault with the reason matching `err`, then hand `err` back.
    fn escalate(&mut self, err: AtcError) -> AtcError {
        debug_assert!(err.escalates(), "{err} is not a cycle error");
        self.report_fault(FaultReason::from(&err));
        err
    }

    fn set_mode(&mut self, mode: AtcMode) {
        if self.mode == mode {
            return;
        }
        info!(from = %self.mode, to = %mode, "ATC mode change");
        self.mode = mode;
        self.emit(AtcEvent::Mode { mode });
    }

    /// Mark `pocket` faulted. Returns false, logged, for an unknown id.
    fn mark_faulted(&mut self, pocket: PocketId) -> bool {
        match self.pockets.mark_faulted(pocket) {
            Ok(()) => true,
            Err(err) => {
                warn!(pocket, %err, "cannot mark pocket faulted");
                false
            }
        }
    }

    fn emit_pocket(&mut self, pocket: PocketId) {
        if let Some(p) = self.pockets.get(pocket) {
            let state = p.state();
            self.emit(AtcEvent::Pocket { pocket, state });
        }
    }

    #[inline]
    fn emit(&mut self, event: AtcEvent) {
        self.outbox.push(event);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
