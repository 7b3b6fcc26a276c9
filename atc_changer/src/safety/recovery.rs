//! Operator-driven recovery session.
//!
//! The only path from Fault back to Ready. A session offers four bounded
//! actions, each emitting a fixed progress sequence:
//!
//! | action                   | progress           |
//! |--------------------------|--------------------|
//! | `resume_mid_change`      | 25 / 40 / 60 / 80 / 100 |
//! | `home_atc`               | 10 / 30 / 60 / 100 |
//! | `manual_jog_to_pocket`   | 20 / 50 / 100      |
//! | `clear_fault`            | 30 / 60 / 100      |
//!
//! `complete_recovery` then requests the Fault→Ready transition. Every
//! motion command goes through the same interlock gate as a normal cycle,
//! and pocket state changes only through the state machine.
//!
//! Recovery motion is treated as done once the motion layer accepts the
//! command.

use atc_common::changer::error::AtcError;
use atc_common::changer::event::{AtcEvent, RecoveryEvent};
use atc_common::changer::state::PocketId;
use tracing::{debug, info, warn};

use crate::command::motion::{MotionCommand, plan_rotation};
use crate::runtime::Atc;
use crate::state::machine::AtcStateMachine;

/// Proof that a recovery session completed. Only this module can make one.
#[derive(Debug)]
pub struct RecoveryToken {
    _seal: (),
}

/// Current step of the recovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Session open, no action run yet.
    Idle,
    Homing,
    ResumingMidChange,
    ManualJog,
    ClearingFault,
    /// Fault resolved; changer is Ready.
    Complete,
}

/// Progress reporter for one action.
#[derive(Debug, Default)]
struct ActionProgress {
    last: Option<(String, u8)>,
}

impl ActionProgress {
    fn report(&mut self, machine: &mut AtcStateMachine, percent: u8, step: impl Into<String>) {
        let step = step.into();
        debug!(percent, "{step}");
        machine.notify(AtcEvent::Recovery(RecoveryEvent::Progress {
            step: step.clone(),
            percent,
        }));
        self.last = Some((step, percent));
    }
}

/// Active recovery session.
///
/// Holds a handle to the changer, never the registry itself. Dropping an
/// unfinished session leaves the changer in Fault and allows a new session.
#[derive(Debug)]
pub struct RecoverySession {
    atc: Atc,
    active: bool,
    step: RecoveryStep,
    current_step: String,
    progress_percent: u8,
}

impl RecoverySession {
    /// Open a session. Requires Fault and no other open session.
    pub fn start(atc: &Atc) -> Result<Self, AtcError> {
        atc.with_machine(|m| {
            m.begin_recovery()?;
            m.notify(AtcEvent::Recovery(RecoveryEvent::Status(
                "Starting recovery process...".into(),
            )));
            m.notify(AtcEvent::Recovery(RecoveryEvent::Progress {
                step: "Starting recovery...".into(),
                percent: 0,
            }));
            info!(fault = ?m.last_fault(), interrupted = ?m.interrupted_target(), "recovery started");
            Ok(())
        })?;
        Ok(Self {
            atc: atc.clone(),
            active: true,
            step: RecoveryStep::Idle,
            current_step: "Starting recovery...".into(),
            progress_percent: 0,
        })
    }

    #[inline]
    pub const fn step(&self) -> RecoveryStep {
        self.step
    }

    #[inline]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Description of the last reported progress.
    pub fn current_step(&self) -> &str {
        &self.current_step
    }

    #[inline]
    pub const fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    /// Return the carousel to its last confirmed pocket by way of home.
    ///
    /// A fixed sequence; the interrupted step is not reconstructed.
    pub fn resume_mid_change(&mut self) -> Result<(), AtcError> {
        self.run(RecoveryStep::ResumingMidChange, |m, progress| {
            m.require_interlocks()?;
            progress.report(m, 25, "Resuming tool change...");
            let resume_at = m.carousel_pocket();
            m.recovery_motion(MotionCommand::Home)?;
            let home = m.config().home_pocket;
            m.set_carousel_pocket(home);
            progress.report(m, 40, "Checking ATC position...");

            let (steps, direction) = plan_rotation(home, resume_at, m.pockets().len() as u8);
            if steps > 0 {
                m.recovery_motion(MotionCommand::Rotate { steps, direction })?;
            }
            m.set_carousel_pocket(resume_at);
            progress.report(m, 60, "Verifying tool position...");
            progress.report(m, 80, "Completing tool change...");
            progress.report(m, 100, "Recovery complete");
            Ok(())
        })
    }

    /// Home the carousel; the carousel is then at the configured home pocket.
    pub fn home_atc(&mut self) -> Result<(), AtcError> {
        self.run(RecoveryStep::Homing, |m, progress| {
            m.require_interlocks()?;
            progress.report(m, 10, "Homing ATC...");
            m.recovery_motion(MotionCommand::Home)?;
            progress.report(m, 30, "Moving to home position...");
            let home = m.config().home_pocket;
            m.set_carousel_pocket(home);
            progress.report(m, 60, "Checking sensors...");
            progress.report(m, 100, "ATC homed successfully");
            m.message(format!("ATC homed, pocket {home} at spindle"));
            Ok(())
        })
    }

    /// Rotate the carousel to `pocket`. Still gated by the interlocks.
    pub fn manual_jog_to_pocket(&mut self, pocket: PocketId) -> Result<(), AtcError> {
        self.run(RecoveryStep::ManualJog, |m, progress| {
            if !m.pockets().contains(pocket) {
                return Err(AtcError::InvalidTarget {
                    pocket,
                    reason: "pocket out of range",
                });
            }
            m.require_interlocks()?;
            progress.report(m, 20, format!("Jogging to pocket {pocket}..."));
            let (steps, direction) =
                plan_rotation(m.carousel_pocket(), pocket, m.pockets().len() as u8);
            m.recovery_motion(MotionCommand::Rotate { steps, direction })?;
            progress.report(m, 50, format!("Moving to pocket {pocket}..."));
            m.set_carousel_pocket(pocket);
            progress.report(m, 100, format!("Positioned at pocket {pocket}"));
            Ok(())
        })
    }

    /// Clear pocket fault marks and the interrupted-cycle record.
    pub fn clear_fault(&mut self) -> Result<(), AtcError> {
        self.run(RecoveryStep::ClearingFault, |m, progress| {
            progress.report(m, 30, "Clearing fault...");
            progress.report(m, 60, "Resetting ATC state...");
            m.clear_faults();
            progress.report(m, 100, "Fault cleared successfully");
            Ok(())
        })
    }

    /// Return to Ready and close the session.
    ///
    /// Clears any remaining pocket fault marks and the interrupted-cycle
    /// record. Only the interlock gate can refuse; the session then stays
    /// open with nothing changed.
    pub fn complete_recovery(&mut self) -> Result<(), AtcError> {
        self.require_active()?;
        self.atc.with_machine(|m| {
            m.require_interlocks()?;
            m.clear_faults();
            m.resolve_fault(RecoveryToken { _seal: () })?;
            m.end_recovery();
            m.notify(AtcEvent::Recovery(RecoveryEvent::Progress {
                step: "Recovery completed".into(),
                percent: 100,
            }));
            m.notify(AtcEvent::Recovery(RecoveryEvent::Status(
                "Recovery completed successfully".into(),
            )));
            Ok(())
        })?;
        info!("recovery completed");
        self.active = false;
        self.step = RecoveryStep::Complete;
        self.current_step = "Recovery completed".into();
        self.progress_percent = 100;
        Ok(())
    }

    fn require_active(&self) -> Result<(), AtcError> {
        if self.active {
            Ok(())
        } else {
            Err(AtcError::RecoveryInactive)
        }
    }

    /// Enter `step` and run one action under the changer lock.
    ///
    /// A failed action leaves the session in `step`.
    fn run<F>(&mut self, step: RecoveryStep, action: F) -> Result<(), AtcError>
    where
        F: FnOnce(&mut AtcStateMachine, &mut ActionProgress) -> Result<(), AtcError>,
    {
        self.require_active()?;
        self.step = step;
        let mut progress = ActionProgress::default();
        let result = self.atc.with_machine(|m| action(m, &mut progress));
        if let Some((text, percent)) = progress.last {
            self.current_step = text;
            self.progress_percent = percent;
        }
        if let Err(err) = &result {
            warn!(?step, %err, "recovery action failed");
        }
        result
    }
}

impl Drop for RecoverySession {
    fn drop(&mut self) {
        if self.active {
            warn!(step = ?self.step, "recovery session abandoned");
            self.atc.with_machine(AtcStateMachine::end_recovery);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
