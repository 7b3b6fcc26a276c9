//! Error taxonomy for the tool changer.
//!
//! `NotReady` and `InvalidTarget` are local to the requested operation and
//! leave all state untouched. `InterlockViolation`, `DuplicateTool`,
//! `StepTimeout` and `StepFailed` detected during an active cycle always
//! move the changer to `Fault`. Nothing is retried automatically.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::safety::InterlockFault;
use super::state::{AtcMode, PocketId, ToolNumber};

/// Errors returned by changer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtcError {
    /// Operation not valid in the current mode.
    #[error("ATC not ready (mode: {mode})")]
    NotReady { mode: AtcMode },

    /// Target pocket out of range or unusable.
    #[error("invalid target pocket {pocket}: {reason}")]
    InvalidTarget {
        pocket: PocketId,
        reason: &'static str,
    },

    /// Safety gate failed.
    #[error("interlock violation: {0:?}")]
    InterlockViolation(InterlockFault),

    /// Tool number already held by another pocket or the spindle.
    #[error("tool {tool} cannot be placed in pocket {pocket}: already held elsewhere")]
    DuplicateTool { tool: ToolNumber, pocket: PocketId },

    /// Motion layer did not acknowledge a step in time.
    #[error("step {step} not acknowledged within {limit_ms} ms")]
    StepTimeout { step: usize, limit_ms: u64 },

    /// Motion layer reported a failed step.
    #[error("step {step} failed: {reason}")]
    StepFailed { step: usize, reason: String },

    /// Motion layer refused a command.
    #[error("motion command rejected: {0}")]
    Motion(String),

    /// No recovery session is active.
    #[error("no active recovery session")]
    RecoveryInactive,

    /// A recovery session already exists.
    #[error("recovery session already in progress")]
    RecoveryInProgress,

    /// Recovery cannot complete yet.
    #[error("recovery incomplete: {0}")]
    RecoveryIncomplete(&'static str),
}

impl AtcError {
    /// Returns true if this error moves the changer to `Fault` when it
    /// occurs during an active cycle.
    #[inline]
    pub const fn escalates(&self) -> bool {
        matches!(
            self,
            Self::InterlockViolation(_)
                | Self::DuplicateTool { .. }
                | Self::StepTimeout { .. }
                | Self::StepFailed { .. }
                | Self::Motion(_)
        )
    }
}

/// Why the changer entered `Fault`. Carried by fault notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultReason {
    InterlockViolation,
    DuplicateTool,
    StepTimeout,
    StepFailed(String),
    MotionRejected(String),
    OperatorAbort,
    EncoderMismatch,
    /// Sensor sweep disagrees with the registry.
    Desynchronized,
    /// A cycle was in flight when the process stopped.
    AbandonedCycle,
    Other(String),
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InterlockViolation => f.write_str("InterlockViolation"),
            Self::DuplicateTool => f.write_str("DuplicateTool"),
            Self::StepTimeout => f.write_str("step timeout"),
            Self::StepFailed(reason) => write!(f, "step failed: {reason}"),
            Self::MotionRejected(reason) => write!(f, "motion rejected: {reason}"),
            Self::OperatorAbort => f.write_str("operator abort"),
            Self::EncoderMismatch => f.write_str("encoder mismatch"),
            Self::Desynchronized => f.write_str("desynchronized"),
            Self::AbandonedCycle => f.write_str("abandoned cycle"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

impl From<&AtcError> for FaultReason {
    fn from(err: &AtcError) -> Self {
        match err {
            AtcError::InterlockViolation(_) => Self::InterlockViolation,
            AtcError::DuplicateTool { .. } => Self::DuplicateTool,
            AtcError::StepTimeout { .. } => Self::StepTimeout,
            AtcError::StepFailed { reason, .. } => Self::StepFailed(reason.clone()),
            AtcError::Motion(reason) => Self::MotionRejected(reason.clone()),
            other => Self::Other(other.to_string()),
        }
    }
}
