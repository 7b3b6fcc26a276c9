//! Outbound notifications pushed to the display layer.

use serde::Serialize;

use super::error::FaultReason;
use super::safety::InterlockState;
use super::state::{AtcMode, PocketId, PocketState};

/// State-change notification emitted by the changer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AtcEvent {
    /// Top-level mode changed.
    Mode { mode: AtcMode },
    /// One pocket changed.
    Pocket { pocket: PocketId, state: PocketState },
    /// Interlock inputs changed.
    Interlocks(InterlockState),
    /// Tool-change cycle progress.
    Progress { description: String, percent: u8 },
    /// Changer entered `Fault`.
    Fault { reason: FaultReason },
    /// Free-form operator message (homing hints etc.).
    Message(String),
    /// Recovery session notification.
    Recovery(RecoveryEvent),
}

/// Notifications emitted while a recovery session is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RecoveryEvent {
    /// Session-level status line.
    Status(String),
    /// Progress within the current recovery action.
    Progress { step: String, percent: u8 },
}

impl AtcEvent {
    /// Shorthand for a progress notification.
    pub fn progress(description: impl Into<String>, percent: u8) -> Self {
        Self::Progress {
            description: description.into(),
            percent,
        }
    }

    /// Returns the progress percent if this is a cycle progress event.
    pub fn progress_percent(&self) -> Option<u8> {
        match self {
            Self::Progress { percent, .. } => Some(*percent),
            _ => None,
        }
    }
}
