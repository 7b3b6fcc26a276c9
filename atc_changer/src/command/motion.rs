//! Motion command contract.
//!
//! The changer never moves hardware itself. It hands discrete commands to a
//! [`MotionLayer`] implementation (macro runner, HAL bridge, simulator) and
//! waits for the completion events that layer reports back.

use std::fmt;

use atc_common::changer::state::{Direction, PocketId};
use thiserror::Error;

/// Discrete command issued to the motion layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    /// Release the spindle tool for storage in `pocket`.
    Unload { pocket: PocketId },
    /// Rotate the carousel by `steps` pockets.
    Rotate { steps: u32, direction: Direction },
    /// Store the released tool in `pocket`, clamp that pocket's tool.
    Load { pocket: PocketId },
    /// Run the carousel homing sequence.
    Home,
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unload { pocket } => write!(f, "unload @{pocket}"),
            Self::Rotate { steps, direction } => write!(f, "rotate {steps} {direction}"),
            Self::Load { pocket } => write!(f, "load @{pocket}"),
            Self::Home => f.write_str("home"),
        }
    }
}

/// Motion layer refusal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotionError {
    /// Command refused by the motion layer.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Motion layer not connected.
    #[error("motion layer offline")]
    Offline,
}

/// Outbound port toward the external motion layer.
///
/// `issue` must not block on the physical move; completion is reported
/// later through the changer's `advance_step` entry point.
pub trait MotionLayer: Send {
    fn issue(&mut self, command: MotionCommand) -> Result<(), MotionError>;
}

impl<M: MotionLayer + ?Sized> MotionLayer for Box<M> {
    fn issue(&mut self, command: MotionCommand) -> Result<(), MotionError> {
        (**self).issue(command)
    }
}

/// Shortest rotation from `from` to `to` on a carousel of `pockets`.
///
/// Clockwise increases the pocket number. Ties go clockwise.
pub fn plan_rotation(from: PocketId, to: PocketId, pockets: u8) -> (u32, Direction) {
    let n = u32::from(pockets.max(1));
    let from = u32::from(from.max(1)) - 1;
    let to = u32::from(to.max(1)) - 1;
    let cw = (to + n - from % n) % n;
    let ccw = (n - cw) % n;
    if cw <= ccw {
        (cw, Direction::Cw)
    } else {
        (ccw, Direction::Ccw)
    }
}
