//! Tool changer state types.
//!
//! Top-level mode, pocket occupancy, carousel direction and the records
//! exchanged with the external tool-table and sensor layers at startup.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Carousel pocket index (1-based, 1..=pocket count).
pub type PocketId = u8;

/// Tool number as carried by the tool table.
pub type ToolNumber = u32;

// ─── Mode ───────────────────────────────────────────────────────────

/// Top-level changer mode.
///
/// `Ready` is the only mode from which a tool-change cycle may start.
/// `Fault` exits only through a completed recovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum AtcMode {
    /// Idle, no active cycle.
    #[default]
    Ready = 0,
    /// Exactly one tool-change cycle in flight.
    Busy = 1,
    /// Desynchronized or interrupted, recovery required.
    Fault = 2,
}

impl AtcMode {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ready),
            1 => Some(Self::Busy),
            2 => Some(Self::Fault),
            _ => None,
        }
    }
}

impl fmt::Display for AtcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "Ready",
            Self::Busy => "Busy",
            Self::Fault => "Fault",
        };
        f.write_str(s)
    }
}

// ─── Pockets ────────────────────────────────────────────────────────

/// Health of a single pocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum PocketHealth {
    #[default]
    Empty = 0,
    Occupied = 1,
    /// Occupancy unverified after an interrupted cycle or sweep mismatch.
    Faulted = 2,
}

/// Pocket state as published to the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PocketState {
    Empty,
    Occupied(ToolNumber),
    Faulted,
}

impl fmt::Display for PocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Occupied(tool) => write!(f, "tool{tool}"),
            Self::Faulted => f.write_str("fault"),
        }
    }
}

// ─── Rotation ───────────────────────────────────────────────────────

/// Carousel rotation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Clockwise: increasing pocket numbers.
    Cw,
    /// Counter-clockwise: decreasing pocket numbers.
    Ccw,
}

impl Direction {
    /// Signed unit used by the motion layer (`cw` = +1, `ccw` = -1).
    #[inline]
    pub const fn sign(self) -> i8 {
        match self {
            Self::Cw => 1,
            Self::Ccw => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cw => "cw",
            Self::Ccw => "ccw",
        })
    }
}

// ─── Startup Records ────────────────────────────────────────────────

/// Last known changer state, persisted by the external tool-table layer.
///
/// `occupancy[i]` is the occupant of pocket `i + 1`. A `cycle_target`
/// means the process stopped while a cycle toward that pocket was in
/// flight.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BootRecord {
    pub occupancy: Vec<Option<ToolNumber>>,
    #[serde(default)]
    pub spindle_tool: Option<ToolNumber>,
    pub carousel_pocket: PocketId,
    #[serde(default)]
    pub cycle_target: Option<PocketId>,
}

/// Fresh presence-sensor sweep taken at activation.
///
/// `occupied[i]` reports whether a tool is sensed in pocket `i + 1`.
/// `carousel_pocket` is the encoder reading, if the encoder is referenced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorSweep {
    pub occupied: Vec<bool>,
    #[serde(default)]
    pub carousel_pocket: Option<PocketId>,
}
