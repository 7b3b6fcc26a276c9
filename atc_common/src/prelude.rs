//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use atc_common::prelude::*;` and get
//! the most important types without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::changer::config::{ChangerConfig, CycleStepConfig, StepKind};
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Changer Types ──────────────────────────────────────────────────
pub use crate::changer::error::{AtcError, FaultReason};
pub use crate::changer::event::{AtcEvent, RecoveryEvent};
pub use crate::changer::safety::{InterlockFault, InterlockField, InterlockState};
pub use crate::changer::state::{
    AtcMode, BootRecord, Direction, PocketHealth, PocketId, PocketState, SensorSweep, ToolNumber,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_CYCLE_STEPS, MAX_POCKETS};
