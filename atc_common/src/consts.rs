//! System-wide constants for the ATC workspace.
//!
//! Single source of truth for all numeric limits and default values.
//! Imported by all crates.

use static_assertions::const_assert;

/// Maximum number of carousel pockets.
pub const MAX_POCKETS: usize = 64;

/// Maximum number of steps in one tool-change cycle.
pub const MAX_CYCLE_STEPS: usize = 8;

/// Default pocket count.
pub const POCKETS_DEFAULT: u8 = 12;

/// Default per-pocket rotation time [ms].
pub const ROTATION_STEP_MS_DEFAULT: u64 = 1000;
pub const ROTATION_STEP_MS_MIN: u64 = 1;
pub const ROTATION_STEP_MS_MAX: u64 = 60_000;

/// Default bound for a single cycle step acknowledgement [ms].
pub const STEP_TIMEOUT_MS_DEFAULT: u64 = 5000;
pub const STEP_TIMEOUT_MS_MIN: u64 = 1;
pub const STEP_TIMEOUT_MS_MAX: u64 = 600_000;

/// Default step-timeout watchdog poll interval [ms].
pub const WATCHDOG_POLL_MS_DEFAULT: u64 = 50;
pub const WATCHDOG_POLL_MS_MIN: u64 = 1;
pub const WATCHDOG_POLL_MS_MAX: u64 = 10_000;

/// Pocket the carousel occupies after homing.
pub const HOME_POCKET_DEFAULT: u8 = 1;

// Pocket ids are carried as u8.
const_assert!(MAX_POCKETS <= u8::MAX as usize);
// Per-step progress must stay strictly increasing in whole percent.
const_assert!(MAX_CYCLE_STEPS <= 100);
// Default sequence is unload / rotate / load.
const_assert!(MAX_CYCLE_STEPS >= 3);
