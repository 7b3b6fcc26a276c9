//! Configuration structures for the tool changer.
//!
//! All config types use `serde::Deserialize` for TOML loading.
//! Numeric parameters have const `MIN`/`MAX` bounds in [`crate::consts`].
//! Optional fields use `#[serde(default)]`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::{
    HOME_POCKET_DEFAULT, MAX_CYCLE_STEPS, MAX_POCKETS, POCKETS_DEFAULT, ROTATION_STEP_MS_DEFAULT,
    ROTATION_STEP_MS_MAX, ROTATION_STEP_MS_MIN, STEP_TIMEOUT_MS_DEFAULT, STEP_TIMEOUT_MS_MAX,
    STEP_TIMEOUT_MS_MIN, WATCHDOG_POLL_MS_DEFAULT, WATCHDOG_POLL_MS_MAX, WATCHDOG_POLL_MS_MIN,
};

use super::state::PocketId;

/// Tool changer configuration.
///
/// Loaded once at startup. The pocket count is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangerConfig {
    /// Number of carousel pockets (default: 12).
    #[serde(default = "default_pockets")]
    pub pockets: u8,

    /// Rotation time bound per pocket travelled [ms] (default: 1000).
    #[serde(default = "default_rotation_step_ms")]
    pub rotation_step_ms: u64,

    /// Acknowledgement bound for every cycle step [ms] (default: 5000).
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Step-timeout watchdog poll interval [ms] (default: 50).
    #[serde(default = "default_watchdog_poll_ms")]
    pub watchdog_poll_ms: u64,

    /// Pocket aligned with the spindle after homing (default: 1).
    #[serde(default = "default_home_pocket")]
    pub home_pocket: PocketId,

    /// Ordered cycle steps (default: unload, rotate, load).
    #[serde(default = "default_steps")]
    pub steps: Vec<CycleStepConfig>,
}

fn default_pockets() -> u8 {
    POCKETS_DEFAULT
}
fn default_rotation_step_ms() -> u64 {
    ROTATION_STEP_MS_DEFAULT
}
fn default_step_timeout_ms() -> u64 {
    STEP_TIMEOUT_MS_DEFAULT
}
fn default_watchdog_poll_ms() -> u64 {
    WATCHDOG_POLL_MS_DEFAULT
}
fn default_home_pocket() -> PocketId {
    HOME_POCKET_DEFAULT
}
fn default_steps() -> Vec<CycleStepConfig> {
    vec![
        CycleStepConfig::new(StepKind::Unload, "Unloading spindle tool"),
        CycleStepConfig::new(StepKind::Rotate, "Rotating to pocket {pocket}"),
        CycleStepConfig::new(StepKind::Load, "Loading tool at pocket {pocket}"),
    ]
}

impl Default for ChangerConfig {
    fn default() -> Self {
        Self {
            pockets: POCKETS_DEFAULT,
            rotation_step_ms: ROTATION_STEP_MS_DEFAULT,
            step_timeout_ms: STEP_TIMEOUT_MS_DEFAULT,
            watchdog_poll_ms: WATCHDOG_POLL_MS_DEFAULT,
            home_pocket: HOME_POCKET_DEFAULT,
            steps: default_steps(),
        }
    }
}

impl ChangerConfig {
    /// Default configuration with a different pocket count.
    pub fn with_pockets(pockets: u8) -> Self {
        Self {
            pockets,
            ..Self::default()
        }
    }

    /// Rotation time bound per pocket travelled.
    #[inline]
    pub const fn rotation_step(&self) -> Duration {
        Duration::from_millis(self.rotation_step_ms)
    }

    /// Acknowledgement bound for a cycle step.
    #[inline]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Watchdog poll interval.
    #[inline]
    pub const fn watchdog_poll(&self) -> Duration {
        Duration::from_millis(self.watchdog_poll_ms)
    }

    /// Validate parameter bounds and the step sequence.
    pub fn validate(&self) -> Result<(), String> {
        if self.pockets == 0 || self.pockets as usize > MAX_POCKETS {
            return Err(format!(
                "pockets {} out of range [1, {}]",
                self.pockets, MAX_POCKETS
            ));
        }
        check_range(
            "rotation_step_ms",
            self.rotation_step_ms,
            ROTATION_STEP_MS_MIN,
            ROTATION_STEP_MS_MAX,
        )?;
        check_range(
            "step_timeout_ms",
            self.step_timeout_ms,
            STEP_TIMEOUT_MS_MIN,
            STEP_TIMEOUT_MS_MAX,
        )?;
        check_range(
            "watchdog_poll_ms",
            self.watchdog_poll_ms,
            WATCHDOG_POLL_MS_MIN,
            WATCHDOG_POLL_MS_MAX,
        )?;
        if self.home_pocket == 0 || self.home_pocket > self.pockets {
            return Err(format!(
                "home_pocket {} out of range [1, {}]",
                self.home_pocket, self.pockets
            ));
        }
        self.validate_steps()
    }

    fn validate_steps(&self) -> Result<(), String> {
        if self.steps.is_empty() || self.steps.len() > MAX_CYCLE_STEPS {
            return Err(format!(
                "step count {} out of range [1, {}]",
                self.steps.len(),
                MAX_CYCLE_STEPS
            ));
        }
        if let Some(step) = self.steps.iter().find(|s| s.label.trim().is_empty()) {
            return Err(format!("{:?} step has an empty label", step.kind));
        }

        // Unload, rotate and load must each appear exactly once, in order.
        let motion: Vec<StepKind> = self
            .steps
            .iter()
            .map(|s| s.kind)
            .filter(|k| *k != StepKind::Auxiliary)
            .collect();
        if motion != [StepKind::Unload, StepKind::Rotate, StepKind::Load] {
            return Err(format!(
                "steps must contain unload, rotate, load exactly once in that order (got {motion:?})"
            ));
        }
        Ok(())
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), String> {
    if value < min || value > max {
        return Err(format!("{name} {value} out of range [{min}, {max}]"));
    }
    Ok(())
}

/// One configured cycle step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStepConfig {
    pub kind: StepKind,
    /// Display label; `{pocket}` is replaced with the target pocket.
    pub label: String,
}

impl CycleStepConfig {
    pub fn new(kind: StepKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }

    /// Label with the target pocket substituted.
    pub fn describe(&self, target: PocketId) -> String {
        self.label.replace("{pocket}", &target.to_string())
    }
}

/// What a cycle step physically does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Release the spindle tool into the changer.
    Unload,
    /// Rotate the carousel to the target pocket.
    Rotate,
    /// Exchange at the target pocket and clamp the new tool.
    Load,
    /// No motion command (drawbar, air blast, orientation confirm).
    Auxiliary,
}
