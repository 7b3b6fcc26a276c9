//! Interlock monitor.
//!
//! Aggregates door, air pressure and encoder readiness into one gate.
//! Every caller about to issue a rotation or load/unload command must call
//! [`InterlockMonitor::require`] immediately before issuing it.

use atc_common::changer::error::AtcError;
use atc_common::changer::safety::{InterlockField, InterlockState};
use tracing::debug;

/// Current interlock inputs and the derived motion gate.
#[derive(Debug, Clone, Default)]
pub struct InterlockMonitor {
    state: InterlockState,
}

impl InterlockMonitor {
    /// Create a monitor seeded with the given inputs.
    pub const fn new(state: InterlockState) -> Self {
        Self { state }
    }

    /// Current inputs.
    #[inline]
    pub const fn state(&self) -> InterlockState {
        self.state
    }

    /// Set one input. Returns true if the value changed.
    pub fn update(&mut self, field: InterlockField, value: bool) -> bool {
        if self.state.get(field) == value {
            return false;
        }
        self.state.set(field, value);
        debug!(
            ?field,
            value,
            permitted = self.state.motion_permitted(),
            "interlock updated"
        );
        true
    }

    /// Replace all inputs. Returns true if anything changed.
    pub fn replace(&mut self, state: InterlockState) -> bool {
        let changed = self.state != state;
        self.state = state;
        changed
    }

    /// Whether motion is currently permitted.
    #[inline]
    pub const fn check(&self) -> bool {
        self.state.motion_permitted()
    }

    /// Gate check: `Err(InterlockViolation)` naming every open interlock.
    pub fn require(&self) -> Result<(), AtcError> {
        if self.check() {
            Ok(())
        } else {
            Err(AtcError::InterlockViolation(self.state.violations()))
        }
    }
}
