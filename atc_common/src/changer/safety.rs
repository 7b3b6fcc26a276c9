//! Interlock types for the tool changer.
//!
//! Three boolean conditions gate every motion command. Motion is permitted
//! only when ALL of them are `true`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Interlock inputs (last-write-wins per field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterlockState {
    /// Enclosure door closed.
    pub door_closed: bool,
    /// Air pressure present.
    pub air_pressure_ok: bool,
    /// Position encoder ready.
    pub encoder_ready: bool,
}

impl Default for InterlockState {
    fn default() -> Self {
        Self {
            door_closed: true,
            air_pressure_ok: true,
            encoder_ready: true,
        }
    }
}

impl InterlockState {
    /// All interlocks open.
    pub const BLOCKED: Self = Self {
        door_closed: false,
        air_pressure_ok: false,
        encoder_ready: false,
    };

    /// Returns true if ALL interlocks are satisfied.
    #[inline]
    pub const fn motion_permitted(&self) -> bool {
        self.door_closed && self.air_pressure_ok && self.encoder_ready
    }

    /// Flags for every unsatisfied interlock.
    pub fn violations(&self) -> InterlockFault {
        let mut faults = InterlockFault::empty();
        if !self.door_closed {
            faults |= InterlockFault::DOOR_OPEN;
        }
        if !self.air_pressure_ok {
            faults |= InterlockFault::AIR_PRESSURE_LOW;
        }
        if !self.encoder_ready {
            faults |= InterlockFault::ENCODER_NOT_READY;
        }
        faults
    }

    /// Read one field.
    #[inline]
    pub const fn get(&self, field: InterlockField) -> bool {
        match field {
            InterlockField::DoorClosed => self.door_closed,
            InterlockField::AirPressure => self.air_pressure_ok,
            InterlockField::EncoderReady => self.encoder_ready,
        }
    }

    /// Write one field.
    #[inline]
    pub fn set(&mut self, field: InterlockField, value: bool) {
        match field {
            InterlockField::DoorClosed => self.door_closed = value,
            InterlockField::AirPressure => self.air_pressure_ok = value,
            InterlockField::EncoderReady => self.encoder_ready = value,
        }
    }
}

/// Identifies one interlock input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterlockField {
    DoorClosed,
    AirPressure,
    EncoderReady,
}

bitflags! {
    /// Unsatisfied interlocks at the moment a gate check failed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterlockFault: u8 {
        /// Enclosure door open.
        const DOOR_OPEN         = 0x01;
        /// Air pressure missing.
        const AIR_PRESSURE_LOW  = 0x02;
        /// Encoder not ready.
        const ENCODER_NOT_READY = 0x04;
    }
}

impl Default for InterlockFault {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_permits_motion() {
        assert!(InterlockState::default().motion_permitted());
        assert!(InterlockState::default().violations().is_empty());
    }

    #[test]
    fn any_false_field_blocks_motion() {
        for field in [
            InterlockField::DoorClosed,
            InterlockField::AirPressure,
            InterlockField::EncoderReady,
        ] {
            let mut state = InterlockState::default();
            state.set(field, false);
            assert!(!state.motion_permitted(), "{field:?}");
            assert!(!state.get(field));
        }
    }

    #[test]
    fn violations_name_each_open_interlock() {
        let state = InterlockState {
            door_closed: false,
            air_pressure_ok: true,
            encoder_ready: false,
        };
        let v = state.violations();
        assert!(v.contains(InterlockFault::DOOR_OPEN));
        assert!(v.contains(InterlockFault::ENCODER_NOT_READY));
        assert!(!v.contains(InterlockFault::AIR_PRESSURE_LOW));
        assert_eq!(InterlockState::BLOCKED.violations(), InterlockFault::all());
    }
}
