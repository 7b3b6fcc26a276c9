//! Pocket registry.
//!
//! Authoritative pocket → occupant mapping. A tool number is held by at
//! most one pocket at any time. Occupancy changes only through
//! [`PocketRegistry::set_occupant`], which the state machine calls for
//! confirmed load/unload events.

use atc_common::changer::error::AtcError;
use atc_common::changer::state::{PocketHealth, PocketId, PocketState, ToolNumber};
use atc_common::consts::MAX_POCKETS;

/// One carousel pocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pocket {
    pub id: PocketId,
    pub occupant: Option<ToolNumber>,
    pub health: PocketHealth,
}

impl Pocket {
    const fn empty(id: PocketId) -> Self {
        Self {
            id,
            occupant: None,
            health: PocketHealth::Empty,
        }
    }

    /// State as published to the display layer.
    pub const fn state(&self) -> PocketState {
        match (self.health, self.occupant) {
            (PocketHealth::Faulted, _) => PocketState::Faulted,
            (_, Some(tool)) => PocketState::Occupied(tool),
            (_, None) => PocketState::Empty,
        }
    }
}

/// Fixed-size pocket table, created at startup with every pocket empty.
#[derive(Debug, Clone)]
pub struct PocketRegistry {
    pockets: Vec<Pocket>,
}

impl PocketRegistry {
    /// Create `count` empty pockets numbered `1..=count`.
    ///
    /// `count` is clamped to [`MAX_POCKETS`]; config validation rejects
    /// larger values before this point.
    pub fn new(count: u8) -> Self {
        let count = (count as usize).min(MAX_POCKETS) as u8;
        Self {
            pockets: (1..=count).map(Pocket::empty).collect(),
        }
    }

    /// Number of pockets.
    #[inline]
    pub fn len(&self) -> usize {
        self.pockets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pockets.is_empty()
    }

    /// Whether `pocket` is a valid id.
    #[inline]
    pub fn contains(&self, pocket: PocketId) -> bool {
        pocket >= 1 && (pocket as usize) <= self.pockets.len()
    }

    /// Read one pocket.
    pub fn get(&self, pocket: PocketId) -> Option<&Pocket> {
        if !self.contains(pocket) {
            return None;
        }
        self.pockets.get(pocket as usize - 1)
    }

    /// Lazy, restartable iteration over all pockets in id order.
    pub fn all(&self) -> impl Iterator<Item = &Pocket> + Clone + '_ {
        self.pockets.iter()
    }

    /// Pocket currently holding `tool`, if any.
    pub fn find_tool(&self, tool: ToolNumber) -> Option<PocketId> {
        self.pockets
            .iter()
            .find(|p| p.occupant == Some(tool))
            .map(|p| p.id)
    }

    /// Set or clear a pocket's occupant.
    ///
    /// Fails with `DuplicateTool` if another pocket already holds the tool,
    /// leaving the registry unchanged. On success the pocket's health is
    /// `Occupied` or `Empty`, clearing any `Faulted` mark.
    pub fn set_occupant(
        &mut self,
        pocket: PocketId,
        occupant: Option<ToolNumber>,
    ) -> Result<(), AtcError> {
        let index = self.index(pocket)?;
        if let Some(tool) = occupant {
            if self.find_tool(tool).is_some_and(|held| held != pocket) {
                return Err(AtcError::DuplicateTool { tool, pocket });
            }
        }
        let slot = &mut self.pockets[index];
        slot.occupant = occupant;
        slot.health = if occupant.is_some() {
            PocketHealth::Occupied
        } else {
            PocketHealth::Empty
        };
        Ok(())
    }

    /// Mark a pocket's occupancy as unverified. Occupant is untouched.
    pub fn mark_faulted(&mut self, pocket: PocketId) -> Result<(), AtcError> {
        let index = self.index(pocket)?;
        self.pockets[index].health = PocketHealth::Faulted;
        Ok(())
    }

    /// Restore health from occupancy on every faulted pocket.
    ///
    /// Returns the ids that were cleared.
    pub fn clear_faults(&mut self) -> Vec<PocketId> {
        let mut cleared = Vec::new();
        for pocket in self
            .pockets
            .iter_mut()
            .filter(|p| p.health == PocketHealth::Faulted)
        {
            pocket.health = if pocket.occupant.is_some() {
                PocketHealth::Occupied
            } else {
                PocketHealth::Empty
            };
            cleared.push(pocket.id);
        }
        cleared
    }

    /// Whether any pocket is marked faulted.
    pub fn has_faults(&self) -> bool {
        self.pockets.iter().any(|p| p.health == PocketHealth::Faulted)
    }

    /// Empty every pocket (re-initialization only).
    pub fn reset(&mut self) {
        for pocket in &mut self.pockets {
            *pocket = Pocket::empty(pocket.id);
        }
    }

    /// Occupants in id order.
    pub fn occupancy(&self) -> Vec<Option<ToolNumber>> {
        self.pockets.iter().map(|p| p.occupant).collect()
    }

    fn index(&self, pocket: PocketId) -> Result<usize, AtcError> {
        if self.contains(pocket) {
            Ok(pocket as usize - 1)
        } else {
            Err(AtcError::InvalidTarget {
                pocket,
                reason: "pocket out of range",
            })
        }
    }
}
