//! Collectible bookkeeping for one level: which souls are still out there, how much the player
//! has scored, and whether the exit gate has opened.

use std::collections::BTreeMap;

use bevy::prelude::*;

/// Points awarded for every collectible picked up.
pub const POINTS_PER_COLLECTIBLE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectibleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectibleEntry {
    pub position: Vec2,
    pub active: bool,
}

/// Every collectible of a level keyed by identity. Entries only ever go from active to inactive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectibleSet {
    entries: BTreeMap<CollectibleId, CollectibleEntry>,
}

impl CollectibleSet {
    pub fn new(positions: impl IntoIterator<Item = (CollectibleId, Vec2)>) -> Self {
        Self {
            entries: positions
                .into_iter()
                .map(|(id, position)| {
                    (
                        id,
                        CollectibleEntry {
                            position,
                            active: true,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn count_active(&self) -> usize {
        self.entries.values().filter(|entry| entry.active).count()
    }

    pub fn get(&self, id: CollectibleId) -> Option<&CollectibleEntry> {
        self.entries.get(&id)
    }

    /// Deactivates `id`. Returns `false` when it was unknown or already inactive.
    fn deactivate(&mut self, id: CollectibleId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.active => {
                entry.active = false;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitGate {
    pub position: Vec2,
    pub unlocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    /// Unknown or already collected. Nothing changed.
    Ignored,
    Collected { remaining: usize },
    /// The last collectible was taken and the gate just opened.
    Unlocked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState {
    collectibles: CollectibleSet,
    exit: Option<ExitGate>,
    gate: GateState,
    score: u32,
}

impl CollectionState {
    /// A level with nothing to collect starts unlocked.
    pub fn new(collectibles: CollectibleSet, exit_position: Option<Vec2>, starting_score: u32) -> Self {
        let mut state = Self {
            collectibles,
            exit: exit_position.map(|position| ExitGate {
                position,
                unlocked: false,
            }),
            gate: GateState::Locked,
            score: starting_score,
        };
        state.evaluate_gate();
        state
    }

    pub fn collect(&mut self, id: CollectibleId) -> CollectOutcome {
        if !self.collectibles.deactivate(id) {
            return CollectOutcome::Ignored;
        }

        self.score += POINTS_PER_COLLECTIBLE;

        if self.evaluate_gate() {
            CollectOutcome::Unlocked
        } else {
            CollectOutcome::Collected {
                remaining: self.remaining(),
            }
        }
    }

    /// Opens the gate once nothing is left. Returns `true` only on the transition itself.
    fn evaluate_gate(&mut self) -> bool {
        if self.gate == GateState::Unlocked || self.collectibles.count_active() > 0 {
            return false;
        }

        self.gate = GateState::Unlocked;
        if let Some(exit) = self.exit.as_mut() {
            exit.unlocked = true;
        }
        true
    }

    pub fn remaining(&self) -> usize {
        self.collectibles.count_active()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_unlocked(&self) -> bool {
        self.gate == GateState::Unlocked
    }

    pub fn is_active(&self, id: CollectibleId) -> bool {
        self.collectibles.get(id).is_some_and(|entry| entry.active)
    }

    pub fn collectibles(&self) -> &CollectibleSet {
        &self.collectibles
    }

    pub fn exit(&self) -> Option<&ExitGate> {
        self.exit.as_ref()
    }
}
