//! Effects and Events
//!
//! Inbound commands become [`Effect`]s keyed by target object id and wrapped
//! in an [`Event`]. The engine queues events and applies each effect exactly
//! once, in order, under the registry's exclusive lock.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;

use crate::core::geometry::Direction;
use crate::game::object::{GameObject, ObjectId};

/// A mutation to apply to one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Steer a character in a direction at its base speed.
    Movement(Direction),
}

impl Effect {
    /// Apply to a target.
    ///
    /// Returns false when the target lacks the capability the effect needs;
    /// that is a no-op, not an error.
    pub fn apply(&self, target: &mut dyn GameObject) -> bool {
        match *self {
            Effect::Movement(direction) => {
                let id = target.id();
                match target.as_character_mut() {
                    Some(character) => {
                        character.move_toward(direction);
                        true
                    }
                    None => {
                        debug!(target = id, %direction, "movement ignored: not a character");
                        false
                    }
                }
            }
        }
    }
}

/// A batch of effects produced by one command.
#[derive(Clone, Debug)]
pub struct Event {
    /// Creation time (Unix nanoseconds)
    pub timestamp: i64,
    /// Object that caused the event
    pub source_id: ObjectId,
    /// Effects per target, applied in list order
    pub effects: BTreeMap<ObjectId, Vec<Effect>>,
}

impl Event {
    /// Create an empty event stamped with the current time.
    pub fn new(source_id: ObjectId) -> Self {
        Self {
            timestamp: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            source_id,
            effects: BTreeMap::new(),
        }
    }

    /// Create an event with one effect on one target.
    pub fn single(source_id: ObjectId, target: ObjectId, effect: Effect) -> Self {
        Self::new(source_id).with_effect(target, effect)
    }

    /// Append an effect for a target.
    pub fn with_effect(mut self, target: ObjectId, effect: Effect) -> Self {
        self.push(target, effect);
        self
    }

    /// Append an effect for a target.
    pub fn push(&mut self, target: ObjectId, effect: Effect) {
        self.effects.entry(target).or_default().push(effect);
    }

    /// Total number of effects.
    pub fn effect_count(&self) -> usize {
        self.effects.values().map(Vec::len).sum()
    }

    /// Check if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.effects.values().all(Vec::is_empty)
    }
}
