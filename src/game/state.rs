//! Object Registry
//!
//! [`State`] is the authoritative set of live objects. Objects are stored
//! once, keyed by id; positional, tickable and physics views are secondary
//! indices over that store, maintained together on every insert and remove.
//! [`Registry`] puts a single reader/writer lock around it.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::game::object::{Entity, GameObject, ObjectId};

/// All live objects plus capability indices.
#[derive(Debug, Default)]
pub struct State {
    objects: BTreeMap<ObjectId, Box<dyn GameObject>>,
    concrete: BTreeSet<ObjectId>,
    entities: BTreeSet<ObjectId>,
    physics: BTreeSet<ObjectId>,
}

impl State {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object into every view it qualifies for.
    ///
    /// An existing object with the same id is replaced and returned; its
    /// index entries are rebuilt from the new object's capabilities.
    pub fn insert(&mut self, obj: Box<dyn GameObject>) -> Option<Box<dyn GameObject>> {
        let id = obj.id();
        let previous = self.remove(id);

        if obj.as_concrete().is_some() {
            self.concrete.insert(id);
        }
        if obj.as_entity().is_some() {
            self.entities.insert(id);
        }
        if obj.as_physics().is_some() {
            self.physics.insert(id);
        }
        self.objects.insert(id, obj);

        previous
    }

    /// Remove an object from every view.
    pub fn remove(&mut self, id: ObjectId) -> Option<Box<dyn GameObject>> {
        self.concrete.remove(&id);
        self.entities.remove(&id);
        self.physics.remove(&id);
        self.objects.remove(&id)
    }

    /// Look up an object.
    pub fn get(&self, id: ObjectId) -> Option<&(dyn GameObject + 'static)> {
        self.objects.get(&id).map(|o| &**o)
    }

    /// Look up an object mutably.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut (dyn GameObject + 'static)> {
        self.objects.get_mut(&id).map(|o| &mut **o)
    }

    /// Check membership.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All objects in id order.
    pub fn iter(&self) -> impl Iterator<Item = &(dyn GameObject + 'static)> {
        self.objects.values().map(|o| &**o)
    }

    /// All objects in id order, mutably.
    pub fn iter_mut(&mut self) -> IterMut<'_> {
        IterMut {
            inner: self.objects.values_mut(),
        }
    }

    /// Ids of positioned objects.
    pub fn concrete_ids(&self) -> &BTreeSet<ObjectId> {
        &self.concrete
    }

    /// Ids of tickable objects.
    pub fn entity_ids(&self) -> &BTreeSet<ObjectId> {
        &self.entities
    }

    /// Ids of physics-capable objects.
    pub fn physics_ids(&self) -> &BTreeSet<ObjectId> {
        &self.physics
    }

    /// Run the fixed step on every tickable object.
    pub fn tick_entities(&mut self, delta: f64) {
        for id in &self.entities {
            if let Some(entity) = self.objects.get_mut(id).and_then(|o| o.as_entity_mut()) {
                entity.on_tick(delta);
            }
        }
    }

    /// Run the presentation step on every tickable object.
    pub fn frame_entities(&self, delta: f64) {
        for entity in self.entities() {
            entity.on_frame(delta);
        }
    }

    /// Tickable objects in id order.
    pub fn entities(&self) -> impl Iterator<Item = &dyn Entity> {
        self.entities
            .iter()
            .filter_map(|id| self.objects.get(id).and_then(|o| o.as_entity()))
    }
}

/// Mutable iterator over registry objects.
pub struct IterMut<'a> {
    inner: btree_map::ValuesMut<'a, ObjectId, Box<dyn GameObject>>,
}

impl<'a> Iterator for IterMut<'a> {
    type Item = &'a mut (dyn GameObject + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|o| &mut **o)
    }
}

// =============================================================================
// REGISTRY LOCK
// =============================================================================

/// [`State`] behind one reader/writer lock.
///
/// Writers: fixed tick, effect application, membership changes, delta
/// encoding. Readers: presentation frames, lookups, snapshots. Guards are
/// never held across an await point or an outbound send.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<State>,
}

impl Registry {
    /// Wrap a state.
    pub fn new(state: State) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Shared access.
    pub fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access.
    pub fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{Direction, Point};
    use crate::game::concrete::Concrete;
    use crate::game::object::{Character, ConcreteObject, Object, ObjectType};
    use crate::game::player::Player;
    use proptest::prelude::*;

    fn make(kind: u8, id: ObjectId) -> Box<dyn GameObject> {
        match kind % 3 {
            0 => Box::new(Object::new(id)),
            1 => Box::new(Concrete::new(id, Point::ORIGIN)),
            _ => Box::new(Player::new(id, format!("user-{id}"), Point::ORIGIN, 10.0)),
        }
    }

    fn assert_views_consistent(state: &State) {
        for id in state.concrete_ids() {
            assert!(state.get(*id).is_some_and(|o| o.as_concrete().is_some()));
        }
        for id in state.entity_ids() {
            assert!(state.get(*id).is_some_and(|o| o.as_entity().is_some()));
        }
        for id in state.physics_ids() {
            assert!(state.get(*id).is_some_and(|o| o.as_physics().is_some()));
        }
        for obj in state.iter() {
            let id = obj.id();
            assert_eq!(state.concrete_ids().contains(&id), obj.as_concrete().is_some());
            assert_eq!(state.entity_ids().contains(&id), obj.as_entity().is_some());
            assert_eq!(state.physics_ids().contains(&id), obj.as_physics().is_some());
        }
    }

    #[test]
    fn test_insert_indexes_by_capability() {
        let mut state = State::new();
        state.insert(make(0, 1));
        state.insert(make(1, 2));
        state.insert(make(2, 3));

        assert_eq!(state.len(), 3);
        assert_eq!(state.concrete_ids().iter().copied().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(state.entity_ids().iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(state.physics_ids().iter().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_remove_drops_every_view() {
        let mut state = State::new();
        state.insert(make(2, 7));
        let removed = state.remove(7).unwrap();
        assert_eq!(removed.id(), 7);

        assert!(!state.contains(7));
        assert!(state.concrete_ids().is_empty());
        assert!(state.entity_ids().is_empty());
        assert!(state.physics_ids().is_empty());
        assert!(state.remove(7).is_none());
    }

    #[test]
    fn test_replace_reindexes() {
        let mut state = State::new();
        state.insert(make(2, 1));
        let old = state.insert(make(0, 1)).unwrap();
        assert_eq!(old.object_type(), ObjectType::Player);

        assert_eq!(state.len(), 1);
        assert!(state.entity_ids().is_empty());
        assert_views_consistent(&state);
    }

    #[test]
    fn test_tick_entities_moves_players() {
        let mut state = State::new();
        let mut p = Player::new(1, "a", Point::ORIGIN, 30.0);
        p.move_toward(Direction::Down);
        state.insert(Box::new(p));
        state.insert(make(1, 2));

        state.tick_entities(1.0);
        let pos = state.get(1).unwrap().as_concrete().unwrap().position();
        assert_eq!(pos, Point::new(0.0, 30.0));
        assert_eq!(state.entities().count(), 1);
    }

    #[test]
    fn test_registry_lock_roundtrip() {
        let registry = Registry::default();
        registry.write().insert(make(1, 4));
        assert!(registry.read().contains(4));
    }

    proptest! {
        #[test]
        fn prop_views_match_capabilities(ops in prop::collection::vec((any::<bool>(), 0u8..3, 0u32..16), 0..64)) {
            let mut state = State::new();
            for (add, kind, id) in ops {
                if add {
                    state.insert(make(kind, id));
                } else {
                    state.remove(id);
                }
                assert_views_consistent(&state);
            }
        }
    }
}
