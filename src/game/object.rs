//! Game Object Model
//!
//! Every simulated thing is a [`GameObject`]: it has a stable integer id, may
//! own child objects, carries a dirty flag and knows how to write itself to
//! the wire. Richer behaviour is exposed through independent capability
//! traits ([`ConcreteObject`], [`Entity`], [`PhysicsObject`], [`Character`],
//! [`NetworkObject`]) which an object advertises through the `as_*` queries.
//! The registry indexes objects by the capabilities they report.
//!
//! Concrete records compose rather than inherit: a [`Concrete`] embeds an
//! [`Object`], a [`Player`] embeds a [`Concrete`].
//!
//! [`Concrete`]: crate::game::concrete::Concrete
//! [`Player`]: crate::game::player::Player

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::geometry::{Direction, Point, Vector};

/// Object identifier. Assigned by the creator, never reassigned.
pub type ObjectId = u32;

/// Ordered child objects keyed by id.
pub type Children = BTreeMap<ObjectId, Box<dyn GameObject>>;

/// Bytes taken by the id and type tag that prefix every encoding.
pub const OBJECT_HEADER_SIZE: usize = 5;

/// Bytes taken by an encoded position (two `f32`).
pub const POSITION_SIZE: usize = 8;

// =============================================================================
// OBJECT TYPE
// =============================================================================

/// Kind of object, written as a single byte after the id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectType {
    /// Bare object without position
    #[default]
    Object = 0,
    /// Positioned object
    ConcreteObject = 1,
    /// Moving, player-controlled object
    Player = 2,
}

impl ObjectType {
    /// Get type from its wire tag.
    pub fn from_u8(tag: u8) -> Option<ObjectType> {
        match tag {
            0 => Some(ObjectType::Object),
            1 => Some(ObjectType::ConcreteObject),
            2 => Some(ObjectType::Player),
            _ => None,
        }
    }

    /// Wire tag.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Whether encodings of this kind carry a position.
    pub fn has_position(self) -> bool {
        matches!(self, ObjectType::ConcreteObject | ObjectType::Player)
    }

    /// Length of one encoded record of this kind.
    pub fn record_size(self) -> usize {
        if self.has_position() {
            OBJECT_HEADER_SIZE + POSITION_SIZE
        } else {
            OBJECT_HEADER_SIZE
        }
    }
}

// =============================================================================
// CAPABILITY TRAITS
// =============================================================================

/// Binary encoding into caller-owned buffers.
///
/// `to_bytes` and `to_delta_bytes` write at `start` and return the number of
/// bytes written, so many objects can be packed into one frame.
///
/// # Panics
///
/// Writing panics if `buf[start..]` is shorter than the reported size.
/// Sizing the buffer is the caller's contract.
pub trait Serializable {
    /// Length of the full encoding.
    fn size(&self) -> usize;

    /// Length of the next delta encoding.
    ///
    /// May update the dirty flag and reset internal baselines, so call it
    /// once per tick, right before serializing.
    fn delta_size(&mut self) -> usize;

    /// Write the full encoding, ignoring dirtiness.
    fn to_bytes(&self, buf: &mut [u8], start: usize) -> usize;

    /// Write the delta encoding.
    fn to_delta_bytes(&self, buf: &mut [u8], start: usize) -> usize;
}

/// Something with a position in the world.
pub trait ConcreteObject {
    /// Live position.
    fn position(&self) -> Point;

    /// Position as of the last serialization pass.
    fn prev_position(&self) -> Point;

    /// Teleport.
    fn set_position(&mut self, position: Point);
}

/// Something that takes part in the update loops.
pub trait Entity {
    /// Fixed-rate simulation step.
    fn on_tick(&mut self, delta: f64);

    /// Variable-rate presentation step. Runs under a shared lock.
    fn on_frame(&self, delta: f64);
}

/// Something that moves under velocity.
pub trait PhysicsObject {
    /// Current velocity.
    fn velocity(&self) -> Vector;

    /// Replace the velocity.
    fn set_velocity(&mut self, velocity: Vector);

    /// Apply a force (unit mass).
    fn apply_force(&mut self, force: Vector);

    /// Apply an instantaneous acceleration.
    fn apply_acceleration(&mut self, acceleration: Vector);
}

/// Something that moves on command.
pub trait Character {
    /// Base speed in units per second.
    fn speed(&self) -> f32;

    /// Head in a direction at base speed.
    fn move_toward(&mut self, direction: Direction);
}

/// Something with an outbound connection to a remote peer.
pub trait NetworkObject {
    /// Queue bytes for the peer. Returns false if nothing was sent.
    fn notify(&self, bytes: &[u8]) -> bool;

    /// Whether a live connection is attached.
    fn is_connected(&self) -> bool;
}

// =============================================================================
// GAME OBJECT
// =============================================================================

/// Common contract for everything in the registry.
///
/// Implementors provide access to their embedded [`Object`]; identity,
/// children and the dirty flag are served from there. Capability queries
/// default to "not supported".
pub trait GameObject: Serializable + Send + Sync + fmt::Debug {
    /// Embedded base object.
    fn base(&self) -> &Object;

    /// Embedded base object, mutably.
    fn base_mut(&mut self) -> &mut Object;

    /// Stable identifier.
    fn id(&self) -> ObjectId {
        self.base().id
    }

    /// Kind tag.
    fn object_type(&self) -> ObjectType {
        self.base().object_type
    }

    /// Owned children, if any were ever added.
    fn children(&self) -> Option<&Children> {
        self.base().children.as_ref()
    }

    /// Take ownership of a child, keyed by its own id.
    fn add_child(&mut self, child: Box<dyn GameObject>) {
        let id = child.id();
        self.set_child(id, child);
    }

    /// Detach and return a child.
    fn remove_child(&mut self, id: ObjectId) -> Option<Box<dyn GameObject>> {
        self.base_mut().children.as_mut()?.remove(&id)
    }

    /// Insert a child under an explicit key.
    fn set_child(&mut self, id: ObjectId, child: Box<dyn GameObject>) {
        self.base_mut()
            .children
            .get_or_insert_with(BTreeMap::new)
            .insert(id, child);
    }

    /// Exclude from the next delta frame.
    fn mark_clean(&mut self) {
        self.base_mut().dirty = false;
    }

    /// Include in the next delta frame.
    fn mark_dirty(&mut self) {
        self.base_mut().dirty = true;
    }

    /// Check the dirty flag.
    fn is_dirty(&self) -> bool {
        self.base().dirty
    }

    /// Positional view.
    fn as_concrete(&self) -> Option<&dyn ConcreteObject> {
        None
    }

    /// Positional view, mutably.
    fn as_concrete_mut(&mut self) -> Option<&mut dyn ConcreteObject> {
        None
    }

    /// Tick/frame view.
    fn as_entity(&self) -> Option<&dyn Entity> {
        None
    }

    /// Tick/frame view, mutably.
    fn as_entity_mut(&mut self) -> Option<&mut dyn Entity> {
        None
    }

    /// Physics view.
    fn as_physics(&self) -> Option<&dyn PhysicsObject> {
        None
    }

    /// Physics view, mutably.
    fn as_physics_mut(&mut self) -> Option<&mut dyn PhysicsObject> {
        None
    }

    /// Character view, mutably.
    fn as_character_mut(&mut self) -> Option<&mut dyn Character> {
        None
    }

    /// Connection view.
    fn as_network(&self) -> Option<&dyn NetworkObject> {
        None
    }
}

// =============================================================================
// BASE OBJECT
// =============================================================================

/// The plain object every other kind embeds.
#[derive(Debug)]
pub struct Object {
    id: ObjectId,
    object_type: ObjectType,
    children: Option<Children>,
    dirty: bool,
}

impl Object {
    /// Create a bare object.
    pub fn new(id: ObjectId) -> Self {
        Self::with_type(id, ObjectType::Object)
    }

    /// Create an object tagged as some other kind (used by embedding records).
    pub fn with_type(id: ObjectId, object_type: ObjectType) -> Self {
        Self {
            id,
            object_type,
            children: None,
            dirty: false,
        }
    }

    /// Attach initial children.
    pub fn with_children(mut self, children: Children) -> Self {
        self.children = Some(children);
        self
    }
}

impl Serializable for Object {
    fn size(&self) -> usize {
        OBJECT_HEADER_SIZE
    }

    fn delta_size(&mut self) -> usize {
        OBJECT_HEADER_SIZE
    }

    fn to_bytes(&self, buf: &mut [u8], start: usize) -> usize {
        write_header(buf, start, self.id, self.object_type)
    }

    fn to_delta_bytes(&self, buf: &mut [u8], start: usize) -> usize {
        write_header(buf, start, self.id, self.object_type)
    }
}

impl GameObject for Object {
    fn base(&self) -> &Object {
        self
    }

    fn base_mut(&mut self) -> &mut Object {
        self
    }
}

// =============================================================================
// ENCODING HELPERS
// =============================================================================

/// Write `[id u32 LE][type u8]`.
#[inline]
pub fn write_header(buf: &mut [u8], start: usize, id: ObjectId, object_type: ObjectType) -> usize {
    buf[start..start + 4].copy_from_slice(&id.to_le_bytes());
    buf[start + 4] = object_type.tag();
    OBJECT_HEADER_SIZE
}

/// Write `[x f32 LE][y f32 LE]`.
#[inline]
pub fn write_position(buf: &mut [u8], start: usize, position: Point) -> usize {
    buf[start..start + 4].copy_from_slice(&position.x.to_le_bytes());
    buf[start + 4..start + 8].copy_from_slice(&position.y.to_le_bytes());
    POSITION_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_tags() {
        assert_eq!(ObjectType::Object.tag(), 0);
        assert_eq!(ObjectType::ConcreteObject.tag(), 1);
        assert_eq!(ObjectType::Player.tag(), 2);
        assert_eq!(ObjectType::from_u8(2), Some(ObjectType::Player));
        assert_eq!(ObjectType::from_u8(7), None);
        assert_eq!(ObjectType::Object.record_size(), 5);
        assert_eq!(ObjectType::Player.record_size(), 13);
        assert_eq!(ObjectType::default(), ObjectType::Object);
    }

    #[test]
    fn test_dirty_flag_flips_freely() {
        let mut obj = Object::new(1);
        assert!(!obj.is_dirty());
        obj.mark_dirty();
        obj.mark_dirty();
        assert!(obj.is_dirty());
        obj.mark_clean();
        assert!(!obj.is_dirty());
    }

    #[test]
    fn test_children_created_lazily() {
        let mut parent = Object::new(1);
        assert!(parent.children().is_none());
        assert!(parent.remove_child(2).is_none());

        parent.add_child(Box::new(Object::new(3)));
        parent.add_child(Box::new(Object::new(2)));
        parent.set_child(9, Box::new(Object::new(4)));

        let ids: Vec<_> = parent.children().unwrap().keys().copied().collect();
        assert_eq!(ids, vec![2, 3, 9]);

        let removed = parent.remove_child(3).unwrap();
        assert_eq!(removed.id(), 3);
        assert_eq!(parent.children().unwrap().len(), 2);
    }

    #[test]
    fn test_nested_children() {
        let mut child = Object::new(2);
        child.add_child(Box::new(Object::new(3)));
        let mut root = Object::new(1);
        root.add_child(Box::new(child));

        let grandchild = root.children().unwrap()[&2].children().unwrap();
        assert!(grandchild.contains_key(&3));
    }

    #[test]
    fn test_object_encoding() {
        let obj = Object::new(0x0102_0304);
        let mut buf = [0xAAu8; 8];
        let written = obj.to_bytes(&mut buf, 2);
        assert_eq!(written, OBJECT_HEADER_SIZE);
        assert_eq!(obj.size(), written);
        assert_eq!(&buf, &[0xAA, 0xAA, 0x04, 0x03, 0x02, 0x01, 0x00, 0xAA]);
    }

    #[test]
    fn test_bare_object_has_no_capabilities() {
        let mut obj = Object::new(1);
        assert!(obj.as_concrete().is_none());
        assert!(obj.as_entity().is_none());
        assert!(obj.as_physics().is_none());
        assert!(obj.as_character_mut().is_none());
        assert!(obj.as_network().is_none());
    }

    #[test]
    #[should_panic]
    fn test_encoding_into_short_buffer_panics() {
        let obj = Object::new(1);
        let mut buf = [0u8; 4];
        obj.to_bytes(&mut buf, 0);
    }
}
