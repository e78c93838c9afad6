//! Positioned Objects
//!
//! A [`Concrete`] is an [`Object`] with a position. It keeps a shadow copy of
//! the position as last serialized; comparing the two is how the delta
//! encoder decides whether the object goes into the next frame.

use crate::core::geometry::Point;
use crate::game::object::{
    write_header, write_position, ConcreteObject, GameObject, Object, ObjectId, ObjectType,
    Serializable, OBJECT_HEADER_SIZE, POSITION_SIZE,
};

/// An object with a position.
#[derive(Debug)]
pub struct Concrete {
    /// Embedded base object
    pub object: Object,
    /// Live position
    pub position: Point,
    /// Position as of the last serialization pass
    prev_position: Point,
}

impl Concrete {
    /// Create a positioned object. The shadow position starts equal to
    /// `position`, so a fresh object is clean until it moves.
    pub fn new(id: ObjectId, position: Point) -> Self {
        Self::with_object(Object::with_type(id, ObjectType::ConcreteObject), position)
    }

    /// Wrap an existing base object.
    pub fn with_object(object: Object, position: Point) -> Self {
        Self {
            object,
            position,
            prev_position: position,
        }
    }

    /// Shared delta-size rule for every positioned kind.
    ///
    /// Exact comparison: positions only change through discrete
    /// velocity-scaled steps, so any movement shows up bit-for-bit.
    pub(crate) fn positional_delta_size(&mut self) -> usize {
        if self.position == self.prev_position {
            self.object.mark_clean();
            OBJECT_HEADER_SIZE
        } else {
            self.object.mark_dirty();
            self.prev_position = self.position;
            OBJECT_HEADER_SIZE + POSITION_SIZE
        }
    }

    /// Write `[id][type][x][y]`.
    pub(crate) fn encode(&self, buf: &mut [u8], start: usize) -> usize {
        let mut offset = start;
        offset += write_header(buf, offset, self.object.id(), self.object.object_type());
        offset += write_position(buf, offset, self.position);
        offset - start
    }
}

impl Serializable for Concrete {
    fn size(&self) -> usize {
        OBJECT_HEADER_SIZE + POSITION_SIZE
    }

    fn delta_size(&mut self) -> usize {
        self.positional_delta_size()
    }

    fn to_bytes(&self, buf: &mut [u8], start: usize) -> usize {
        self.encode(buf, start)
    }

    fn to_delta_bytes(&self, buf: &mut [u8], start: usize) -> usize {
        self.encode(buf, start)
    }
}

impl ConcreteObject for Concrete {
    fn position(&self) -> Point {
        self.position
    }

    fn prev_position(&self) -> Point {
        self.prev_position
    }

    fn set_position(&mut self, position: Point) {
        self.position = position;
    }
}

impl GameObject for Concrete {
    fn base(&self) -> &Object {
        &self.object
    }

    fn base_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    fn as_concrete(&self) -> Option<&dyn ConcreteObject> {
        Some(self)
    }

    fn as_concrete_mut(&mut self) -> Option<&mut dyn ConcreteObject> {
        Some(self)
    }
}
