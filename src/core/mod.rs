//! Core primitives.
//!
//! Plain 2D geometry shared by the object model and the wire format.

pub mod geometry;

pub use geometry::{Direction, Point, UnknownDirection, Vector};
