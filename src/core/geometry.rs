//! 2D Geometry
//!
//! Points, vectors and the symbolic movement directions players can request.
//! Components are `f32` because that is what goes on the wire.

use std::fmt;
use std::ops::{Add, AddAssign, Mul};
use std::str::FromStr;
use std::f32::consts::FRAC_1_SQRT_2;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A position in world space.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate (grows downwards)
    pub y: f32,
}

impl Point {
    /// Origin
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new point.
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Move the point by a vector.
    #[inline]
    pub fn translate(self, by: Vector) -> Self {
        Self {
            x: self.x + by.x,
            y: self.y + by.y,
        }
    }
}

impl Add<Vector> for Point {
    type Output = Self;

    #[inline]
    fn add(self, other: Vector) -> Self {
        self.translate(other)
    }
}

impl AddAssign<Vector> for Point {
    #[inline]
    fn add_assign(&mut self, other: Vector) {
        *self = self.translate(other);
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({:.3}, {:.3})", self.x, self.y)
    }
}

/// A displacement or rate of change (velocity, force, acceleration).
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Vector {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Component-wise sum.
    #[inline]
    pub fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Scale by a scalar.
    #[inline]
    pub fn scale(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }

    /// Check for the zero vector.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add for Vector {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Vector::add(self, other)
    }
}

impl AddAssign for Vector {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        *self = Vector::add(*self, other);
    }
}

impl Mul<f32> for Vector {
    type Output = Self;

    #[inline]
    fn mul(self, factor: f32) -> Self {
        self.scale(factor)
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector({:.3}, {:.3})", self.x, self.y)
    }
}

// =============================================================================
// DIRECTIONS
// =============================================================================

/// Symbolic movement direction sent by clients.
///
/// Screen coordinates: "up" is negative Y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Negative Y
    #[serde(rename = "move_up")]
    Up,
    /// Positive Y
    #[serde(rename = "move_down")]
    Down,
    /// Negative X
    #[serde(rename = "move_left")]
    Left,
    /// Positive X
    #[serde(rename = "move_right")]
    Right,
    /// Up and left, normalized
    #[serde(rename = "move_up_left")]
    UpLeft,
    /// Up and right, normalized
    #[serde(rename = "move_up_right")]
    UpRight,
    /// Down and left, normalized
    #[serde(rename = "move_down_left")]
    DownLeft,
    /// Down and right, normalized
    #[serde(rename = "move_down_right")]
    DownRight,
    /// Zero velocity
    #[serde(rename = "stop")]
    Stop,
}

impl Direction {
    /// Every direction, in token order.
    pub const ALL: [Direction; 9] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::UpLeft,
        Direction::UpRight,
        Direction::DownLeft,
        Direction::DownRight,
        Direction::Stop,
    ];

    /// Unit vector for this direction (zero for `Stop`).
    pub fn unit_vector(self) -> Vector {
        match self {
            Direction::Up => Vector::new(0.0, -1.0),
            Direction::Down => Vector::new(0.0, 1.0),
            Direction::Left => Vector::new(-1.0, 0.0),
            Direction::Right => Vector::new(1.0, 0.0),
            Direction::UpLeft => Vector::new(-FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
            Direction::UpRight => Vector::new(FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
            Direction::DownLeft => Vector::new(-FRAC_1_SQRT_2, FRAC_1_SQRT_2),
            Direction::DownRight => Vector::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2),
            Direction::Stop => Vector::ZERO,
        }
    }

    /// Wire token for this direction.
    pub fn token(self) -> &'static str {
        match self {
            Direction::Up => "move_up",
            Direction::Down => "move_down",
            Direction::Left => "move_left",
            Direction::Right => "move_right",
            Direction::UpLeft => "move_up_left",
            Direction::UpRight => "move_up_right",
            Direction::DownLeft => "move_down_left",
            Direction::DownRight => "move_down_right",
            Direction::Stop => "stop",
        }
    }
}

/// Direction token that matches none of the known directions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown direction token: {0:?}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .iter()
            .copied()
            .find(|d| d.token() == token)
            .ok_or_else(|| UnknownDirection(token.to_string()))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_translate() {
        let p = Point::new(1.0, 2.0) + Vector::new(0.5, -1.0);
        assert_eq!(p, Point::new(1.5, 1.0));

        let mut q = Point::ORIGIN;
        q += Vector::new(3.0, 4.0);
        assert_eq!(q, Point::new(3.0, 4.0));
    }

    #[test]
    fn test_vector_scale_and_add() {
        let v = Vector::new(1.0, -2.0).scale(3.0);
        assert_eq!(v, Vector::new(3.0, -6.0));
        assert_eq!(v + Vector::new(1.0, 1.0), Vector::new(4.0, -5.0));
        assert_eq!(Vector::new(2.0, 0.0) * 0.5, Vector::new(1.0, 0.0));
        assert!(Vector::ZERO.is_zero());
    }

    #[test]
    fn test_direction_tokens_roundtrip() {
        for dir in Direction::ALL {
            assert_eq!(dir.token().parse::<Direction>(), Ok(dir));
        }
    }

    #[test]
    fn test_direction_serde_uses_tokens() {
        for dir in Direction::ALL {
            let json = serde_json::to_string(&dir).unwrap();
            assert_eq!(json, format!("\"{}\"", dir.token()));
            assert_eq!(serde_json::from_str::<Direction>(&json).unwrap(), dir);
        }
        assert_eq!(serde_json::from_str::<Direction>("\"move_up_left\"").unwrap(), Direction::UpLeft);
        assert!(serde_json::from_str::<Direction>("\"up_left\"").is_err());
    }

    #[test]
    fn test_unknown_direction_rejected() {
        let err = "move_sideways".parse::<Direction>().unwrap_err();
        assert_eq!(err, UnknownDirection("move_sideways".to_string()));
        assert!("".parse::<Direction>().is_err());
        assert!("MOVE_UP".parse::<Direction>().is_err());
    }

    #[test]
    fn test_diagonals_are_unit_length() {
        for dir in [Direction::UpLeft, Direction::UpRight, Direction::DownLeft, Direction::DownRight] {
            let v = dir.unit_vector();
            let len = (v.x * v.x + v.y * v.y).sqrt();
            assert!((len - 1.0).abs() < 1e-6, "{dir} has length {len}");
        }
        assert!(Direction::Stop.unit_vector().is_zero());
        assert_eq!(Direction::Up.unit_vector(), Vector::new(0.0, -1.0));
    }
}
