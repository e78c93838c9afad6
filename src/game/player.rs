//! Player Objects
//!
//! A [`Player`] is a [`Concrete`] that moves under its own velocity and is
//! steered by movement effects. It also carries a weak handle to the
//! outbound half of its connection, which the transport owns.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::geometry::{Direction, Point, Vector};
use crate::game::concrete::Concrete;
use crate::game::object::{
    Character, ConcreteObject, Entity, GameObject, NetworkObject, Object, ObjectId, ObjectType,
    PhysicsObject, Serializable,
};

/// Outbound byte channel to a remote peer, owned by the transport.
pub type Outbound = mpsc::Sender<Vec<u8>>;

/// Default base speed in units per second.
pub const DEFAULT_PLAYER_SPEED: f32 = 800.0;

/// A player-controlled object.
#[derive(Debug)]
pub struct Player {
    /// Embedded positioned object
    pub concrete: Concrete,
    user_id: String,
    velocity: Vector,
    speed: f32,
    /// Guarded separately from the registry so sends never wait on a tick.
    conn: Mutex<Option<mpsc::WeakSender<Vec<u8>>>>,
}

impl Player {
    /// Create a player at a position with a base speed.
    pub fn new(id: ObjectId, user_id: impl Into<String>, position: Point, speed: f32) -> Self {
        Self {
            concrete: Concrete::with_object(Object::with_type(id, ObjectType::Player), position),
            user_id: user_id.into(),
            velocity: Vector::ZERO,
            speed,
            conn: Mutex::new(None),
        }
    }

    /// Attach a connection at construction time.
    pub fn with_connection(self, outbound: &Outbound) -> Self {
        self.set_connection(outbound);
        self
    }

    /// Login identity.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Point the player at a (new) connection. The player holds it weakly.
    pub fn set_connection(&self, outbound: &Outbound) {
        *self.conn.lock().unwrap_or_else(PoisonError::into_inner) = Some(outbound.downgrade());
    }

    /// Live outbound channel, if the transport still holds it.
    pub fn outbound(&self) -> Option<Outbound> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(mpsc::WeakSender::upgrade)
    }

    /// Forget the connection.
    pub fn clear_connection(&self) {
        *self.conn.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Serializable for Player {
    fn size(&self) -> usize {
        self.concrete.size()
    }

    fn delta_size(&mut self) -> usize {
        self.concrete.positional_delta_size()
    }

    fn to_bytes(&self, buf: &mut [u8], start: usize) -> usize {
        self.concrete.encode(buf, start)
    }

    fn to_delta_bytes(&self, buf: &mut [u8], start: usize) -> usize {
        self.concrete.encode(buf, start)
    }
}

impl ConcreteObject for Player {
    fn position(&self) -> Point {
        self.concrete.position
    }

    fn prev_position(&self) -> Point {
        self.concrete.prev_position()
    }

    fn set_position(&mut self, position: Point) {
        self.concrete.position = position;
    }
}

impl Entity for Player {
    fn on_tick(&mut self, delta: f64) {
        if self.velocity.is_zero() {
            return;
        }
        self.concrete.position += self.velocity.scale(delta as f32);
    }

    fn on_frame(&self, _delta: f64) {}
}

impl PhysicsObject for Player {
    fn velocity(&self) -> Vector {
        self.velocity
    }

    fn set_velocity(&mut self, velocity: Vector) {
        self.velocity = velocity;
    }

    fn apply_force(&mut self, force: Vector) {
        self.velocity += force;
    }

    fn apply_acceleration(&mut self, acceleration: Vector) {
        self.velocity += acceleration;
    }
}

impl Character for Player {
    fn speed(&self) -> f32 {
        self.speed
    }

    fn move_toward(&mut self, direction: Direction) {
        self.velocity = direction.unit_vector().scale(self.speed);
    }
}

impl NetworkObject for Player {
    fn notify(&self, bytes: &[u8]) -> bool {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(outbound) = guard.as_ref().and_then(mpsc::WeakSender::upgrade) else {
            debug!(player = self.id(), "no live connection, dropping {} bytes", bytes.len());
            return false;
        };
        match outbound.try_send(bytes.to_vec()) {
            Ok(()) => true,
            Err(e) => {
                warn!(player = self.id(), "send failed: {}", e);
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl GameObject for Player {
    fn base(&self) -> &Object {
        &self.concrete.object
    }

    fn base_mut(&mut self) -> &mut Object {
        &mut self.concrete.object
    }

    fn as_concrete(&self) -> Option<&dyn ConcreteObject> {
        Some(self)
    }

    fn as_concrete_mut(&mut self) -> Option<&mut dyn ConcreteObject> {
        Some(self)
    }

    fn as_entity(&self) -> Option<&dyn Entity> {
        Some(self)
    }

    fn as_entity_mut(&mut self) -> Option<&mut dyn Entity> {
        Some(self)
    }

    fn as_physics(&self) -> Option<&dyn PhysicsObject> {
        Some(self)
    }

    fn as_physics_mut(&mut self) -> Option<&mut dyn PhysicsObject> {
        Some(self)
    }

    fn as_character_mut(&mut self) -> Option<&mut dyn Character> {
        Some(self)
    }

    fn as_network(&self) -> Option<&dyn NetworkObject> {
        Some(self)
    }
}
