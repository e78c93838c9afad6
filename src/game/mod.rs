//! Game Simulation Module
//!
//! Object model, registry and the tick engine that drives it.
//!
//! ## Module Structure
//!
//! - `object`: Object ids, wire kinds, the `GameObject` trait and capability traits
//! - `concrete`: Positioned objects with a shadow position for dirty tracking
//! - `player`: Player-controlled objects with velocity and a weak connection
//! - `effects`: Effects and the events that carry them
//! - `state`: Registry with capability views, plus its lock
//! - `engine`: Fixed/variable loops, command queue, lifecycle

pub mod object;
pub mod concrete;
pub mod player;
pub mod effects;
pub mod state;
pub mod engine;

// Re-export key types
pub use object::{Character, ConcreteObject, Entity, GameObject, NetworkObject, Object, ObjectId, ObjectType, PhysicsObject, Serializable};
pub use concrete::Concrete;
pub use player::{Outbound, Player};
pub use effects::{Effect, Event};
pub use state::{Registry, State};
pub use engine::{Engine, EngineConfig, EngineError, EngineHandle, EngineHooks, EnginePhase, EngineStats};
