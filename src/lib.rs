//! # Arena Server
//!
//! Authoritative simulation core for a real-time multiplayer world.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ARENA SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── geometry.rs - Point, Vector, Direction                  │
//! │                                                              │
//! │  game/           - Simulation                                │
//! │  ├── object.rs   - GameObject + capability traits            │
//! │  ├── concrete.rs - Positioned objects, dirty tracking        │
//! │  ├── player.rs   - Player-controlled objects                 │
//! │  ├── effects.rs  - Effects and events                        │
//! │  ├── state.rs    - Registry with capability views            │
//! │  └── engine.rs   - Fixed/variable loops, command queue       │
//! │                                                              │
//! │  network/        - Between simulation and transport          │
//! │  ├── protocol.rs - Commands in, binary frames out            │
//! │  ├── delta.rs    - Per-tick delta frames, snapshots          │
//! │  ├── broadcast.rs- Fan-out to observers                      │
//! │  └── session.rs  - Session façade (join/leave/route)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Timing
//!
//! The fixed loop advances the world by a constant delta derived from the
//! configured tick rate, never by measured time. The variable loop runs
//! presentation frames with measured delta and never mutates the registry.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::geometry::{Direction, Point, Vector};
pub use game::engine::{Engine, EngineConfig, EngineError, EngineHandle};
pub use game::object::{GameObject, ObjectId, ObjectType};
pub use game::player::Player;
pub use network::session::{GameSession, SessionConfig, SessionError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default fixed simulation rate (Hz)
pub const TICK_RATE: f64 = game::engine::DEFAULT_FIXED_TPS;
