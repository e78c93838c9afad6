//! Game Session
//!
//! The façade a transport talks to. It owns the engine, keeps the directory
//! of connected users, hands out player slots, turns inbound commands into
//! effects and wires the delta encoder into the fixed-update hook so every
//! non-empty tick becomes one broadcast frame.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::core::geometry::Point;
use crate::game::effects::{Effect, Event};
use crate::game::engine::{env_or, Engine, EngineConfig, EngineError, EngineHandle, EngineHooks};
use crate::game::object::{GameObject, ObjectId};
use crate::game::player::{Outbound, Player, DEFAULT_PLAYER_SPEED};
use crate::game::state::State;
use crate::network::broadcast::Broadcaster;
use crate::network::delta::{encode_object_frame, encode_snapshot, DeltaEncoder};
use crate::network::protocol::{encode_player_left, ClientCommand, ClientEvent, MSG_PLAYER_JOINED};

/// Default player slots per session.
pub const DEFAULT_MAX_PLAYERS: usize = 16;

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Engine settings.
    pub engine: EngineConfig,
    /// Player slots; ids are handed out from `0..max_players`.
    pub max_players: usize,
    /// Where new players appear.
    pub spawn: Point,
    /// Base speed for new players (units per second).
    pub base_speed: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            max_players: DEFAULT_MAX_PLAYERS,
            spawn: Point::ORIGIN,
            base_speed: DEFAULT_PLAYER_SPEED,
        }
    }
}

impl SessionConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            engine: EngineConfig::from_env(),
            max_players: env_or("ARENA_MAX_PLAYERS", defaults.max_players),
            spawn: defaults.spawn,
            base_speed: env_or("ARENA_BASE_SPEED", defaults.base_speed),
        }
    }
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every slot is taken.
    #[error("Session full")]
    SessionFull,

    /// The user (or slot) is already in the session.
    #[error("Already joined: {0}")]
    AlreadyJoined(String),

    /// No player for this user.
    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    /// Engine failure.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// User id <-> slot id, plus the slot ring cursor.
#[derive(Debug, Default)]
struct Directory {
    by_user: BTreeMap<String, ObjectId>,
    by_id: BTreeMap<ObjectId, String>,
    next_slot: ObjectId,
}

impl Directory {
    /// Next free slot after the cursor, wrapping at `max`. A slot is free
    /// when no player holds it and `in_use` reports no other object there.
    fn reserve(&mut self, max: usize, in_use: impl Fn(ObjectId) -> bool) -> Option<ObjectId> {
        let max = ObjectId::try_from(max).unwrap_or(ObjectId::MAX);
        if max == 0 {
            return None;
        }
        for _ in 0..max {
            let slot = self.next_slot % max;
            self.next_slot = (slot + 1) % max;
            if !self.by_id.contains_key(&slot) && !in_use(slot) {
                return Some(slot);
            }
        }
        None
    }
}

/// What a successful join still has to send once every lock is released.
struct Admission {
    id: ObjectId,
    user_id: String,
    online: usize,
    joined: Vec<u8>,
    snapshot: Vec<u8>,
    outbound: Option<Outbound>,
}

/// A running world: engine plus player bookkeeping.
pub struct GameSession {
    config: SessionConfig,
    engine: Engine,
    broadcaster: Arc<dyn Broadcaster>,
    directory: Mutex<Directory>,
}

impl GameSession {
    /// Create a session. Delta frames go to `broadcaster` once the engine runs.
    pub fn new(config: SessionConfig, broadcaster: Arc<dyn Broadcaster>) -> Self {
        let encoder = DeltaEncoder::new();
        let sink = broadcaster.clone();
        let hooks = EngineHooks::default().on_fixed_update(move |registry, _delta| {
            let frame = {
                let mut state = registry.write();
                encoder.encode(&mut state)
            };
            if let Some(frame) = frame {
                sink.broadcast(&frame);
            }
        });

        Self {
            engine: Engine::with_hooks(State::new(), config.engine.clone(), hooks),
            config,
            broadcaster,
            directory: Mutex::new(Directory::default()),
        }
    }

    /// Start the engine loops.
    pub fn start(&self) -> Result<EngineHandle, SessionError> {
        let handle = self.engine.run()?;
        info!("Session started with {} slots", self.config.max_players);
        Ok(handle)
    }

    /// The engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Next free player slot, scanning the ring from the last one handed out.
    /// Ids already used by any registry object are skipped. The slot is not
    /// held; pass it to [`GameSession::add_player`] promptly, or use
    /// [`GameSession::join`] which does both under one lock.
    pub fn reserve_slot(&self) -> Option<ObjectId> {
        self.directory()
            .reserve(self.config.max_players, |slot| self.engine.contains(slot))
    }

    /// Create a player for `user_id` in the next free slot and add it.
    pub fn join(&self, user_id: &str, outbound: &Outbound) -> Result<ObjectId, SessionError> {
        let admission = {
            let mut directory = self.directory();
            if directory.by_user.contains_key(user_id) {
                return Err(SessionError::AlreadyJoined(user_id.to_string()));
            }
            let slot = directory
                .reserve(self.config.max_players, |slot| self.engine.contains(slot))
                .ok_or(SessionError::SessionFull)?;

            let player = Player::new(slot, user_id, self.config.spawn, self.config.base_speed)
                .with_connection(outbound);
            self.admit(&mut directory, player)?
        };
        Ok(self.announce(admission))
    }

    /// Add an already built player. Fails if its id is taken by any object.
    pub fn add_player(&self, player: Player) -> Result<ObjectId, SessionError> {
        let admission = {
            let mut directory = self.directory();
            self.admit(&mut directory, player)?
        };
        Ok(self.announce(admission))
    }

    /// Record the player and insert it. Sends nothing.
    fn admit(&self, directory: &mut Directory, player: Player) -> Result<Admission, SessionError> {
        let id = player.id();
        let user_id = player.user_id().to_string();

        if directory.by_user.contains_key(&user_id) || directory.by_id.contains_key(&id) {
            return Err(SessionError::AlreadyJoined(user_id));
        }
        if directory.by_id.len() >= self.config.max_players {
            return Err(SessionError::SessionFull);
        }

        let outbound = player.outbound();
        let joined = encode_object_frame(MSG_PLAYER_JOINED, &player);
        if self.engine.try_add_object(Box::new(player)).is_err() {
            return Err(SessionError::AlreadyJoined(user_id));
        }
        directory.by_user.insert(user_id.clone(), id);
        directory.by_id.insert(id, user_id.clone());

        let snapshot = encode_snapshot(&self.engine.registry().read());
        Ok(Admission {
            id,
            user_id,
            online: directory.by_id.len(),
            joined,
            snapshot,
            outbound,
        })
    }

    /// Broadcast the join and send the joiner its snapshot.
    fn announce(&self, admission: Admission) -> ObjectId {
        let Admission {
            id,
            user_id,
            online,
            joined,
            snapshot,
            outbound,
        } = admission;

        self.broadcaster.broadcast(&joined);
        match outbound {
            Some(outbound) => {
                if let Err(e) = outbound.try_send(snapshot) {
                    warn!(player = id, "Snapshot not delivered: {}", e);
                }
            }
            None => debug!(player = id, "No connection, snapshot not sent"),
        }

        info!(player = id, user = %user_id, "Player joined ({} online)", online);
        id
    }

    /// Remove a user's player and tell everyone.
    pub fn remove_player(&self, user_id: &str) -> Result<ObjectId, SessionError> {
        let id = {
            let mut directory = self.directory();
            let id = directory
                .by_user
                .remove(user_id)
                .ok_or_else(|| SessionError::UnknownPlayer(user_id.to_string()))?;
            directory.by_id.remove(&id);
            self.engine.remove_object(id);
            id
        };

        self.broadcaster.broadcast(&encode_player_left(id));
        info!(player = id, user = %user_id, "Player left");
        Ok(id)
    }

    /// Route an inbound command from a user.
    ///
    /// Malformed and unsupported commands are logged and dropped; only an
    /// unknown sender is reported back.
    pub fn handle_client_event(&self, user_id: &str, event: &ClientEvent) -> Result<(), SessionError> {
        let id = self
            .player_id_for(user_id)
            .ok_or_else(|| SessionError::UnknownPlayer(user_id.to_string()))?;

        match event.command() {
            Ok(ClientCommand::Move(direction)) => {
                self.engine
                    .handle_event(Event::single(id, id, Effect::Movement(direction)));
            }
            Ok(ClientCommand::Chat(text)) => {
                debug!(player = id, len = text.len(), "Chat is not supported, ignoring");
            }
            Ok(ClientCommand::Unknown(kind)) => {
                warn!(player = id, "Unknown command type '{}'", kind);
            }
            Err(e) => {
                warn!(player = id, "Rejected '{}' command: {}", event.kind, e);
            }
        }
        Ok(())
    }

    /// Route a raw JSON command from a user.
    pub fn handle_client_message(&self, user_id: &str, text: &str) -> Result<(), SessionError> {
        match ClientEvent::from_json(text) {
            Ok(event) => self.handle_client_event(user_id, &event),
            Err(e) => {
                warn!(user = %user_id, "Malformed command: {}", e);
                Ok(())
            }
        }
    }

    /// Slot id of a user.
    pub fn player_id_for(&self, user_id: &str) -> Option<ObjectId> {
        self.directory().by_user.get(user_id).copied()
    }

    /// User of a slot id.
    pub fn user_id_for(&self, id: ObjectId) -> Option<String> {
        self.directory().by_id.get(&id).cloned()
    }

    /// Number of players in the session.
    pub fn player_count(&self) -> usize {
        self.directory().by_id.len()
    }

    fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
