//! Tick Engine
//!
//! Owns the object registry and drives it with three concurrent loops:
//!
//! - **fixed update**: every tick interval, advance every tickable object by
//!   a constant delta under the exclusive lock, then run the fixed hook
//!   (delta serialization) outside the lock;
//! - **variable update**: free-running presentation frames paced toward a
//!   target frame rate, under the shared lock, with measured delta;
//! - **event consumer**: drains the bounded command queue and applies each
//!   event's effects under the exclusive lock.
//!
//! All three observe one shutdown signal between iterations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::game::effects::Event;
use crate::game::object::{GameObject, ObjectId};
use crate::game::state::{Registry, State};

/// Default fixed simulation rate (Hz).
pub const DEFAULT_FIXED_TPS: f64 = 30.0;

/// Default presentation rate (frames per second).
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// Default command queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed simulation ticks per second.
    pub fixed_ticks_per_second: f64,
    /// Target presentation frames per second.
    pub target_fps: u32,
    /// Command queue capacity; events beyond it are dropped.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_ticks_per_second: DEFAULT_FIXED_TPS,
            target_fps: DEFAULT_TARGET_FPS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fixed_ticks_per_second: env_or("ARENA_FIXED_TPS", defaults.fixed_ticks_per_second),
            target_fps: env_or("ARENA_TARGET_FPS", defaults.target_fps),
            queue_capacity: env_or("ARENA_QUEUE_CAPACITY", defaults.queue_capacity),
        }
    }

    /// Fixed tick period, rounded to whole milliseconds.
    pub fn tick_interval(&self) -> Duration {
        let tps = if self.fixed_ticks_per_second > 0.0 {
            self.fixed_ticks_per_second
        } else {
            DEFAULT_FIXED_TPS
        };
        Duration::from_millis((1000.0 / tps).round().max(1.0) as u64)
    }

    /// Constant simulation delta in seconds (the tick period, not measured).
    pub fn fixed_delta(&self) -> f64 {
        self.tick_interval().as_secs_f64()
    }

    /// Presentation frame budget.
    pub fn target_frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }
}

/// Parse an environment variable, keeping `default` when unset or invalid.
pub(crate) fn env_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

// =============================================================================
// HOOKS, PHASES, STATS, ERRORS
// =============================================================================

/// Callback run after each loop iteration, outside the registry lock.
/// Receives the registry and the iteration's delta (seconds).
pub type UpdateHook = Arc<dyn Fn(&Registry, f64) + Send + Sync>;

/// Optional callbacks wired into the loops.
#[derive(Clone, Default)]
pub struct EngineHooks {
    /// Runs after every fixed tick.
    pub on_fixed_update: Option<UpdateHook>,
    /// Runs after every presentation frame.
    pub on_variable_update: Option<UpdateHook>,
}

impl EngineHooks {
    /// Set the fixed-update hook.
    pub fn on_fixed_update(mut self, hook: impl Fn(&Registry, f64) + Send + Sync + 'static) -> Self {
        self.on_fixed_update = Some(Arc::new(hook));
        self
    }

    /// Set the variable-update hook.
    pub fn on_variable_update(mut self, hook: impl Fn(&Registry, f64) + Send + Sync + 'static) -> Self {
        self.on_variable_update = Some(Arc::new(hook));
        self
    }
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Configured, loops not started.
    Created,
    /// Loops running.
    Running,
    /// Shutdown signalled, waiting for loops to exit.
    Stopping,
    /// All loops exited.
    Stopped,
}

/// Running counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    fixed_ticks: AtomicU64,
    frames: AtomicU64,
    events_applied: AtomicU64,
    events_dropped: AtomicU64,
}

impl EngineStats {
    /// Fixed ticks completed.
    pub fn fixed_ticks(&self) -> u64 {
        self.fixed_ticks.load(Ordering::Relaxed)
    }

    /// Presentation frames completed.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Events taken off the queue and applied.
    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    /// Events shed because the queue was full or closed.
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `run` was called more than once.
    #[error("Engine already started")]
    AlreadyStarted,

    /// A loop task panicked or was cancelled.
    #[error("Engine loop failed: {0}")]
    LoopPanicked(#[from] tokio::task::JoinError),
}

// =============================================================================
// ENGINE
// =============================================================================

struct EngineInner {
    registry: Arc<Registry>,
    tick_interval: Duration,
    fixed_delta: f64,
    target_frame: Duration,
    queue_capacity: usize,
    event_tx: mpsc::Sender<Event>,
    event_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    phase: Mutex<EnginePhase>,
    stats: EngineStats,
    hooks: EngineHooks,
}

/// The tick engine. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine over an initial state, without hooks.
    pub fn new(state: State, config: EngineConfig) -> Self {
        Self::with_hooks(state, config, EngineHooks::default())
    }

    /// Create an engine with hooks.
    pub fn with_hooks(state: State, config: EngineConfig, hooks: EngineHooks) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(queue_capacity);

        Self {
            inner: Arc::new(EngineInner {
                registry: Arc::new(Registry::new(state)),
                tick_interval: config.tick_interval(),
                fixed_delta: config.fixed_delta(),
                target_frame: config.target_frame_duration(),
                queue_capacity,
                event_tx,
                event_rx: Mutex::new(Some(event_rx)),
                phase: Mutex::new(EnginePhase::Created),
                stats: EngineStats::default(),
                hooks,
            }),
        }
    }

    /// Start the three loops.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn run(&self) -> Result<EngineHandle, EngineError> {
        let mut phase = self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != EnginePhase::Created {
            return Err(EngineError::AlreadyStarted);
        }
        let event_rx = self
            .inner
            .event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EngineError::AlreadyStarted)?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let tasks = vec![
            tokio::spawn(run_fixed_update_loop(self.inner.clone(), shutdown_tx.subscribe())),
            tokio::spawn(run_variable_update_loop(self.inner.clone(), shutdown_tx.subscribe())),
            tokio::spawn(run_event_consumer(self.inner.clone(), event_rx, shutdown_tx.subscribe())),
        ];

        *phase = EnginePhase::Running;
        info!(
            "Engine running: tick {:?} (delta {:.4}s), frame budget {:?}, queue {}",
            self.inner.tick_interval, self.inner.fixed_delta, self.inner.target_frame, self.inner.queue_capacity
        );

        Ok(EngineHandle {
            engine: self.clone(),
            shutdown_tx,
            tasks,
        })
    }

    /// Queue an event without blocking. Dropped if the queue is full or closed.
    pub fn handle_event(&self, event: Event) {
        match self.inner.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.inner.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(source = event.source_id, "Event queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                self.inner.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(source = event.source_id, "Event queue closed, dropping event");
            }
        }
    }

    /// Add an object to the registry (replacing any object with the same id).
    pub fn add_object(&self, obj: Box<dyn GameObject>) -> Option<Box<dyn GameObject>> {
        self.inner.registry.write().insert(obj)
    }

    /// Add an object only if its id is unused. Hands the object back when
    /// the id is taken, leaving the existing object in place.
    pub fn try_add_object(&self, obj: Box<dyn GameObject>) -> Result<(), Box<dyn GameObject>> {
        let mut state = self.inner.registry.write();
        if state.contains(obj.id()) {
            return Err(obj);
        }
        state.insert(obj);
        Ok(())
    }

    /// Remove an object from every registry view.
    pub fn remove_object(&self, id: ObjectId) -> Option<Box<dyn GameObject>> {
        self.inner.registry.write().remove(id)
    }

    /// Inspect an object under the shared lock.
    pub fn with_object<R>(&self, id: ObjectId, f: impl FnOnce(&dyn GameObject) -> R) -> Option<R> {
        self.inner.registry.read().get(id).map(|obj| f(obj))
    }

    /// Check membership.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.inner.registry.read().contains(id)
    }

    /// Number of registered objects.
    pub fn object_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Run one fixed tick on the calling task: tick every entity, then the
    /// fixed hook. This is exactly what the fixed loop does each period.
    pub fn fixed_update(&self) {
        self.inner.fixed_update();
    }

    /// Apply one event immediately, bypassing the queue.
    pub fn apply_event(&self, event: &Event) -> usize {
        self.inner.apply_event(event)
    }

    /// Shared registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> EnginePhase {
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counters.
    pub fn stats(&self) -> &EngineStats {
        &self.inner.stats
    }

    /// Fixed tick period.
    pub fn tick_interval(&self) -> Duration {
        self.inner.tick_interval
    }

    /// Constant fixed delta in seconds.
    pub fn fixed_delta(&self) -> f64 {
        self.inner.fixed_delta
    }

    /// Events waiting in the queue.
    pub fn queued_events(&self) -> usize {
        self.inner.queue_capacity - self.inner.event_tx.capacity()
    }

    fn set_phase(&self, next: EnginePhase) {
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl EngineInner {
    fn fixed_update(&self) {
        {
            let mut state = self.registry.write();
            state.tick_entities(self.fixed_delta);
        }
        self.stats.fixed_ticks.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(tick = self.stats.fixed_ticks(), "Fixed tick");

        if let Some(hook) = &self.hooks.on_fixed_update {
            hook(&self.registry, self.fixed_delta);
        }
    }

    fn variable_update(&self, delta: f64) {
        {
            let state = self.registry.read();
            state.frame_entities(delta);
        }
        self.stats.frames.fetch_add(1, Ordering::Relaxed);

        if let Some(hook) = &self.hooks.on_variable_update {
            hook(&self.registry, delta);
        }
    }

    /// Returns the number of effects applied. Missing targets are skipped.
    fn apply_event(&self, event: &Event) -> usize {
        let mut applied = 0;
        {
            let mut state = self.registry.write();
            for (target, effects) in &event.effects {
                let Some(obj) = state.get_mut(*target) else {
                    debug!(target = *target, source = event.source_id, "Skipping effects for missing object");
                    continue;
                };
                for effect in effects {
                    if effect.apply(&mut *obj) {
                        applied += 1;
                    }
                }
            }
        }
        self.stats.events_applied.fetch_add(1, Ordering::Relaxed);
        applied
    }
}

// =============================================================================
// LOOPS
// =============================================================================

#[instrument(skip_all, name = "fixed_update_loop")]
async fn run_fixed_update_loop(inner: Arc<EngineInner>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(inner.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => inner.fixed_update(),
        }
    }
    debug!("Fixed update loop exited");
}

#[instrument(skip_all, name = "variable_update_loop")]
async fn run_variable_update_loop(inner: Arc<EngineInner>, mut shutdown: broadcast::Receiver<()>) {
    let mut last_frame = Instant::now();

    loop {
        let frame_start = Instant::now();
        let delta = frame_start.duration_since(last_frame).as_secs_f64();
        last_frame = frame_start;

        inner.variable_update(delta);

        // Behind schedule: go again immediately, no catch-up.
        let pause = inner.target_frame.saturating_sub(frame_start.elapsed());
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = sleep(pause) => {}
        }
    }
    debug!("Variable update loop exited");
}

#[instrument(skip_all, name = "event_consumer")]
async fn run_event_consumer(
    inner: Arc<EngineInner>,
    mut events: mpsc::Receiver<Event>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            event = events.recv() => match event {
                Some(event) => {
                    inner.apply_event(&event);
                }
                None => break,
            },
        }
    }
    events.close();
    debug!("Event consumer exited");
}

// =============================================================================
// HANDLE
// =============================================================================

/// Proof that the loops are running; consumed by [`EngineHandle::shutdown`],
/// so shutdown can only happen once.
pub struct EngineHandle {
    engine: Engine,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// The engine these loops drive.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Signal every loop, close the command queue and wait for all loops
    /// to exit.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        self.engine.set_phase(EnginePhase::Stopping);
        let _ = self.shutdown_tx.send(());

        let mut result = Ok(());
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Engine loop failed: {}", e);
                if result.is_ok() {
                    result = Err(EngineError::LoopPanicked(e));
                }
            }
        }

        self.engine.set_phase(EnginePhase::Stopped);
        info!(
            "Engine stopped after {} ticks, {} events applied, {} dropped",
            self.engine.stats().fixed_ticks(),
            self.engine.stats().events_applied(),
            self.engine.stats().events_dropped()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{Direction, Point};
    use crate::game::concrete::Concrete;
    use crate::game::effects::Effect;
    use crate::game::player::Player;
    use std::sync::atomic::AtomicUsize;

    fn test_config() -> EngineConfig {
        EngineConfig {
            fixed_ticks_per_second: 30.0,
            target_fps: 60,
            queue_capacity: 16,
        }
    }

    fn position_of(engine: &Engine, id: ObjectId) -> Point {
        engine
            .with_object(id, |o| o.as_concrete().unwrap().position())
            .unwrap()
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for engine");
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_config_tick_interval_rounding() {
        let config = test_config();
        assert_eq!(config.tick_interval(), Duration::from_millis(33));
        assert!((config.fixed_delta() - 0.033).abs() < 1e-9);

        let config = EngineConfig { fixed_ticks_per_second: 60.0, ..test_config() };
        assert_eq!(config.tick_interval(), Duration::from_millis(17));
        assert_eq!(config.target_frame_duration(), Duration::from_secs(1) / 60);
    }

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fixed_ticks_per_second, DEFAULT_FIXED_TPS);
        assert_eq!(config.target_fps, DEFAULT_TARGET_FPS);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_fixed_update_uses_constant_delta() {
        let engine = Engine::new(State::new(), test_config());
        engine.add_object(Box::new(Player::new(1, "a", Point::ORIGIN, 800.0)));
        engine.apply_event(&Event::single(1, 1, Effect::Movement(Direction::Right)));

        engine.fixed_update();
        let step = 800.0 * engine.fixed_delta() as f32;
        assert!((position_of(&engine, 1).x - step).abs() < 1e-3);

        engine.fixed_update();
        assert!((position_of(&engine, 1).x - 2.0 * step).abs() < 1e-3);
        assert_eq!(engine.stats().fixed_ticks(), 2);
    }

    #[test]
    fn test_stale_target_is_noop() {
        let engine = Engine::new(State::new(), test_config());
        engine.add_object(Box::new(Player::new(1, "a", Point::ORIGIN, 10.0)));
        engine.remove_object(1);

        let applied = engine.apply_event(&Event::single(1, 1, Effect::Movement(Direction::Up)));
        assert_eq!(applied, 0);
        assert!(!engine.contains(1));
    }

    #[test]
    fn test_try_add_keeps_existing_object() {
        let engine = Engine::new(State::new(), test_config());
        engine.try_add_object(Box::new(Concrete::new(4, Point::new(5.0, 5.0)))).unwrap();

        let rejected = engine
            .try_add_object(Box::new(Player::new(4, "a", Point::ORIGIN, 10.0)))
            .unwrap_err();
        assert_eq!(rejected.id(), 4);
        assert_eq!(engine.object_count(), 1);
        assert_eq!(position_of(&engine, 4), Point::new(5.0, 5.0));
        assert!(engine.with_object(4, |o| o.as_entity().is_none()).unwrap());
    }

    #[test]
    fn test_fixed_hook_runs_after_tick_without_lock() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let hooks = EngineHooks::default().on_fixed_update(move |registry, delta| {
            // Exclusive lock must be free here.
            let _state = registry.write();
            assert!(delta > 0.0);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let engine = Engine::with_hooks(State::new(), test_config(), hooks);

        engine.fixed_update();
        engine.fixed_update();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_backpressure_drops_excess_events() {
        let config = EngineConfig { queue_capacity: 4, ..test_config() };
        let engine = Engine::new(State::new(), config);
        engine.add_object(Box::new(Player::new(1, "a", Point::ORIGIN, 10.0)));

        for _ in 0..10 {
            engine.handle_event(Event::single(1, 1, Effect::Movement(Direction::Left)));
        }
        assert_eq!(engine.queued_events(), 4);
        assert_eq!(engine.stats().events_dropped(), 6);

        let handle = engine.run().unwrap();
        wait_for(|| engine.stats().events_applied() == 4).await;
        assert_eq!(engine.queued_events(), 0);
        handle.shutdown().await.unwrap();

        assert_eq!(engine.stats().events_applied(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lifecycle_and_movement() {
        let engine = Engine::new(State::new(), test_config());
        assert_eq!(engine.phase(), EnginePhase::Created);
        engine.add_object(Box::new(Player::new(1, "a", Point::ORIGIN, 800.0)));
        engine.add_object(Box::new(Concrete::new(2, Point::new(5.0, 5.0))));

        let handle = engine.run().unwrap();
        assert_eq!(engine.phase(), EnginePhase::Running);
        assert!(matches!(engine.run(), Err(EngineError::AlreadyStarted)));

        engine.handle_event(Event::single(1, 1, Effect::Movement(Direction::Right)));
        wait_for(|| position_of(&engine, 1).x > 0.0).await;
        wait_for(|| engine.stats().frames() > 0).await;

        // Concurrent membership changes while loops run.
        engine.add_object(Box::new(Player::new(3, "c", Point::ORIGIN, 1.0)));
        assert!(engine.remove_object(3).is_some());

        handle.shutdown().await.unwrap();
        assert_eq!(engine.phase(), EnginePhase::Stopped);

        let velocity = engine
            .with_object(1, |o| o.as_physics().unwrap().velocity())
            .unwrap();
        assert_eq!(velocity.x, 800.0);
        assert_eq!(position_of(&engine, 2), Point::new(5.0, 5.0));

        // Queue is closed after shutdown.
        let dropped = engine.stats().events_dropped();
        engine.handle_event(Event::single(1, 1, Effect::Movement(Direction::Stop)));
        assert_eq!(engine.stats().events_dropped(), dropped + 1);
    }
}
