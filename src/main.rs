//! Arena Server
//!
//! Runs a session with a few simulated players and reports what observers
//! received.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use arena::{
    network::{broadcast::ChannelBroadcaster, protocol::ClientEvent},
    Direction, GameSession, SessionConfig, VERSION,
};

/// Simulated players.
const DEMO_PLAYERS: usize = 4;

/// Demo length.
const DEMO_DURATION: Duration = Duration::from_secs(3);

/// How often each simulated player changes direction.
const STEER_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SessionConfig::from_env();
    info!("Arena Server v{}", VERSION);
    info!(
        "Tick: {:?} ({} Hz), {} fps target, {} slots",
        config.engine.tick_interval(),
        config.engine.fixed_ticks_per_second,
        config.engine.target_fps,
        config.max_players
    );

    demo_session(config).await
}

/// Demo: run a session with simulated players.
async fn demo_session(config: SessionConfig) -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");

    let broadcaster = ChannelBroadcaster::default();
    let observer = tokio::spawn(observe(broadcaster.subscribe()));
    let session = GameSession::new(config, Arc::new(broadcaster.clone()));

    // Join players; each keeps its outbound channel alive in a drain task.
    let mut players = Vec::with_capacity(DEMO_PLAYERS);
    for _ in 0..DEMO_PLAYERS {
        let user_id = Uuid::new_v4().to_string();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
        let id = session.join(&user_id, &tx).context("join demo player")?;

        let drain = tokio::spawn(async move {
            let mut bytes = 0usize;
            while let Some(frame) = rx.recv().await {
                bytes += frame.len();
            }
            bytes
        });
        players.push((id, user_id, tx, drain));
    }

    let handle = session.start()?;

    let steps = (DEMO_DURATION.as_millis() / STEER_INTERVAL.as_millis()) as usize;
    for step in 0..steps {
        for (i, (_, user_id, _, _)) in players.iter().enumerate() {
            let direction = Direction::ALL[(step + i * 3) % Direction::ALL.len()];
            let message = ClientEvent::movement(direction).to_json()?;
            session.handle_client_message(user_id, &message)?;
        }
        tokio::time::sleep(STEER_INTERVAL).await;
    }

    for (id, _, _, _) in &players {
        let position = session
            .engine()
            .with_object(*id, |obj| obj.as_concrete().map(|c| c.position()))
            .flatten();
        info!("Player {} ended at {:?}", id, position);
    }

    for (_, user_id, tx, drain) in players {
        session.remove_player(&user_id)?;
        drop(tx);
        let bytes = drain.await?;
        info!("User {} received {} direct bytes", &user_id[..8], bytes);
    }

    handle.shutdown().await?;

    let stats = session.engine().stats();
    info!(
        "Engine: {} ticks, {} frames, {} events applied, {} dropped",
        stats.fixed_ticks(),
        stats.frames(),
        stats.events_applied(),
        stats.events_dropped()
    );

    // Close the fan-out so the observer finishes.
    drop(session);
    drop(broadcaster);
    let (frames, bytes) = observer.await?;
    info!("Observer received {} frames ({} bytes)", frames, bytes);

    Ok(())
}

/// Count what a broadcast observer sees until the channel closes.
async fn observe(mut rx: broadcast::Receiver<Arc<[u8]>>) -> (usize, usize) {
    let mut frames = 0;
    let mut bytes = 0;
    loop {
        match rx.recv().await {
            Ok(frame) => {
                frames += 1;
                bytes += frame.len();
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Observer lagged, skipped {} frames", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    (frames, bytes)
}
