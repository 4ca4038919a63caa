//! Bootstrap: starts the local game integration and the item session

use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use worldlink_protocol::{Transport, WorldId};

use crate::bridge::ItemBridge;
use crate::config::{ClientConfig, ConfigError, ServerConfig, SetUpDto};
use crate::notify::{status, StatusSink};
use crate::session::{Session, SessionOutcome, SessionParams};

/// Name of the thread the game integration runs on
pub const GAME_THREAD_NAME: &str = "game-connection";

/// Local game side of the client
///
/// The integration owns the item queues the session drains and fills, and
/// runs its own connection to the game on a dedicated thread.
pub trait GameIntegration: ItemBridge + 'static {
    /// Runs the game connection. Blocks its thread until the game side ends.
    fn connect(&self, ctx: GameContext);
}

/// What the game integration gets when it starts
#[derive(Debug, Clone)]
pub struct GameContext {
    pub world_id: WorldId,
    pub scanner_enabled: bool,
    pub status: StatusSink,

    /// Cancelled when the client is asked to shut down
    pub interrupt: CancellationToken,
}

/// Shutdown signals shared with a session
#[derive(Debug, Clone, Default)]
pub struct Signals {
    /// Set by the caller to request a clean disconnect
    pub interrupt: CancellationToken,

    /// Cancelled by the session once it disconnected cleanly
    pub terminate: CancellationToken,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start game thread: {0}")]
    GameThread(#[from] std::io::Error),
}

/// Running connections after [`start_connections`] returned
#[derive(Debug)]
pub struct Connections {
    /// Game integration thread; keeps running on its own
    pub game: thread::JoinHandle<()>,

    /// Session result; `None` when multiplayer is disabled
    pub session: Option<SessionOutcome>,
}

/// Starts the game integration and, unless multiplayer is disabled, runs an
/// item session to completion.
///
/// Sessions are not retried. Call again to reconnect.
pub async fn start_connections<T, G>(
    transport: T,
    config: &ClientConfig,
    server: ServerConfig,
    setup: &SetUpDto,
    game: Arc<G>,
    status: StatusSink,
    signals: Signals,
) -> Result<Connections, BootstrapError>
where
    T: Transport,
    G: GameIntegration,
{
    let ctx = GameContext {
        world_id: config.world_id,
        scanner_enabled: config.scanner_enabled,
        status: status.clone(),
        interrupt: signals.interrupt.clone(),
    };
    let game_thread = {
        let game = Arc::clone(&game);
        thread::Builder::new()
            .name(GAME_THREAD_NAME.into())
            .spawn(move || game.connect(ctx))
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to start game thread");
                status.log(&status::game_start_failed(&e));
                BootstrapError::GameThread(e)
            })?
    };
    tracing::debug!(world_id = config.world_id, "Game integration started");

    // The game keeps running on its own when the session cannot start
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Not starting item session");
        status.log(&status::invalid_config(&e));
        return Err(e.into());
    }

    if !config.disable_multiplayer {
        if server.world_id() != config.world_id {
            tracing::warn!(
                server_world = server.world_id(),
                config_world = config.world_id,
                "Server config world id differs from client config, using client config"
            );
        }
        if !setup.game_room_name.is_empty() && setup.game_room_name != config.game_room {
            tracing::warn!(
                setup_room = %setup.game_room_name,
                config_room = %config.game_room,
                "Setup room differs from client config, using client config"
            );
        }
    }

    if config.disable_multiplayer {
        tracing::info!("Multiplayer disabled, not starting item session");
        return Ok(Connections {
            game: game_thread,
            session: None,
        });
    }

    let bridge: Arc<dyn ItemBridge> = game;
    let session = Session::new(
        transport,
        server,
        SessionParams::from_config(config),
        bridge,
        status,
        signals.interrupt,
    )
    .with_terminate(signals.terminate);

    let outcome = session.run().await;
    tracing::info!(outcome = ?outcome, "Item session finished");

    Ok(Connections {
        game: game_thread,
        session: Some(outcome),
    })
}
