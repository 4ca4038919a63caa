use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use worldlink::logging::{init_logging, LogFormat};
use worldlink::stdio_game::LineGame;
use worldlink_client::{
    start_connections, transport::DefaultTransport, ClientConfig, ServerConfig, SetUpDto, Signals,
    StatusSink,
};
use worldlink_protocol::WorldId;

/// Multiworld item client: reads items to send as JSON lines on stdin and
/// prints received items as JSON lines on stdout
#[derive(Debug, Parser)]
#[command(name = "worldlink", author, version)]
struct Cli {
    /// Server host name or address
    #[arg(long, env = "WORLDLINK_HOST")]
    host: String,

    /// Server port
    #[arg(long, env = "WORLDLINK_PORT", default_value_t = 8080)]
    port: u16,

    /// This player's world id (overrides the config file)
    #[arg(long, env = "WORLDLINK_WORLD_ID")]
    world_id: Option<WorldId>,

    /// Game room to join (overrides the config file)
    #[arg(long, env = "WORLDLINK_ROOM")]
    room: Option<String>,

    /// YAML client config file
    #[arg(long, env = "WORLDLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Only run the local game integration
    #[arg(long, default_value_t = false)]
    disable_multiplayer: bool,

    /// Maximum players in the room
    #[arg(long, default_value_t = 2)]
    max_players: u32,

    #[arg(long, env = "WORLDLINK_ADMIN_USER", default_value = "admin")]
    admin_user: String,

    #[arg(long, env = "WORLDLINK_ADMIN_PASSWORD", default_value = "", hide_env_values = true)]
    admin_password: String,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::read_yaml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ClientConfig::default(),
        };

        if let Some(world_id) = self.world_id {
            config.world_id = world_id;
        }
        if let Some(room) = &self.room {
            config.game_room = room.clone();
        }
        if self.disable_multiplayer {
            config.disable_multiplayer = true;
        }

        config.validate().context("invalid client config")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format)?;

    let config = cli.client_config()?;
    let server = ServerConfig::new(
        &cli.host,
        cli.port,
        config.world_id,
        &cli.admin_user,
        &cli.admin_password,
    )?;
    let setup = SetUpDto::new(cli.max_players, config.game_room.clone());

    let signals = Signals::default();
    {
        let interrupt = signals.interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, disconnecting");
                interrupt.cancel();
            }
        });
    }

    let connections = start_connections(
        DefaultTransport::new(),
        &config,
        server,
        &setup,
        Arc::new(LineGame::stdio()),
        StatusSink::log_only(),
        signals.clone(),
    )
    .await?;

    match connections.session {
        Some(outcome) if outcome.is_clean() => Ok(()),
        Some(outcome) => anyhow::bail!("item session ended: {:?}", outcome),
        None => {
            // Game thread only; run until it ends or Ctrl-C
            let game = tokio::task::spawn_blocking(move || connections.game.join());
            tokio::select! {
                _ = signals.interrupt.cancelled() => {}
                _ = game => {}
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::try_parse_from([
            "worldlink",
            "--host",
            "10.0.0.5",
            "--world-id",
            "3",
            "--room",
            "room1",
            "-vv",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.port, 8080);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);

        let config = cli.client_config().unwrap();
        assert_eq!(config.world_id, 3);
        assert_eq!(config.game_room, "room1");
        assert!(!config.disable_multiplayer);
    }

    #[test]
    fn test_cli_requires_room_unless_multiplayer_disabled() {
        let cli = Cli::try_parse_from(["worldlink", "--host", "h"]).unwrap();
        assert!(cli.client_config().is_err());

        let cli = Cli::try_parse_from(["worldlink", "--host", "h", "--disable-multiplayer"]).unwrap();
        assert!(cli.client_config().unwrap().disable_multiplayer);
    }
}
