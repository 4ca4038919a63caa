//! Client configuration
//!
//! [`ServerConfig`] and [`SetUpDto`] describe one connection attempt and are
//! built by the caller; [`ClientConfig`] holds the process wide values
//! (world id, game room, feature flags, session tuning) and is usually loaded
//! from a YAML file. All of them are passed explicitly into
//! [`start_connections`](crate::bootstrap::start_connections).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use worldlink_protocol::{item_topic, validate_destination, WorldId};

/// Broker endpoint and credentials for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    host: String,
    port: u16,
    world_id: WorldId,
    admin_user: String,
    admin_password: String,
}

impl ServerConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        world_id: WorldId,
        admin_user: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(ConfigError::Invalid("server host must not be empty".into()));
        }
        if port == 0 {
            return Err(ConfigError::Invalid("server port must not be 0".into()));
        }

        Ok(Self {
            host,
            port,
            world_id,
            admin_user: admin_user.into(),
            admin_password: admin_password.into(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    pub fn admin_user(&self) -> &str {
        &self.admin_user
    }

    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }

    /// `host:port`
    pub fn uri(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Websocket URL of the broker
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.uri())
    }

    /// Identity sent in the CONNECT `login` header.
    ///
    /// The broker is addressed by host, so the host doubles as the login;
    /// the admin credentials are kept for room administration and are not
    /// sent on the item connection.
    pub fn connect_login(&self) -> &str {
        &self.host
    }
}

/// Room setup parameters entered alongside the server address
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetUpDto {
    pub max_players: u32,
    pub game_room_name: String,

    /// Free form room settings forwarded to the server when creating a room
    pub settings: Option<String>,

    /// Whether the room refuses new players once started
    pub locked: bool,
}

impl SetUpDto {
    pub fn new(max_players: u32, game_room_name: impl Into<String>) -> Self {
        Self {
            max_players,
            game_room_name: game_room_name.into(),
            settings: None,
            locked: false,
        }
    }
}

/// What happens to in-flight inbound handlers when the session tears down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerShutdown {
    /// Wait for running handlers to finish
    #[default]
    Drain,

    /// Abort running handlers
    Abort,
}

/// Session tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub send_timeout_ms: u64,

    /// Abort when nothing arrives for this long; `None` waits forever
    pub receive_timeout_ms: Option<u64>,

    /// Delay between outbound drains
    pub poll_interval_ms: u64,

    /// Upper bound on concurrently running inbound handlers
    pub max_inflight_messages: usize,

    pub listener_shutdown: ListenerShutdown,

    /// Ask the broker for a RECEIPT to DISCONNECT
    pub disconnect_receipt: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            send_timeout_ms: 5_000,
            receive_timeout_ms: None,
            poll_interval_ms: 50,
            max_inflight_messages: 32,
            listener_shutdown: ListenerShutdown::Drain,
            disconnect_receipt: None,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Process wide client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// This player's world; items from it are never delivered back
    pub world_id: WorldId,

    pub game_room: String,

    /// Whether the local game integration scans memory for found items
    pub scanner_enabled: bool,

    /// Run the local game integration only, without a server session
    pub disable_multiplayer: bool,

    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            world_id: 1,
            game_room: String::new(),
            scanner_enabled: true,
            disable_multiplayer: false,
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(world_id: WorldId, game_room: impl Into<String>) -> Self {
        Self {
            world_id,
            game_room: game_room.into(),
            ..Self::default()
        }
    }

    /// Loads and validates a YAML config file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read_yaml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML config file without validating it, for callers that
    /// apply overrides first
    pub fn read_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.disable_multiplayer {
            return Ok(());
        }

        if self.game_room.is_empty() || self.game_room.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "game room {:?} must be a single non-empty path segment",
                self.game_room
            )));
        }
        validate_destination(&item_topic(&self.game_room))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let session = &self.session;
        if session.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be greater than 0".into()));
        }
        if session.max_inflight_messages == 0 {
            return Err(ConfigError::Invalid(
                "max_inflight_messages must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
