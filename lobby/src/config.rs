use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder in launch arguments replaced by the lobby's public address
pub const LOBBY_ADDR_PLACEHOLDER: &str = "{lobby}";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// How to start one match-engine process
///
/// The lobby runs `program args... <port> <room_id>`. Any argument equal to
/// `{lobby}` is replaced by the address the match should report back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for LaunchDescriptor {
    fn default() -> Self {
        Self {
            program: "match-server".to_string(),
            args: vec!["--lobby".to_string(), LOBBY_ADDR_PLACEHOLDER.to_string()],
        }
    }
}

impl LaunchDescriptor {
    pub fn command_line(&self, port: u16, room_id: u64, lobby_addr: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                if arg == LOBBY_ADDR_PLACEHOLDER {
                    lobby_addr.to_string()
                } else {
                    arg.clone()
                }
            })
            .chain([port.to_string(), room_id.to_string()])
            .collect()
    }
}

/// One entry of the game catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default = "default_version")]
    pub current_version: String,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// File served by `games/download_game`
    #[serde(default)]
    pub package: Option<PathBuf>,
    /// Overrides the lobby-wide launch descriptor for this game
    #[serde(default)]
    pub launch: Option<LaunchDescriptor>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_max_players() -> usize {
    2
}

fn default_games() -> Vec<GameInfo> {
    vec![GameInfo {
        id: 3,
        name: "Blockfall Duel".to_string(),
        short_desc: "Two-player falling-block match".to_string(),
        current_version: default_version(),
        max_players: 2,
        package: None,
        launch: None,
    }]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    pub bind_addr: String,
    /// Host handed to clients and to match processes for reaching services
    pub public_host: String,
    pub gateway_addr: String,
    pub gateway_timeout_ms: u64,
    pub port_range: Range<u16>,
    pub launch: LaunchDescriptor,
    pub games: Vec<GameInfo>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:14110".to_string(),
            public_host: "127.0.0.1".to_string(),
            gateway_addr: "127.0.0.1:14411".to_string(),
            gateway_timeout_ms: 5000,
            port_range: 16800..16900,
            launch: LaunchDescriptor::default(),
            games: default_games(),
        }
    }
}

impl LobbyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}
