use crate::config::{GameInfo, LaunchDescriptor};
use crate::error::LobbyError;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{Response, MAX_FRAME_LEN};

/// Identifies a game in `games/*` requests
#[derive(Debug, Deserialize)]
pub struct GameRef {
    #[serde(alias = "id")]
    pub game_id: u32,
}

/// The games this lobby can host
#[derive(Debug, Clone)]
pub struct Catalog {
    games: Vec<GameInfo>,
    default_launch: LaunchDescriptor,
}

impl Catalog {
    pub fn new(games: Vec<GameInfo>, default_launch: LaunchDescriptor) -> Self {
        Self {
            games,
            default_launch,
        }
    }

    pub fn get(&self, id: u32) -> Result<&GameInfo, LobbyError> {
        self.games
            .iter()
            .find(|g| g.id == id)
            .ok_or(LobbyError::UnknownGame(id))
    }

    /// Game used when a room is created without naming one
    pub fn default_game(&self) -> Option<&GameInfo> {
        self.games.first()
    }

    pub fn launch_descriptor(&self, id: u32) -> Result<&LaunchDescriptor, LobbyError> {
        let game = self.get(id)?;
        Ok(game.launch.as_ref().unwrap_or(&self.default_launch))
    }

    pub fn list_json(&self) -> Vec<Value> {
        self.games
            .iter()
            .map(|g| {
                json!({
                    "id": g.id,
                    "name": g.name,
                    "short_desc": g.short_desc,
                    "current_version": g.current_version,
                    "max_players": g.max_players,
                })
            })
            .collect()
    }

    pub fn version(&self, id: u32) -> Result<Response, LobbyError> {
        let game = self.get(id)?;
        Ok(Response::ok()
            .with("game_id", id)
            .with("version", game.current_version.clone()))
    }

    pub fn name(&self, id: u32) -> Result<Response, LobbyError> {
        let game = self.get(id)?;
        Ok(Response::ok()
            .with("game_id", id)
            .with("name", game.name.clone()))
    }

    /// Package text for a game, sized so the reply still fits in one frame
    pub async fn download(&self, id: u32) -> Result<Response, LobbyError> {
        let game = self.get(id)?;
        let path = game.package.as_ref().ok_or(LobbyError::NoPackage(id))?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LobbyError::BadRequest(format!("cannot read package for game {}: {}", id, e)))?;

        let response = Response::ok()
            .with("game_id", id)
            .with("name", game.name.clone())
            .with("version", game.current_version.clone())
            .with("content", content);
        let encoded = serde_json::to_vec(&response)?;
        if encoded.len() >= MAX_FRAME_LEN {
            return Err(LobbyError::PackageTooLarge(id));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobbyConfig;
    use std::path::PathBuf;

    fn catalog() -> Catalog {
        let config = LobbyConfig::default();
        Catalog::new(config.games, config.launch)
    }

    fn package_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.get(3).unwrap().max_players, 2);
        assert!(matches!(catalog.get(99), Err(LobbyError::UnknownGame(99))));
        assert_eq!(catalog.default_game().unwrap().id, 3);
        assert_eq!(catalog.name(3).unwrap().get_str("name"), Some("Blockfall Duel"));
        assert_eq!(catalog.version(3).unwrap().get_str("version"), Some("1.0.0"));
    }

    #[test]
    fn test_game_ref_accepts_id_alias() {
        let by_alias: GameRef = serde_json::from_value(json!({"id": 3})).unwrap();
        let by_name: GameRef = serde_json::from_value(json!({"game_id": 4})).unwrap();
        assert_eq!(by_alias.game_id, 3);
        assert_eq!(by_name.game_id, 4);
    }

    #[test]
    fn test_per_game_launch_override() {
        let custom = LaunchDescriptor {
            program: "practice-server".to_string(),
            args: vec![],
        };
        let mut games = LobbyConfig::default().games;
        games[0].launch = Some(custom.clone());
        let catalog = Catalog::new(games, LaunchDescriptor::default());
        assert_eq!(catalog.launch_descriptor(3).unwrap(), &custom);
    }

    #[tokio::test]
    async fn test_download_without_package() {
        let result = catalog().download(3).await;
        assert!(matches!(result, Err(LobbyError::NoPackage(3))));
    }

    #[tokio::test]
    async fn test_download_package() {
        let path = package_file("small.txt", "print('hello')\n");
        let mut games = LobbyConfig::default().games;
        games[0].package = Some(path.clone());
        let catalog = Catalog::new(games, LaunchDescriptor::default());

        let response = catalog.download(3).await.unwrap();
        assert_eq!(response.get_str("content"), Some("print('hello')\n"));
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_download_too_large() {
        let path = package_file("large.txt", &"x".repeat(MAX_FRAME_LEN));
        let mut games = LobbyConfig::default().games;
        games[0].package = Some(path.clone());
        let catalog = Catalog::new(games, LaunchDescriptor::default());

        let result = catalog.download(3).await;
        assert!(matches!(result, Err(LobbyError::PackageTooLarge(3))));
        std::fs::remove_file(path).ok();
    }
}
