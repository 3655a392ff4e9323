//! Match-engine process management

use crate::config::LaunchDescriptor;
use crate::room::RoomId;
use log::{info, warn};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::net::TcpListener;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("no free port in {start}..{end}")]
    NoFreePort { start: u16, end: u16 },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub port: u16,
    pub room_id: RoomId,
    pub game_id: u32,
    pub descriptor: LaunchDescriptor,
    /// Where the match submits its result report
    pub lobby_addr: String,
}

impl LaunchRequest {
    pub fn args(&self) -> Vec<String> {
        self.descriptor
            .command_line(self.port, self.room_id, &self.lobby_addr)
    }
}

/// Starts a match for a room; must not block
pub trait MatchLauncher: Send + Sync + 'static {
    fn launch(&self, request: &LaunchRequest) -> Result<(), LaunchError>;
}

/// Spawns the descriptor's program as a child process
#[derive(Debug, Default)]
pub struct ProcessLauncher;

impl MatchLauncher for ProcessLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
        let program = request.descriptor.program.clone();
        let mut child = Command::new(&program)
            .args(request.args())
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: program.clone(),
                source,
            })?;

        info!(
            "Launched {} for room {} on port {} (pid {:?})",
            program,
            request.room_id,
            request.port,
            child.id()
        );

        // Reap the child so it never lingers as a zombie
        let room_id = request.room_id;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("Match for room {} exited with {}", room_id, status),
                Err(e) => warn!("Lost track of match for room {}: {}", room_id, e),
            }
        });
        Ok(())
    }
}

/// Records launches instead of spawning anything
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    launches: Mutex<Vec<LaunchRequest>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.launches
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}

impl MatchLauncher for RecordingLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<(), LaunchError> {
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(request.clone());
        }
        Ok(())
    }
}

/// First port in `start..end` that can currently be bound on `host`
///
/// The probe listener is closed again before returning, so the match process
/// can bind the port itself.
pub async fn find_free_port(host: &str, start: u16, end: u16) -> Result<u16, LaunchError> {
    for port in start..end {
        if let Ok(listener) = TcpListener::bind((host, port)).await {
            drop(listener);
            return Ok(port);
        }
    }
    Err(LaunchError::NoFreePort { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_free_port_skips_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        if port == u16::MAX {
            return;
        }

        let found = find_free_port("127.0.0.1", port, port + 1).await;
        assert!(matches!(found, Err(LaunchError::NoFreePort { .. })));
    }

    #[tokio::test]
    async fn test_find_free_port_empty_range() {
        let found = find_free_port("127.0.0.1", 20000, 20000).await;
        assert!(matches!(
            found,
            Err(LaunchError::NoFreePort { start: 20000, end: 20000 })
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let request = LaunchRequest {
            port: 1,
            room_id: 0,
            game_id: 3,
            descriptor: LaunchDescriptor {
                program: "/nonexistent/match-server".to_string(),
                args: vec![],
            },
            lobby_addr: "127.0.0.1:14110".to_string(),
        };
        let result = ProcessLauncher.launch(&request);
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }

    #[test]
    fn test_recording_launcher() {
        let launcher = RecordingLauncher::new();
        let request = LaunchRequest {
            port: 16800,
            room_id: 2,
            game_id: 3,
            descriptor: LaunchDescriptor::default(),
            lobby_addr: "127.0.0.1:14110".to_string(),
        };
        launcher.launch(&request).unwrap();
        assert_eq!(launcher.launches(), vec![request.clone()]);
        assert_eq!(request.args(), vec!["--lobby", "127.0.0.1:14110", "16800", "2"]);
    }
}
