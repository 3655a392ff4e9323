//! Lobby network layer: accepts client connections and serves requests

use crate::config::LobbyConfig;
use crate::gateway::Gateway;
use crate::handler::Lobby;
use crate::launcher::MatchLauncher;
use log::{debug, error, info, warn};
use shared::framing::read_frame_bytes;
use shared::{encode_frame, FrameError, Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

pub struct LobbyServer<G, L> {
    listener: TcpListener,
    local_addr: SocketAddr,
    lobby: Arc<Lobby<G, L>>,
}

impl<G: Gateway, L: MatchLauncher> LobbyServer<G, L> {
    /// Binds the listener; match processes report to `public_host` on the bound port
    pub async fn bind(config: LobbyConfig, gateway: G, launcher: L) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let report_addr = format!("{}:{}", config.public_host, local_addr.port());
        info!(
            "Lobby listening on {} (matches report to {})",
            local_addr, report_addr
        );

        let lobby = Arc::new(Lobby::new(config, gateway, launcher, report_addr));
        Ok(Self {
            listener,
            local_addr,
            lobby,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn lobby(&self) -> Arc<Lobby<G, L>> {
        Arc::clone(&self.lobby)
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let lobby = Arc::clone(&self.lobby);
                    tokio::spawn(async move {
                        serve_connection(lobby, stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Encodes a response, swapping in an error when the body would not fit a frame
fn encode_response(response: &Response) -> Result<Vec<u8>, FrameError> {
    match encode_frame(response) {
        Err(FrameError::Oversized(len)) => {
            warn!("Response of {} bytes does not fit in a frame", len);
            encode_frame(&Response::error("response too large"))
        }
        other => other,
    }
}

async fn serve_connection<G: Gateway, L: MatchLauncher>(
    lobby: Arc<Lobby<G, L>>,
    mut stream: TcpStream,
    addr: SocketAddr,
) {
    let mut session = lobby.open_session(addr);
    info!("Session {} opened from {}", session.id, addr);

    loop {
        let body = match read_frame_bytes(&mut stream).await {
            Ok(body) => body,
            Err(FrameError::Closed) => break,
            Err(e) => {
                warn!("Session {} framing error: {}", session.id, e);
                break;
            }
        };

        let response = match serde_json::from_slice::<Request>(&body) {
            Ok(request) => lobby.handle(&mut session, request).await,
            Err(e) => {
                debug!("Session {} sent a malformed request: {}", session.id, e);
                Response::error(format!("malformed request: {}", e))
            }
        };

        let frame = match encode_response(&response) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Session {} cannot encode response: {}", session.id, e);
                break;
            }
        };
        if let Err(e) = stream.write_all(&frame).await {
            debug!("Session {} write failed: {}", session.id, e);
            break;
        }
    }

    lobby.disconnect(&session).await;
    info!("Session {} from {} closed", session.id, addr);
}
