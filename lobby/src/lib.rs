//! # Lobby Library
//!
//! Session and room orchestration for the block-falling game backend. The
//! lobby is the single authority for who is online, which rooms exist and who
//! sits in them. Accounts and match results live in an external persistence
//! service that the lobby reaches through a [`gateway::Gateway`].
//!
//! ## Core Responsibilities
//!
//! ### Presence
//! A successful `User/create` or `User/login` binds the account to the calling
//! connection. Closing the connection logs the account out again, closes any
//! room it hosts and drops its invites.
//!
//! ### Rooms and Invites
//! Rooms move `space -> full -> ready -> play`. Hosts create, ready, start,
//! kick and close; guests join, flag themselves ready and leave. Invites are
//! queued per invitee and accepting one runs the regular join.
//!
//! ### Match Launch
//! Starting a room probes a free port, spawns a match-engine process through a
//! [`launcher::MatchLauncher`] and hands the match address back to the host.
//! The match later reports its outcome with `Game/report`, which the lobby
//! forwards to persistence.
//!
//! ## Architecture Design
//!
//! ### One Task Per Connection
//! Every connection runs a read-handle-write loop on its own task. Requests on
//! one connection are answered strictly in order.
//!
//! ### Transactional Registry
//! The [`registry::Registry`] sits behind a `tokio::sync::RwLock`. Each
//! registry mutation is one synchronous method call made while the write guard
//! is held, so no request can observe a half-applied change. Gateway calls and
//! port probing happen outside the guard.
//!
//! ## Module Organization
//!
//! ### Room (`room`) and Registry (`registry`)
//! The room state machine and the presence/room/invite tables.
//!
//! ### Handler (`handler`)
//! Request dispatch, authorization and the response shapes.
//!
//! ### Gateway (`gateway`), Launcher (`launcher`) and Catalog (`catalog`)
//! The collaborators: persistence, match processes and the game list.
//!
//! ### Network (`network`) and Config (`config`)
//! The TCP listener and the TOML configuration.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use lobby::config::LobbyConfig;
//! use lobby::gateway::MemoryGateway;
//! use lobby::launcher::ProcessLauncher;
//! use lobby::network::LobbyServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server =
//!         LobbyServer::bind(LobbyConfig::default(), MemoryGateway::new(), ProcessLauncher).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod launcher;
pub mod network;
pub mod registry;
pub mod room;

pub use config::LobbyConfig;
pub use error::LobbyError;
pub use handler::{Lobby, Session};
pub use network::LobbyServer;
