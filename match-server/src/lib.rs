//! # Match Server Library
//!
//! Authoritative engine for a single two-player falling-block match. One
//! process runs exactly one match: it is launched by the lobby with a port and
//! a room id, serves two seats plus any number of observers, and exits after
//! reporting the outcome back to the lobby.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every piece movement, lock, line clear and score change happens here.
//! Clients only send input events and render the snapshots they receive.
//!
//! ### Connection Roles
//! The first two connections claim seats 1 and 2 and introduce themselves with
//! `hello`. Later connections become observers that only receive. A seat that
//! drops before the match is announced frees its slot; after that a dropped
//! seat simply loses.
//!
//! ### Result Reporting
//! When no seat is alive the engine broadcasts `game_over`, closes every
//! connection and submits a `Game/report` request to the lobby over a fresh
//! connection. A failed report is logged and never reopens the match.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns the [`game::GameState`] and the [`client_manager::ClientManager`].
//! Reader tasks forward decoded messages to it over a channel and writer tasks
//! drain per-connection outboxes, so the simulation never waits on a socket.
//!
//! ### Independent Seat Timing
//! Each seat keeps its own gravity clock and drop interval. Inputs are queued
//! as they arrive and drained in arrival order at the start of every tick.
//!
//! ## Module Organization
//!
//! ### Piece (`piece`) and Bag (`bag`)
//! Fixed rotation-state tables for the seven kinds and the seeded seven-bag
//! generator. Both seats draw from bags built from the same seed.
//!
//! ### Board (`board`)
//! The 10x20 grid with collision checks and row clearing.
//!
//! ### Game (`game`)
//! Per-seat state machine (spawn, fall, lock, clear, top-out), scoring and
//! level progression, snapshots and the final outcome.
//!
//! ### Client Manager (`client_manager`)
//! Seat and observer bookkeeping plus non-blocking broadcast.
//!
//! ### Network (`network`) and Report (`report`)
//! The TCP listener, the tick/snapshot loop and the lobby back-channel.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use match_server::config::MatchConfig;
//! use match_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MatchConfig {
//!         bind_addr: "0.0.0.0:16800".to_string(),
//!         room_id: 1,
//!         lobby_addr: Some("127.0.0.1:14110".to_string()),
//!         ..MatchConfig::default()
//!     };
//!
//!     // Runs until both seats are out, then reports to the lobby
//!     let outcome = Server::bind(config).await?.run().await;
//!     println!("winner: {:?}", outcome.winner);
//!     Ok(())
//! }
//! ```

pub mod bag;
pub mod board;
pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod piece;
pub mod report;

pub use config::MatchConfig;
pub use game::MatchOutcome;
pub use network::Server;
