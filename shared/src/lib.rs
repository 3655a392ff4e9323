use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod envelope;
pub mod framing;

pub use envelope::{Request, Response};
pub use framing::{encode_frame, read_frame, write_frame, FrameError, MAX_FRAME_LEN};

pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 20;
pub const PREVIEW_LEN: usize = 5;

/// Account id issued by the persistence gateway
pub type UserId = u64;

/// Seat number inside a match, always 1 or 2
pub type SeatId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    #[serde(rename = "L")]
    MoveLeft,
    #[serde(rename = "R")]
    MoveRight,
    #[serde(rename = "CW")]
    RotateCw,
    #[serde(rename = "CCW")]
    RotateCcw,
    #[serde(rename = "SD")]
    SoftDrop,
    #[serde(rename = "HD")]
    HardDrop,
    #[serde(rename = "HOLD")]
    Hold,
}

/// Falling piece: kind, rotation index and top-left anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePiece {
    pub kind: PieceKind,
    pub x: i32,
    pub y: i32,
    pub rot: usize,
}

/// Per-seat projection sent in every snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatView {
    pub id: SeatId,
    pub name: String,
    pub board: Vec<Vec<Option<PieceKind>>>,
    pub active: Option<ActivePiece>,
    pub next: Vec<PieceKind>,
    pub hold: Option<PieceKind>,
    pub can_hold: bool,
    pub score: u64,
    pub level: u32,
    pub lines: u32,
    pub alive: bool,
}

/// Final numbers for one seat, as reported to the lobby
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatResult {
    pub user_id: Option<UserId>,
    pub score: u64,
    pub level: u32,
    pub lines: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GravityInfo {
    pub drop_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMode {
    pub mode: String,
    pub seconds: Option<u64>,
}

/// Gameplay envelope exchanged between clients and a match server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchMessage {
    Hello {
        name: String,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    Welcome {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<SeatId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        observer_id: Option<u32>,
    },
    Start {
        seed: u64,
        bag_rule: String,
        gravity: GravityInfo,
        #[serde(rename = "match")]
        mode: MatchMode,
        t0_server_ms: u64,
    },
    Input {
        #[serde(default)]
        when_ms: u64,
        ev: InputEvent,
    },
    Snapshot {
        server_ms: u64,
        players: Vec<SeatView>,
    },
    GameOver {
        reason: String,
        winner: Option<SeatId>,
        winner_user_id: Option<UserId>,
        result: BTreeMap<String, SeatResult>,
    },
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
