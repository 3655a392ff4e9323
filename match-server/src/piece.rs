//! Piece shapes and their fixed rotation-state tables

use shared::{ActivePiece, PieceKind};

/// Board coordinate as (column, row), row 0 at the top
pub type Cell = (i32, i32);

pub const SPAWN_X: i32 = 3;
pub const SPAWN_Y: i32 = 0;

const I_STATES: [[Cell; 4]; 4] = [
    [(0, 0), (1, 0), (2, 0), (3, 0)],
    [(2, -1), (2, 0), (2, 1), (2, 2)],
    [(0, 1), (1, 1), (2, 1), (3, 1)],
    [(1, -1), (1, 0), (1, 1), (1, 2)],
];

const O_STATES: [[Cell; 4]; 1] = [[(0, 0), (1, 0), (0, 1), (1, 1)]];

const T_STATES: [[Cell; 4]; 4] = [
    [(1, 0), (0, 1), (1, 1), (2, 1)],
    [(1, 0), (1, 1), (2, 1), (1, 2)],
    [(0, 1), (1, 1), (2, 1), (1, 2)],
    [(1, 0), (0, 1), (1, 1), (1, 2)],
];

const L_STATES: [[Cell; 4]; 4] = [
    [(0, 0), (0, 1), (0, 2), (1, 2)],
    [(0, 1), (1, 1), (2, 1), (0, 2)],
    [(0, 0), (1, 0), (1, 1), (1, 2)],
    [(2, 0), (0, 1), (1, 1), (2, 1)],
];

const J_STATES: [[Cell; 4]; 4] = [
    [(1, 0), (1, 1), (1, 2), (0, 2)],
    [(0, 0), (0, 1), (1, 1), (2, 1)],
    [(0, 0), (1, 0), (0, 1), (0, 2)],
    [(0, 1), (1, 1), (2, 1), (2, 2)],
];

const S_STATES: [[Cell; 4]; 4] = [
    [(1, 0), (2, 0), (0, 1), (1, 1)],
    [(1, 0), (1, 1), (2, 1), (2, 2)],
    [(1, 1), (2, 1), (0, 2), (1, 2)],
    [(0, 0), (0, 1), (1, 1), (1, 2)],
];

const Z_STATES: [[Cell; 4]; 4] = [
    [(0, 0), (1, 0), (1, 1), (2, 1)],
    [(2, 0), (1, 1), (2, 1), (1, 2)],
    [(0, 1), (1, 1), (1, 2), (2, 2)],
    [(1, 0), (0, 1), (1, 1), (0, 2)],
];

/// Rotation states for a kind, in clockwise order
pub fn rotation_states(kind: PieceKind) -> &'static [[Cell; 4]] {
    match kind {
        PieceKind::I => &I_STATES,
        PieceKind::O => &O_STATES,
        PieceKind::T => &T_STATES,
        PieceKind::L => &L_STATES,
        PieceKind::J => &J_STATES,
        PieceKind::S => &S_STATES,
        PieceKind::Z => &Z_STATES,
    }
}

pub fn spawn(kind: PieceKind) -> ActivePiece {
    ActivePiece {
        kind,
        x: SPAWN_X,
        y: SPAWN_Y,
        rot: 0,
    }
}

/// Geometry helpers for the falling piece
pub trait Shape: Sized {
    /// Absolute board cells covered by the piece
    fn cells(&self) -> [Cell; 4];
    fn shifted(&self, dx: i32, dy: i32) -> Self;
    fn rotated_cw(&self) -> Self;
    fn rotated_ccw(&self) -> Self;
}

impl Shape for ActivePiece {
    fn cells(&self) -> [Cell; 4] {
        let states = rotation_states(self.kind);
        let offsets = states[self.rot % states.len()];
        offsets.map(|(dx, dy)| (self.x + dx, self.y + dy))
    }

    fn shifted(&self, dx: i32, dy: i32) -> Self {
        ActivePiece {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    fn rotated_cw(&self) -> Self {
        let count = rotation_states(self.kind).len();
        ActivePiece {
            rot: (self.rot + 1) % count,
            ..*self
        }
    }

    fn rotated_ccw(&self) -> Self {
        let count = rotation_states(self.kind).len();
        ActivePiece {
            rot: (self.rot + count - 1) % count,
            ..*self
        }
    }
}
