use crate::piece::Cell;
use shared::{PieceKind, BOARD_HEIGHT, BOARD_WIDTH};

type Row = [Option<PieceKind>; BOARD_WIDTH];

/// 10x20 playfield, row 0 at the top
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    rows: Vec<Row>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            rows: vec![[None; BOARD_WIDTH]; BOARD_HEIGHT],
        }
    }

    pub fn get(&self, x: i32, y: i32) -> Option<PieceKind> {
        if !Self::in_bounds(x, y) {
            return None;
        }
        self.rows[y as usize][x as usize]
    }

    pub fn set(&mut self, x: i32, y: i32, kind: Option<PieceKind>) {
        if Self::in_bounds(x, y) {
            self.rows[y as usize][x as usize] = kind;
        }
    }

    fn in_bounds(x: i32, y: i32) -> bool {
        (0..BOARD_WIDTH as i32).contains(&x) && (0..BOARD_HEIGHT as i32).contains(&y)
    }

    /// True if any cell is out of bounds or already occupied
    pub fn collides(&self, cells: &[Cell]) -> bool {
        cells
            .iter()
            .any(|&(x, y)| !Self::in_bounds(x, y) || self.rows[y as usize][x as usize].is_some())
    }

    pub fn place(&mut self, cells: &[Cell], kind: PieceKind) {
        for &(x, y) in cells {
            self.set(x, y, Some(kind));
        }
    }

    /// Removes full rows, refills from the top, returns how many were cleared
    pub fn clear_full_rows(&mut self) -> u32 {
        self.rows.retain(|row| !row.iter().all(Option::is_some));
        let cleared = BOARD_HEIGHT - self.rows.len();
        for _ in 0..cleared {
            self.rows.insert(0, [None; BOARD_WIDTH]);
        }
        cleared as u32
    }

    pub fn to_rows(&self) -> Vec<Vec<Option<PieceKind>>> {
        self.rows.iter().map(|row| row.to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_row(board: &mut Board, y: i32) {
        for x in 0..BOARD_WIDTH as i32 {
            board.set(x, y, Some(PieceKind::O));
        }
    }

    #[test]
    fn test_bounds_count_as_collisions() {
        let board = Board::new();
        assert!(board.collides(&[(-1, 5)]));
        assert!(board.collides(&[(10, 5)]));
        assert!(board.collides(&[(4, 20)]));
        assert!(board.collides(&[(4, -1)]));
        assert!(!board.collides(&[(0, 0), (9, 19)]));
    }

    #[test]
    fn test_occupied_cells_collide() {
        let mut board = Board::new();
        board.set(4, 10, Some(PieceKind::T));
        assert!(board.collides(&[(3, 10), (4, 10)]));
        assert!(!board.collides(&[(3, 10), (5, 10)]));
    }

    #[test]
    fn test_clear_single_row_shifts_rows_above_down() {
        let mut board = Board::new();
        fill_row(&mut board, 19);
        board.set(2, 18, Some(PieceKind::S));

        assert_eq!(board.clear_full_rows(), 1);
        assert_eq!(board.get(2, 19), Some(PieceKind::S));
        assert_eq!(board.get(2, 18), None);
        assert!(board.to_rows()[0].iter().all(Option::is_none));
    }

    #[test]
    fn test_clear_non_adjacent_rows() {
        let mut board = Board::new();
        fill_row(&mut board, 19);
        fill_row(&mut board, 17);
        board.set(0, 18, Some(PieceKind::J));
        board.set(5, 16, Some(PieceKind::L));

        assert_eq!(board.clear_full_rows(), 2);
        assert_eq!(board.get(0, 19), Some(PieceKind::J));
        assert_eq!(board.get(5, 18), Some(PieceKind::L));
        assert_eq!(board.to_rows().len(), BOARD_HEIGHT);
    }

    #[test]
    fn test_partial_rows_are_kept() {
        let mut board = Board::new();
        for x in 0..9 {
            board.set(x, 19, Some(PieceKind::I));
        }
        assert_eq!(board.clear_full_rows(), 0);
        assert_eq!(board.get(0, 19), Some(PieceKind::I));
    }
}
