use crate::bag::SevenBag;
use crate::board::Board;
use crate::piece::{self, Shape};
use log::{debug, info};
use shared::{
    ActivePiece, InputEvent, MatchMessage, PieceKind, Request, SeatId, SeatResult, SeatView,
    UserId, PREVIEW_LEN,
};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// Points per lock keyed by simultaneous line count, before the level multiplier
pub const LINE_CLEAR_POINTS: [u64; 5] = [0, 40, 100, 300, 1200];
pub const SOFT_DROP_POINTS: u64 = 1;
pub const HARD_DROP_POINTS: u64 = 2;
pub const LINES_PER_LEVEL: u32 = 10;

/// Gravity interval per level in milliseconds; levels past the end use the floor
const DROP_INTERVALS_MS: [u64; 14] = [800, 717, 633, 550, 467, 383, 300, 217, 133, 100, 83, 67, 50, 33];
pub const MIN_DROP_INTERVAL_MS: u64 = 17;

pub fn drop_interval(level: u32) -> Duration {
    let ms = DROP_INTERVALS_MS
        .get(level as usize)
        .copied()
        .unwrap_or(MIN_DROP_INTERVAL_MS);
    Duration::from_millis(ms)
}

pub fn base_drop_interval() -> Duration {
    drop_interval(0)
}

pub fn line_clear_score(lines: u32, level: u32) -> u64 {
    let base = LINE_CLEAR_POINTS
        .get(lines as usize)
        .copied()
        .unwrap_or(LINE_CLEAR_POINTS[4]);
    base * (level as u64 + 1)
}

/// One of the two authoritative player slots
pub struct Seat {
    pub id: SeatId,
    pub name: String,
    pub user_id: Option<UserId>,
    pub board: Board,
    pub active: Option<ActivePiece>,
    pub next: VecDeque<PieceKind>,
    pub hold: Option<PieceKind>,
    pub can_hold: bool,
    pub score: u64,
    pub lines: u32,
    pub level: u32,
    pub alive: bool,
    bag: SevenBag,
    inputs: VecDeque<InputEvent>,
    last_gravity: Instant,
    last_input: Instant,
}

impl Seat {
    pub fn new(id: SeatId, name: String, user_id: Option<UserId>, seed: u64, now: Instant) -> Self {
        let mut bag = SevenBag::new(seed);
        let next = (&mut bag).take(PREVIEW_LEN).collect();

        Self {
            id,
            name,
            user_id,
            board: Board::new(),
            active: None,
            next,
            hold: None,
            can_hold: true,
            score: 0,
            lines: 0,
            level: 0,
            alive: true,
            bag,
            inputs: VecDeque::new(),
            last_gravity: now,
            last_input: now,
        }
    }

    fn draw(&mut self) -> PieceKind {
        // The bag is endless; the fallback only satisfies the type
        let kind = self.next.pop_front().unwrap_or(PieceKind::I);
        while self.next.len() < PREVIEW_LEN {
            if let Some(k) = self.bag.next() {
                self.next.push_back(k);
            }
        }
        kind
    }

    /// Puts `kind` at the spawn point; a blocked spawn tops the seat out
    fn spawn(&mut self, kind: PieceKind) {
        let piece = piece::spawn(kind);
        if self.board.collides(&piece.cells()) {
            self.top_out("spawn blocked");
        } else {
            self.active = Some(piece);
        }
    }

    pub fn ensure_active(&mut self) {
        if self.alive && self.active.is_none() {
            let kind = self.draw();
            self.spawn(kind);
        }
    }

    pub fn top_out(&mut self, reason: &str) {
        if self.alive {
            info!("Seat {} is out ({})", self.id, reason);
        }
        self.alive = false;
        self.active = None;
        self.inputs.clear();
    }

    pub fn enqueue_input(&mut self, event: InputEvent, now: Instant) {
        self.last_input = now;
        if self.alive {
            self.inputs.push_back(event);
        }
    }

    pub fn pending_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.last_input) > timeout
    }

    /// Moves the active piece if the target position is free
    fn try_shift(&mut self, dx: i32, dy: i32) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        let moved = active.shifted(dx, dy);
        if self.board.collides(&moved.cells()) {
            return false;
        }
        self.active = Some(moved);
        true
    }

    fn try_rotate(&mut self, clockwise: bool) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        let rotated = if clockwise {
            active.rotated_cw()
        } else {
            active.rotated_ccw()
        };
        if self.board.collides(&rotated.cells()) {
            return false;
        }
        self.active = Some(rotated);
        true
    }

    pub fn apply_input(&mut self, event: InputEvent) {
        if !self.alive {
            return;
        }
        self.ensure_active();
        if self.active.is_none() {
            return;
        }

        match event {
            InputEvent::MoveLeft => {
                self.try_shift(-1, 0);
            }
            InputEvent::MoveRight => {
                self.try_shift(1, 0);
            }
            InputEvent::RotateCw => {
                self.try_rotate(true);
            }
            InputEvent::RotateCcw => {
                self.try_rotate(false);
            }
            InputEvent::SoftDrop => {
                if self.try_shift(0, 1) {
                    self.score += SOFT_DROP_POINTS;
                } else {
                    self.lock();
                }
            }
            InputEvent::HardDrop => {
                let mut rows = 0;
                while self.try_shift(0, 1) {
                    rows += 1;
                }
                self.score += rows * HARD_DROP_POINTS;
                self.lock();
            }
            InputEvent::Hold => self.hold_piece(),
        }
    }

    fn hold_piece(&mut self) {
        if !self.can_hold {
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };

        match self.hold.replace(active.kind) {
            None => {
                let kind = self.draw();
                self.spawn(kind);
            }
            Some(held) => self.spawn(held),
        }
        self.can_hold = false;
    }

    /// Forces the active piece down one row, locking it when blocked
    pub fn gravity_step(&mut self) {
        if !self.alive {
            return;
        }
        self.ensure_active();
        if self.active.is_some() && !self.try_shift(0, 1) {
            self.lock();
        }
    }

    /// Writes the active piece into the board and evaluates line clears
    ///
    /// Scoring uses the level from before this lock's lines are counted. A
    /// piece that locks with any cell in the top row tops the seat out.
    fn lock(&mut self) -> u32 {
        let Some(active) = self.active.take() else {
            return 0;
        };
        let cells = active.cells();
        self.board.place(&cells, active.kind);

        let cleared = self.board.clear_full_rows();
        if cleared > 0 {
            self.score += line_clear_score(cleared, self.level);
            self.lines += cleared;
            let level = self.lines / LINES_PER_LEVEL;
            if level > self.level {
                info!("Seat {} reached level {}", self.id, level);
            }
            self.level = level;
            debug!("Seat {} cleared {} line(s)", self.id, cleared);
        }
        self.can_hold = true;

        if cells.iter().any(|&(_, y)| y <= piece::SPAWN_Y) {
            self.top_out("locked in the top row");
        } else {
            self.ensure_active();
        }
        cleared
    }

    pub fn drop_interval(&self) -> Duration {
        drop_interval(self.level)
    }

    /// Drains buffered inputs in arrival order, then applies gravity if due
    pub fn tick(&mut self, now: Instant) {
        while let Some(event) = self.inputs.pop_front() {
            self.apply_input(event);
        }

        if self.alive && now.duration_since(self.last_gravity) >= self.drop_interval() {
            self.gravity_step();
            self.last_gravity = now;
        }
    }

    pub fn view(&self) -> SeatView {
        SeatView {
            id: self.id,
            name: self.name.clone(),
            board: self.board.to_rows(),
            active: self.active,
            next: self.next.iter().copied().collect(),
            hold: self.hold,
            can_hold: self.can_hold,
            score: self.score,
            level: self.level,
            lines: self.lines,
            alive: self.alive,
        }
    }

    pub fn result(&self) -> SeatResult {
        SeatResult {
            user_id: self.user_id,
            score: self.score,
            level: self.level,
            lines: self.lines,
        }
    }
}

/// Final outcome of a match
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub reason: String,
    pub winner: Option<SeatId>,
    pub winner_user_id: Option<UserId>,
    pub result: BTreeMap<String, SeatResult>,
}

impl MatchOutcome {
    pub fn to_message(&self) -> MatchMessage {
        MatchMessage::GameOver {
            reason: self.reason.clone(),
            winner: self.winner,
            winner_user_id: self.winner_user_id,
            result: self.result.clone(),
        }
    }

    /// Result report envelope sent to the lobby
    pub fn report_request(&self, room_id: u64) -> Request {
        Request::new(
            "Game",
            "report",
            serde_json::json!({
                "room_id": room_id,
                "winner": self.winner_user_id,
                "result": self.result,
            }),
        )
    }
}

/// Authoritative state of one match
pub struct GameState {
    pub tick: u64,
    pub seed: u64,
    pub seats: BTreeMap<SeatId, Seat>,
    started: bool,
}

impl GameState {
    pub fn new(seed: u64) -> Self {
        Self {
            tick: 0,
            seed,
            seats: BTreeMap::new(),
            started: false,
        }
    }

    pub fn add_seat(&mut self, id: SeatId, name: String, user_id: Option<UserId>, now: Instant) {
        info!("Seat {} taken by {} (user {:?})", id, name, user_id);
        self.seats
            .insert(id, Seat::new(id, name, user_id, self.seed, now));
    }

    /// Binds the display name and backing account announced in `hello`
    pub fn identify_seat(&mut self, id: SeatId, name: String, user_id: Option<UserId>) {
        if let Some(seat) = self.seats.get_mut(&id) {
            seat.name = name;
            seat.user_id = user_id;
        }
    }

    pub fn remove_seat(&mut self, id: SeatId) {
        if self.seats.remove(&id).is_some() {
            info!("Seat {} released", id);
        }
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Spawns the first pieces and resets every seat's clocks
    pub fn start(&mut self, now: Instant) {
        self.started = true;
        for seat in self.seats.values_mut() {
            seat.last_gravity = now;
            seat.last_input = now;
            seat.ensure_active();
        }
    }

    pub fn enqueue_input(&mut self, id: SeatId, event: InputEvent, now: Instant) {
        if !self.started {
            return;
        }
        if let Some(seat) = self.seats.get_mut(&id) {
            seat.enqueue_input(event, now);
        }
    }

    /// A lost connection is an immediate loss for that seat
    pub fn mark_disconnected(&mut self, id: SeatId) {
        if let Some(seat) = self.seats.get_mut(&id) {
            seat.top_out("disconnected");
        }
    }

    /// Forces a loss on seats that produced no input within `timeout`
    pub fn expire_idle(&mut self, now: Instant, timeout: Duration) -> Vec<SeatId> {
        let mut expired = Vec::new();
        for seat in self.seats.values_mut() {
            if seat.alive && seat.is_idle(now, timeout) {
                seat.top_out("idle timeout");
                expired.push(seat.id);
            }
        }
        expired
    }

    pub fn update(&mut self, now: Instant) {
        if !self.started {
            return;
        }
        self.tick += 1;
        for seat in self.seats.values_mut() {
            seat.tick(now);
        }
    }

    pub fn alive_count(&self) -> usize {
        self.seats.values().filter(|s| s.alive).count()
    }

    pub fn is_finished(&self) -> bool {
        self.started && self.alive_count() == 0
    }

    pub fn snapshot(&self, server_ms: u64) -> MatchMessage {
        MatchMessage::Snapshot {
            server_ms,
            players: self.seats.values().map(Seat::view).collect(),
        }
    }

    /// Winner is the seat with the strictly highest score; ties have none
    pub fn outcome(&self) -> MatchOutcome {
        let best = self.seats.values().map(|s| s.score).max();
        let leaders: Vec<&Seat> = self
            .seats
            .values()
            .filter(|s| Some(s.score) == best)
            .collect();

        let (winner, winner_user_id) = match leaders.as_slice() {
            [only] => (Some(only.id), only.user_id),
            _ => (None, None),
        };

        MatchOutcome {
            reason: "both_dead".to_string(),
            winner,
            winner_user_id,
            result: self
                .seats
                .values()
                .map(|s| (format!("p{}", s.id), s.result()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{BOARD_HEIGHT, BOARD_WIDTH};

    fn seat() -> Seat {
        let mut seat = Seat::new(1, "P1".to_string(), Some(10), 99, Instant::now());
        seat.ensure_active();
        seat
    }

    fn with_active(seat: &mut Seat, kind: PieceKind, x: i32, y: i32, rot: usize) {
        seat.active = Some(ActivePiece { kind, x, y, rot });
    }

    /// Fills rows [from, BOARD_HEIGHT) except column `hole`
    fn fill_rows_with_hole(seat: &mut Seat, from: i32, hole: i32) {
        for y in from..BOARD_HEIGHT as i32 {
            for x in 0..BOARD_WIDTH as i32 {
                if x != hole {
                    seat.board.set(x, y, Some(PieceKind::O));
                }
            }
        }
    }

    #[test]
    fn test_drop_interval_decreases_then_floors() {
        for level in 0..(DROP_INTERVALS_MS.len() as u32) {
            assert!(drop_interval(level + 1) < drop_interval(level));
        }
        assert_eq!(drop_interval(14), Duration::from_millis(MIN_DROP_INTERVAL_MS));
        assert_eq!(drop_interval(99), Duration::from_millis(MIN_DROP_INTERVAL_MS));
        assert_eq!(base_drop_interval(), Duration::from_millis(800));
    }

    #[test]
    fn test_line_clear_score_table() {
        assert_eq!(line_clear_score(1, 0), 40);
        assert_eq!(line_clear_score(2, 0), 100);
        assert_eq!(line_clear_score(3, 0), 300);
        assert_eq!(line_clear_score(4, 0), 1200);
        assert_eq!(line_clear_score(4, 2), 3600);
    }

    #[test]
    fn test_new_seat_has_preview_and_spawns() {
        let seat = seat();
        assert_eq!(seat.next.len(), PREVIEW_LEN);
        let active = seat.active.unwrap();
        assert_eq!((active.x, active.y, active.rot), (piece::SPAWN_X, 0, 0));
    }

    #[test]
    fn test_move_blocked_by_wall() {
        let mut seat = seat();
        with_active(&mut seat, PieceKind::O, 0, 5, 0);
        seat.apply_input(InputEvent::MoveLeft);
        assert_eq!(seat.active.unwrap().x, 0);
        seat.apply_input(InputEvent::MoveRight);
        assert_eq!(seat.active.unwrap().x, 1);
    }

    #[test]
    fn test_rotation_rejected_without_wall_kick() {
        let mut seat = seat();
        // Vertical I against the right wall: rotating back to flat would leave the board
        with_active(&mut seat, PieceKind::I, 7, 5, 1);
        seat.apply_input(InputEvent::MoveRight);
        assert_eq!(seat.active.unwrap().x, 7);

        seat.apply_input(InputEvent::RotateCw);
        assert_eq!(seat.active.unwrap().rot, 1);
        seat.apply_input(InputEvent::RotateCcw);
        assert_eq!(seat.active.unwrap().rot, 1);
    }

    #[test]
    fn test_rotation_applies_when_free() {
        let mut seat = seat();
        with_active(&mut seat, PieceKind::T, 4, 8, 0);
        seat.apply_input(InputEvent::RotateCw);
        assert_eq!(seat.active.unwrap().rot, 1);
        seat.apply_input(InputEvent::RotateCcw);
        seat.apply_input(InputEvent::RotateCcw);
        assert_eq!(seat.active.unwrap().rot, 3);
    }

    #[test]
    fn test_soft_drop_scores_per_row() {
        let mut seat = seat();
        with_active(&mut seat, PieceKind::O, 4, 5, 0);
        seat.apply_input(InputEvent::SoftDrop);
        seat.apply_input(InputEvent::SoftDrop);
        assert_eq!(seat.active.unwrap().y, 7);
        assert_eq!(seat.score, 2 * SOFT_DROP_POINTS);
    }

    #[test]
    fn test_soft_drop_locks_when_blocked() {
        let mut seat = seat();
        with_active(&mut seat, PieceKind::O, 4, 18, 0);
        seat.apply_input(InputEvent::SoftDrop);
        assert_eq!(seat.board.get(4, 19), Some(PieceKind::O));
        assert_eq!(seat.score, 0);
        // A fresh piece replaces the locked one
        assert_eq!(seat.active.unwrap().y, 0);
    }

    #[test]
    fn test_hard_drop_scores_and_locks() {
        let mut seat = seat();
        with_active(&mut seat, PieceKind::O, 0, 2, 0);
        seat.apply_input(InputEvent::HardDrop);
        assert_eq!(seat.board.get(0, 19), Some(PieceKind::O));
        assert_eq!(seat.board.get(1, 18), Some(PieceKind::O));
        assert_eq!(seat.score, 16 * HARD_DROP_POINTS);
    }

    #[test]
    fn test_single_line_clear_at_level_zero() {
        let mut seat = seat();
        fill_rows_with_hole(&mut seat, 19, 0);
        // Vertical I in column 0 (cells at x offset 1, so anchor x = -1)
        with_active(&mut seat, PieceKind::I, -1, 10, 3);
        seat.gravity_step();
        while seat.active.map(|a| a.kind == PieceKind::I && a.x == -1).unwrap_or(false) {
            seat.gravity_step();
        }
        assert_eq!(seat.lines, 1);
        assert_eq!(seat.score, 40);
    }

    #[test]
    fn test_tetris_uses_level_before_clear() {
        let mut seat = seat();
        seat.lines = 8;
        seat.level = 0;
        fill_rows_with_hole(&mut seat, 16, 9);
        // Vertical I (rot 1 occupies x offset 2, rows -1..=2) dropped into column 9
        with_active(&mut seat, PieceKind::I, 7, 5, 1);
        seat.apply_input(InputEvent::HardDrop);

        assert_eq!(seat.lines, 12);
        assert_eq!(seat.level, 1);
        // 1200 * (0 + 1) plus hard drop rows: anchor from y=5 to y=17
        assert_eq!(seat.score, 1200 + 12 * HARD_DROP_POINTS);
    }

    #[test]
    fn test_level_multiplier_applies() {
        let mut seat = seat();
        seat.lines = 20;
        seat.level = 2;
        fill_rows_with_hole(&mut seat, 18, 4);
        // Vertical I column 4 covering rows 16..=19 after drop; clears 18 and 19
        with_active(&mut seat, PieceKind::I, 2, 14, 1);
        seat.apply_input(InputEvent::SoftDrop);
        assert_eq!(seat.score, SOFT_DROP_POINTS);
        seat.apply_input(InputEvent::HardDrop);
        assert_eq!(seat.lines, 22);
        assert_eq!(seat.score, SOFT_DROP_POINTS + 2 * HARD_DROP_POINTS + 100 * 3);
    }

    #[test]
    fn test_hold_stashes_then_swaps() {
        let mut seat = seat();
        let first = seat.active.unwrap().kind;
        let upcoming = seat.next[0];

        seat.apply_input(InputEvent::Hold);
        assert_eq!(seat.hold, Some(first));
        assert_eq!(seat.active.unwrap().kind, upcoming);
        assert!(!seat.can_hold);

        // Disabled until the next lock
        seat.apply_input(InputEvent::Hold);
        assert_eq!(seat.hold, Some(first));

        seat.apply_input(InputEvent::HardDrop);
        assert!(seat.can_hold);
        let current = seat.active.unwrap().kind;
        seat.apply_input(InputEvent::Hold);
        assert_eq!(seat.hold, Some(current));
        assert_eq!(seat.active.unwrap().kind, first);
    }

    #[test]
    fn test_lock_in_top_row_tops_out() {
        let mut seat = seat();
        for y in 2..BOARD_HEIGHT as i32 {
            seat.board.set(4, y, Some(PieceKind::Z));
        }
        with_active(&mut seat, PieceKind::O, 4, 0, 0);
        seat.gravity_step();
        assert!(!seat.alive);
        assert!(seat.active.is_none());

        // Terminal: nothing moves afterwards
        seat.apply_input(InputEvent::HardDrop);
        assert!(seat.active.is_none());
    }

    #[test]
    fn test_blocked_spawn_tops_out() {
        let mut seat = Seat::new(2, "P2".to_string(), None, 5, Instant::now());
        for y in 0..2 {
            for x in 0..BOARD_WIDTH as i32 - 1 {
                seat.board.set(x, y, Some(PieceKind::T));
            }
        }
        seat.ensure_active();
        assert!(!seat.alive);
    }

    #[test]
    fn test_inputs_drain_in_arrival_order() {
        let start = Instant::now();
        let mut seat = Seat::new(1, "P1".to_string(), None, 3, start);
        seat.ensure_active();
        with_active(&mut seat, PieceKind::O, 4, 5, 0);

        seat.enqueue_input(InputEvent::MoveLeft, start);
        seat.enqueue_input(InputEvent::MoveLeft, start);
        seat.enqueue_input(InputEvent::MoveRight, start);
        assert_eq!(seat.pending_inputs(), 3);

        seat.tick(start);
        assert_eq!(seat.pending_inputs(), 0);
        assert_eq!(seat.active.unwrap().x, 3);
        // Gravity not yet due
        assert_eq!(seat.active.unwrap().y, 5);
    }

    #[test]
    fn test_gravity_waits_for_interval() {
        let start = Instant::now();
        let mut seat = Seat::new(1, "P1".to_string(), None, 3, start);
        seat.ensure_active();

        seat.tick(start + Duration::from_millis(100));
        assert_eq!(seat.active.unwrap().y, 0);

        seat.tick(start + Duration::from_millis(800));
        assert_eq!(seat.active.unwrap().y, 1);

        // Clock restarts from the last gravity step
        seat.tick(start + Duration::from_millis(1000));
        assert_eq!(seat.active.unwrap().y, 1);
        seat.tick(start + Duration::from_millis(1600));
        assert_eq!(seat.active.unwrap().y, 2);
    }

    #[test]
    fn test_seats_fall_independently() {
        let start = Instant::now();
        let mut game = GameState::new(11);
        game.add_seat(1, "a".to_string(), Some(1), start);
        game.add_seat(2, "b".to_string(), Some(2), start);
        game.start(start);
        game.seats.get_mut(&2).unwrap().level = 9;

        game.update(start + Duration::from_millis(150));
        assert_eq!(game.seats[&1].active.unwrap().y, 0);
        assert_eq!(game.seats[&2].active.unwrap().y, 1);
    }

    #[test]
    fn test_both_seats_share_piece_sequence() {
        let start = Instant::now();
        let mut game = GameState::new(2024);
        game.add_seat(1, "a".to_string(), None, start);
        game.add_seat(2, "b".to_string(), None, start);
        assert_eq!(game.seats[&1].next, game.seats[&2].next);
    }

    #[test]
    fn test_inputs_ignored_before_start() {
        let start = Instant::now();
        let mut game = GameState::new(1);
        game.add_seat(1, "a".to_string(), None, start);
        game.enqueue_input(1, InputEvent::HardDrop, start);
        assert_eq!(game.seats[&1].pending_inputs(), 0);
    }

    #[test]
    fn test_higher_score_wins() {
        let start = Instant::now();
        let mut game = GameState::new(1);
        game.add_seat(1, "a".to_string(), Some(100), start);
        game.add_seat(2, "b".to_string(), Some(200), start);
        game.start(start);

        game.seats.get_mut(&1).unwrap().score = 100;
        game.seats.get_mut(&2).unwrap().score = 80;
        game.mark_disconnected(1);
        assert!(!game.is_finished());
        game.mark_disconnected(2);
        assert!(game.is_finished());

        let outcome = game.outcome();
        assert_eq!(outcome.winner, Some(1));
        assert_eq!(outcome.winner_user_id, Some(100));
        assert_eq!(outcome.result["p1"].score, 100);
        assert_eq!(outcome.result["p2"].user_id, Some(200));
    }

    #[test]
    fn test_tie_has_no_winner() {
        let start = Instant::now();
        let mut game = GameState::new(1);
        game.add_seat(1, "a".to_string(), Some(1), start);
        game.add_seat(2, "b".to_string(), Some(2), start);
        game.start(start);
        game.seats.get_mut(&1).unwrap().score = 50;
        game.seats.get_mut(&2).unwrap().score = 50;

        let outcome = game.outcome();
        assert_eq!(outcome.winner, None);
        assert_eq!(outcome.winner_user_id, None);
    }

    #[test]
    fn test_disconnect_then_top_out_ends_match() {
        let start = Instant::now();
        let mut game = GameState::new(77);
        game.add_seat(1, "a".to_string(), Some(1), start);
        game.add_seat(2, "b".to_string(), Some(2), start);
        game.start(start);

        game.mark_disconnected(2);
        assert_eq!(game.alive_count(), 1);

        let mut now = start;
        for _ in 0..200 {
            if game.is_finished() {
                break;
            }
            game.enqueue_input(1, InputEvent::HardDrop, now);
            game.update(now);
            now += Duration::from_millis(1);
        }

        assert!(game.is_finished());
        let outcome = game.outcome();
        assert_eq!(outcome.winner, Some(1));
        assert!(outcome.result["p1"].score > 0);
    }

    #[test]
    fn test_idle_seats_expire() {
        let start = Instant::now();
        let mut game = GameState::new(1);
        game.add_seat(1, "a".to_string(), None, start);
        game.add_seat(2, "b".to_string(), None, start);
        game.start(start);

        let later = start + Duration::from_secs(30);
        game.enqueue_input(1, InputEvent::MoveLeft, later);
        let expired = game.expire_idle(later, Duration::from_secs(10));
        assert_eq!(expired, vec![2]);
        assert!(game.seats[&1].alive);
    }

    #[test]
    fn test_report_request_shape() {
        let start = Instant::now();
        let mut game = GameState::new(1);
        game.add_seat(1, "a".to_string(), Some(7), start);
        game.add_seat(2, "b".to_string(), Some(8), start);
        game.seats.get_mut(&2).unwrap().score = 10;

        let req = game.outcome().report_request(42);
        assert_eq!(req.collection, "Game");
        assert_eq!(req.action, "report");
        assert_eq!(req.data["room_id"], 42);
        assert_eq!(req.data["winner"], 8);
        assert_eq!(req.data["result"]["p2"]["score"], 10);
    }

    #[test]
    fn test_snapshot_lists_seats_in_order() {
        let start = Instant::now();
        let mut game = GameState::new(1);
        game.add_seat(2, "b".to_string(), None, start);
        game.add_seat(1, "a".to_string(), None, start);

        match game.snapshot(5) {
            MatchMessage::Snapshot { server_ms, players } => {
                assert_eq!(server_ms, 5);
                let ids: Vec<_> = players.iter().map(|p| p.id).collect();
                assert_eq!(ids, vec![1, 2]);
            }
            _ => panic!("Unexpected message type"),
        }
    }
}
