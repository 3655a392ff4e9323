//! Seven-bag piece generator
//!
//! Yields an endless stream of pieces, one shuffled permutation of all seven
//! kinds at a time. The only way to restart the stream is to build a new bag
//! from a seed.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::PieceKind;

pub struct SevenBag {
    rng: StdRng,
    pending: Vec<PieceKind>,
}

impl SevenBag {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            pending: Vec::with_capacity(PieceKind::ALL.len()),
        }
    }

    fn refill(&mut self) {
        let mut bag = PieceKind::ALL.to_vec();
        bag.shuffle(&mut self.rng);
        self.pending = bag;
    }
}

impl Iterator for SevenBag {
    type Item = PieceKind;

    fn next(&mut self) -> Option<PieceKind> {
        if self.pending.is_empty() {
            self.refill();
        }
        self.pending.pop()
    }
}
