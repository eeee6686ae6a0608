//! Grid generation.
//!
//! Every cell is drawn independently and uniformly from [`Symbol::ALL`].
//! The source is a trait so tests (and replays) can inject grids.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use tracing::debug;

use crate::types::{Grid, Symbol, REELS, ROWS};

/// Anything that can produce spin grids.
pub trait GridSource: Send {
    fn draw(&mut self) -> Grid;
}

// ---------------------------------------------------------------------------
// Random source
// ---------------------------------------------------------------------------

/// Uniform random grids backed by `StdRng`.
pub struct RandomGrid {
    rng: StdRng,
}

impl RandomGrid {
    /// Seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        debug!(seed, "Grid RNG seeded");
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when a seed is configured, entropy otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl GridSource for RandomGrid {
    fn draw(&mut self) -> Grid {
        let mut reels = [[Symbol::Diamond; ROWS]; REELS];
        for reel in reels.iter_mut() {
            for cell in reel.iter_mut() {
                *cell = Symbol::ALL[self.rng.random_range(0..Symbol::ALL.len())];
            }
        }
        Grid::new(reels)
    }
}

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

/// Replays queued grids in order, then falls back to a seeded random source.
pub struct ScriptedGrid {
    queue: VecDeque<Grid>,
    fallback: RandomGrid,
}

impl ScriptedGrid {
    pub fn new(grids: impl IntoIterator<Item = Grid>) -> Self {
        Self {
            queue: grids.into_iter().collect(),
            fallback: RandomGrid::seeded(0),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl GridSource for ScriptedGrid {
    fn draw(&mut self) -> Grid {
        match self.queue.pop_front() {
            Some(grid) => grid,
            None => self.fallback.draw(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
