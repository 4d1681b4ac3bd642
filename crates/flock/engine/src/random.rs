//! Injected randomness
//!
//! Every random decision in the engine goes through a [`RandomSource`], so a
//! test can replay an exact sequence of draws.

use flock_types::Odds;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

pub trait RandomSource: Send + Sync {
    /// Draw once against `odds`
    fn roll(&mut self, odds: Odds) -> bool;

    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// `StdRng`-backed source
pub struct SeededSource {
    rng: StdRng,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl RandomSource for SeededSource {
    fn roll(&mut self, odds: Odds) -> bool {
        if odds.denominator == 0 || odds.numerator == 0 {
            return false;
        }
        if odds.numerator >= odds.denominator {
            return true;
        }
        self.rng.gen_ratio(odds.numerator, odds.denominator)
    }

    fn pick(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

/// Replays scripted outcomes, then falls back to `false` / `0`
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    rolls: VecDeque<bool>,
    picks: VecDeque<usize>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rolls(mut self, rolls: impl IntoIterator<Item = bool>) -> Self {
        self.rolls.extend(rolls);
        self
    }

    pub fn with_picks(mut self, picks: impl IntoIterator<Item = usize>) -> Self {
        self.picks.extend(picks);
        self
    }

    /// Outcomes not yet consumed
    pub fn remaining(&self) -> (usize, usize) {
        (self.rolls.len(), self.picks.len())
    }
}

impl RandomSource for ScriptedSource {
    fn roll(&mut self, _odds: Odds) -> bool {
        self.rolls.pop_front().unwrap_or(false)
    }

    fn pick(&mut self, len: usize) -> usize {
        let index = self.picks.pop_front().unwrap_or(0);
        index.min(len.saturating_sub(1))
    }
}
