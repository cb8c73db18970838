use rand::Rng;
use serde::Serialize;
use std::ops::{Add, AddAssign};

/// Display names of the fixed player slots
pub const PLAYER_SLOTS: [&str; 3] = ["Alex", "Marie", "Julien"];

/// Per-slot points; round results and party totals share this shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundScores {
    pub slots: [u32; 3],
}

impl RoundScores {
    pub fn new(slots: [u32; 3]) -> Self {
        Self { slots }
    }

    /// Each slot gets 1, 2 or 3 points with equal probability
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            slots: std::array::from_fn(|_| rng.random_range(1..=3)),
        }
    }

    pub fn total(&self) -> u32 {
        self.slots.iter().sum()
    }
}

impl Add for RoundScores {
    type Output = RoundScores;

    fn add(self, other: RoundScores) -> RoundScores {
        RoundScores {
            slots: std::array::from_fn(|i| self.slots[i] + other.slots[i]),
        }
    }
}

impl AddAssign for RoundScores {
    fn add_assign(&mut self, other: RoundScores) {
        *self = *self + other;
    }
}
