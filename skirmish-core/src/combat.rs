//! Twenty-sided combat rolls with exact outcome probabilities

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Faces on the die
pub const DIE_FACES: i32 = 20;

/// Categorical result of a roll
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollOutcome {
    Miss,
    Hit,
    Crit,
}

impl RollOutcome {
    /// All outcomes, in branching order
    pub const ALL: [RollOutcome; 3] = [RollOutcome::Miss, RollOutcome::Hit, RollOutcome::Crit];

    /// Damage multiplier applied to the base damage
    pub fn damage_multiplier(self) -> i32 {
        match self {
            RollOutcome::Miss => 0,
            RollOutcome::Hit => 1,
            RollOutcome::Crit => 2,
        }
    }

    /// Probability of this outcome for a given bonus and difficulty
    pub fn probability(self, bonus: i32, difficulty: i32) -> f64 {
        let faces = match self {
            RollOutcome::Crit => 1,
            RollOutcome::Hit => hit_faces(difficulty - bonus),
            // Natural 1 plus every non-crit face below the threshold
            RollOutcome::Miss => DIE_FACES - 1 - hit_faces(difficulty - bonus),
        };
        f64::from(faces) / f64::from(DIE_FACES)
    }
}

/// Faces in [max(2, threshold), 19]
fn hit_faces(threshold: i32) -> i32 {
    let low = threshold.max(2);
    (DIE_FACES - low).max(0)
}

/// Outcome of one roll and the chance it had
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roll {
    pub outcome: RollOutcome,
    pub probability: f64,
}

impl Roll {
    fn new(outcome: RollOutcome, bonus: i32, difficulty: i32) -> Self {
        Self {
            outcome,
            probability: outcome.probability(bonus, difficulty),
        }
    }
}

/// Read a natural die face against a threshold
pub fn classify(face: i32, bonus: i32, difficulty: i32) -> RollOutcome {
    match face {
        f if f >= DIE_FACES => RollOutcome::Crit,
        f if f <= 1 => RollOutcome::Miss,
        f if f >= difficulty - bonus => RollOutcome::Hit,
        _ => RollOutcome::Miss,
    }
}

// ============================================================================
// RESOLVERS
// ============================================================================

/// Source of roll outcomes
pub trait Resolver {
    fn roll(&mut self, bonus: i32, difficulty: i32) -> Roll;
}

/// Rolls a real die
#[derive(Clone, Debug)]
pub struct DiceResolver<R: Rng = ChaCha8Rng> {
    rng: R,
}

impl DiceResolver<ChaCha8Rng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> DiceResolver<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> Resolver for DiceResolver<R> {
    fn roll(&mut self, bonus: i32, difficulty: i32) -> Roll {
        let face = self.rng.gen_range(1..=DIE_FACES);
        Roll::new(classify(face, bonus, difficulty), bonus, difficulty)
    }
}

/// Always yields the same outcome, reporting the chance it would have had
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedResolver(pub RollOutcome);

impl Resolver for FixedResolver {
    fn roll(&mut self, bonus: i32, difficulty: i32) -> Roll {
        Roll::new(self.0, bonus, difficulty)
    }
}
