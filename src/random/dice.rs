//! Deterministic dice shared by the coordinator and every worker.
//!
//! A [`Dice`] must be seeded exactly once. Seeding first runs a self-test
//! against a freshly probed generator; if the generator does not replay the
//! known sequence for seed 0 the walk would not be reproducible, so seeding
//! fails instead.

use std::collections::VecDeque;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use super::mersenne::Mt19937;

/// Probe seed and the first three draws below 1000 it must produce.
const PROBE_SEED: u64 = 0;
const PROBE_BOUND: u32 = 1000;
const PROBE_EXPECTED: [u32; 3] = [864, 394, 776];

/// Dice sequencing / integrity errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiceError {
    #[error("Cannot seed the dice more than once")]
    AlreadySeeded,

    #[error("Cannot throw the dice before seeding it")]
    NotSeeded,

    #[error("Generator is not deterministic: seed 0 produced {observed:?}, expected [864, 394, 776]")]
    NonDeterministicGenerator { observed: [u32; 3] },

    #[error("Empty range [{min}, {max})")]
    EmptyRange { min: u32, max: u32 },

    #[error("Scripted draws exhausted")]
    Exhausted,

    #[error("Scripted value {value} is outside [0, {span}) for range [{min}, {max})")]
    ScriptOutOfRange {
        value: u32,
        span: u32,
        min: u32,
        max: u32,
    },
}

impl DiceError {
    pub fn code(&self) -> &'static str {
        match self {
            DiceError::AlreadySeeded => "ALREADY_SEEDED",
            DiceError::NotSeeded => "NOT_SEEDED",
            DiceError::NonDeterministicGenerator { .. } => "NON_DETERMINISTIC_GENERATOR",
            DiceError::EmptyRange { .. } => "EMPTY_RANGE",
            DiceError::Exhausted => "EXHAUSTED",
            DiceError::ScriptOutOfRange { .. } => "SCRIPT_OUT_OF_RANGE",
        }
    }
}

/// Source of deterministic draws.
///
/// The coordinator and the work selector only see this trait, so tests can
/// swap the seeded dice for a fixed script.
pub trait DrawSource: Send + Sync {
    /// Integer in `[min, max)`.
    fn throw_range(&self, min: u32, max: u32) -> Result<u32, DiceError>;

    /// Integer in `[0, max)`.
    fn throw(&self, max: u32) -> Result<u32, DiceError> {
        self.throw_range(0, max)
    }
}

/// Seeded, self-verifying deterministic random source.
#[derive(Debug, Default)]
pub struct Dice {
    rng: Mutex<Option<Mt19937>>,
}

impl Dice {
    /// Unseeded dice; every throw fails until [`Dice::seed`] succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and seed in one step, consuming the seed at construction.
    pub fn with_seed(seed: u64) -> Result<Self, DiceError> {
        let dice = Self::new();
        dice.seed(seed)?;
        Ok(dice)
    }

    /// Seed the dice. Fails if already seeded or if the self-test fails.
    pub fn seed(&self, seed: u64) -> Result<(), DiceError> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(DiceError::AlreadySeeded);
        }
        verify_generator()?;
        *slot = Some(Mt19937::new(seed));
        debug!(seed, "Dice seeded");
        Ok(())
    }

    pub fn is_seeded(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Mt19937>> {
        // A panic while holding this lock cannot leave the generator half-updated
        self.rng.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl DrawSource for Dice {
    fn throw_range(&self, min: u32, max: u32) -> Result<u32, DiceError> {
        let mut slot = self.lock();
        let rng = slot.as_mut().ok_or(DiceError::NotSeeded)?;
        if max <= min {
            return Err(DiceError::EmptyRange { min, max });
        }
        Ok(min + rng.below(max - min))
    }
}

/// Check that the generator replays the known sequence for the probe seed.
fn verify_generator() -> Result<(), DiceError> {
    let mut probe = Mt19937::new(PROBE_SEED);
    let observed = [
        probe.below(PROBE_BOUND),
        probe.below(PROBE_BOUND),
        probe.below(PROBE_BOUND),
    ];
    if observed != PROBE_EXPECTED {
        return Err(DiceError::NonDeterministicGenerator { observed });
    }
    Ok(())
}

/// Fixed sequence of draws, handed out in order.
///
/// Values are returned as-is (offset by `min`), so a script is written in
/// terms of "which branch should be taken". A value outside the requested
/// span is an error, not wrapped.
#[derive(Debug, Default)]
pub struct ScriptedDraws {
    values: Mutex<VecDeque<u32>>,
}

impl ScriptedDraws {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }
}

impl DrawSource for ScriptedDraws {
    fn throw_range(&self, min: u32, max: u32) -> Result<u32, DiceError> {
        if max <= min {
            return Err(DiceError::EmptyRange { min, max });
        }
        let next = self
            .values
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .pop_front()
            .ok_or(DiceError::Exhausted)?;
        let span = max - min;
        if next >= span {
            return Err(DiceError::ScriptOutOfRange {
                value: next,
                span,
                min,
                max,
            });
        }
        Ok(min + next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_0_replays_probe_sequence() {
        let dice = Dice::with_seed(0).unwrap();
        let values: Vec<u32> = (0..3).map(|_| dice.throw(1000).unwrap()).collect();
        assert_eq!(values, vec![864, 394, 776]);
    }

    #[test]
    fn test_seed_twice_fails() {
        let dice = Dice::new();
        dice.seed(1).unwrap();
        assert_eq!(dice.seed(1), Err(DiceError::AlreadySeeded));
        assert_eq!(dice.seed(2).unwrap_err().code(), "ALREADY_SEEDED");
    }

    #[test]
    fn test_throw_before_seed_fails() {
        let dice = Dice::new();
        assert!(!dice.is_seeded());
        assert_eq!(dice.throw(10), Err(DiceError::NotSeeded));
        assert_eq!(dice.throw_range(3, 10), Err(DiceError::NotSeeded));
    }

    /// The self-test probes a separate generator, so the real seed's stream
    /// starts from its first value.
    #[test]
    fn test_self_test_does_not_consume_real_stream() {
        let dice = Dice::with_seed(42).unwrap();
        let values: Vec<u32> = (0..5).map(|_| dice.throw(1000).unwrap()).collect();
        assert_eq!(values, vec![654, 114, 25, 759, 281]);
    }

    #[test]
    fn test_throw_range_offsets_by_min() {
        let dice = Dice::with_seed(1).unwrap();
        let values: Vec<u32> = (0..5).map(|_| dice.throw_range(5, 15).unwrap()).collect();
        assert_eq!(values, vec![7, 14, 6, 9, 6]);
    }

    #[test]
    fn test_empty_range_rejected() {
        let dice = Dice::with_seed(0).unwrap();
        assert_eq!(
            dice.throw_range(4, 4),
            Err(DiceError::EmptyRange { min: 4, max: 4 })
        );
        assert!(dice.throw(0).is_err());
    }

    #[test]
    fn test_scripted_draws_in_order() {
        let script = ScriptedDraws::new([1, 0, 2]);
        assert_eq!(script.throw(2), Ok(1));
        assert_eq!(script.throw(2), Ok(0));
        assert_eq!(script.throw_range(10, 20), Ok(12));
        assert_eq!(script.remaining(), 0);
        assert_eq!(script.throw(2), Err(DiceError::Exhausted));
    }

    #[test]
    fn test_scripted_value_outside_span_fails() {
        let script = ScriptedDraws::new([5, 1]);
        let err = script.throw(2).unwrap_err();
        assert_eq!(
            err,
            DiceError::ScriptOutOfRange {
                value: 5,
                span: 2,
                min: 0,
                max: 2
            }
        );
        assert_eq!(err.code(), "SCRIPT_OUT_OF_RANGE");
        // the bad value is consumed; the script carries on
        assert_eq!(script.throw(2), Ok(1));
    }
}
