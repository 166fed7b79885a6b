//! Deterministic randomness
//!
//! # Components
//!
//! - [`mersenne`] - bit-exact MT19937 replica
//! - [`dice`] - seeded-once dice with generator self-test, and the draw seam

pub mod dice;
pub mod mersenne;

pub use dice::{Dice, DiceError, DrawSource, ScriptedDraws};
pub use mersenne::Mt19937;
