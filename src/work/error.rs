//! Work Error Types

use thiserror::Error;

use crate::random::DiceError;

/// Errors raised while selecting or executing a work payload
#[derive(Error, Debug, Clone)]
pub enum WorkError {
    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Table store error: {0}")]
    Store(String),

    #[error("No payloads registered")]
    NoPayloads,

    #[error("Step {step} does not fit a speed column")]
    SpeedOutOfRange { step: i64 },
}

impl WorkError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkError::Dice(e) => e.code(),
            WorkError::Store(_) => "STORE_ERROR",
            WorkError::NoPayloads => "NO_PAYLOADS",
            WorkError::SpeedOutOfRange { .. } => "SPEED_OUT_OF_RANGE",
        }
    }
}
