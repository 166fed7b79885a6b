//! Harness Error Types
//!
//! A [`ProtocolViolation`] means a gate was used out of turn; it is fatal to
//! the thread that detects it. Everything else in [`HarnessError`] describes
//! why a run as a whole stopped.

use std::thread::ThreadId;
use std::time::Duration;

use thiserror::Error;

use crate::random::DiceError;
use crate::work::WorkError;

/// Broken worker-gate invariant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("worker {worker}: unexpected dead thread")]
    DeadThread { worker: usize },

    #[error("worker {worker}: called from {caller:?}, only {owner:?} may do this")]
    ForeignCaller {
        worker: usize,
        caller: ThreadId,
        owner: ThreadId,
    },

    #[error("worker {worker}: gate crossed before the owning thread was bound")]
    UnboundOwner { worker: usize },

    #[error("worker {worker}: unexpected sleep status (expected sleeping={expected})")]
    UnexpectedSleepState { worker: usize, expected: bool },
}

impl ProtocolViolation {
    pub fn worker(&self) -> usize {
        match self {
            ProtocolViolation::DeadThread { worker }
            | ProtocolViolation::ForeignCaller { worker, .. }
            | ProtocolViolation::UnboundOwner { worker }
            | ProtocolViolation::UnexpectedSleepState { worker, .. } => *worker,
        }
    }
}

/// Harness error types
#[derive(Error, Debug, Clone)]
pub enum HarnessError {
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Work error: {0}")]
    Work(#[from] WorkError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Barrier broken at step {step}: worker {worker} is at step {observed}")]
    BarrierBroken {
        step: i64,
        worker: usize,
        observed: i64,
    },

    #[error("Barrier timed out at step {step} after {timeout:?}: {waiting}/{expected} workers waiting")]
    BarrierTimeout {
        step: i64,
        timeout: Duration,
        waiting: usize,
        expected: usize,
    },

    #[error("Worker {worker} failed: {source}")]
    WorkerFailed {
        worker: usize,
        source: Box<HarnessError>,
    },

    #[error("Worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("Worker {worker} exited before the run finished")]
    WorkerExited { worker: usize },

    #[error("Worker {worker} aborted by shutdown")]
    Aborted { worker: usize },

    #[error("Failed to spawn worker {worker}: {reason}")]
    Spawn { worker: usize, reason: String },
}

impl HarnessError {
    /// Get the error code for logs and reports
    pub fn code(&self) -> &'static str {
        match self {
            HarnessError::Protocol(_) => "PROTOCOL_VIOLATION",
            HarnessError::Dice(e) => e.code(),
            HarnessError::Work(e) => e.code(),
            HarnessError::InvalidConfig(_) => "INVALID_CONFIG",
            HarnessError::BarrierBroken { .. } => "BARRIER_BROKEN",
            HarnessError::BarrierTimeout { .. } => "BARRIER_TIMEOUT",
            HarnessError::WorkerFailed { .. } => "WORKER_FAILED",
            HarnessError::WorkerPanicked { .. } => "WORKER_PANICKED",
            HarnessError::WorkerExited { .. } => "WORKER_EXITED",
            HarnessError::Aborted { .. } => "ABORTED",
            HarnessError::Spawn { .. } => "SPAWN_FAILED",
        }
    }

    /// Whether the root cause is a broken gate protocol, looking through
    /// worker failure wrappers.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            HarnessError::Protocol(_) => true,
            HarnessError::WorkerFailed { source, .. } => source.is_protocol_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let violation = ProtocolViolation::DeadThread { worker: 2 };
        assert_eq!(violation.worker(), 2);
        let err: HarnessError = violation.into();
        assert_eq!(err.code(), "PROTOCOL_VIOLATION");
        assert_eq!(HarnessError::from(DiceError::NotSeeded).code(), "NOT_SEEDED");
    }

    #[test]
    fn test_protocol_violation_seen_through_worker_failure() {
        let err = HarnessError::WorkerFailed {
            worker: 1,
            source: Box::new(
                ProtocolViolation::UnexpectedSleepState {
                    worker: 1,
                    expected: false,
                }
                .into(),
            ),
        };
        assert!(err.is_protocol_violation());
        assert!(!HarnessError::WorkerPanicked { worker: 1 }.is_protocol_violation());
    }
}
