//! Work payloads and the selector that picks one per step
//!
//! The harness never looks inside a payload. Each step a worker asks its
//! [`WorkSelector`] to do one unit of work; [`RandomWorkSelector`] draws an
//! index from a [`DrawSource`] and runs the payload registered there.
//!
//! # Components
//!
//! - [`store`] - `TableStore` seam and the in-memory store
//! - [`state`] - `WalkState`, the shared id range + store
//! - [`tasks`] - create-table / drop-table / add-data payloads

pub mod error;
pub mod state;
pub mod store;
pub mod tasks;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::random::DrawSource;

pub use error::WorkError;
pub use state::WalkState;
pub use store::{MemoryTableStore, StoreSnapshot, TableStore};
pub use tasks::{AddDataTask, CreateTableTask, DropTableTask, standard_payloads};

/// Who is doing the work, and for which step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkContext {
    pub worker: usize,
    pub step: i64,
}

/// Result of one payload execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkOutcome {
    Created { table: String },
    Dropped { table: String },
    DataAdded { table: String, speed: i32 },
    /// Nothing to act on (e.g. drop with no live table)
    Skipped { reason: &'static str },
}

impl fmt::Display for WorkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkOutcome::Created { table } => write!(f, "created {}", table),
            WorkOutcome::Dropped { table } => write!(f, "dropped {}", table),
            WorkOutcome::DataAdded { table, speed } => {
                write!(f, "added speed={} to {}", speed, table)
            }
            WorkOutcome::Skipped { reason } => write!(f, "skipped ({})", reason),
        }
    }
}

/// One unit of externally supplied work.
pub trait WorkPayload: Send + Sync {
    /// Stable name, recorded in the run trace.
    fn name(&self) -> &'static str;

    fn execute(&self, ctx: &WorkContext) -> Result<WorkOutcome, WorkError>;
}

/// What a selector picked and what came of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub payload: &'static str,
    pub outcome: WorkOutcome,
}

/// Chooses and runs one payload per invocation.
pub trait WorkSelector: Send + Sync {
    fn do_work(&self, ctx: &WorkContext) -> Result<Selection, WorkError>;
}

/// Selector drawing uniformly over a fixed, ordered set of payloads.
pub struct RandomWorkSelector {
    draws: Arc<dyn DrawSource>,
    payloads: Vec<Box<dyn WorkPayload>>,
}

impl RandomWorkSelector {
    pub fn new(draws: Arc<dyn DrawSource>, payloads: Vec<Box<dyn WorkPayload>>) -> Self {
        Self { draws, payloads }
    }

    pub fn payload_names(&self) -> Vec<&'static str> {
        self.payloads.iter().map(|p| p.name()).collect()
    }
}

impl WorkSelector for RandomWorkSelector {
    fn do_work(&self, ctx: &WorkContext) -> Result<Selection, WorkError> {
        if self.payloads.is_empty() {
            return Err(WorkError::NoPayloads);
        }
        let index = self.draws.throw(self.payloads.len() as u32)? as usize;
        let payload = &self.payloads[index];

        info!(step = ctx.step, worker = ctx.worker, payload = payload.name(), "Executing payload");
        let outcome = payload.execute(ctx)?;
        info!(step = ctx.step, worker = ctx.worker, %outcome, "Payload finished");

        Ok(Selection {
            index,
            payload: payload.name(),
            outcome,
        })
    }
}

impl fmt::Debug for RandomWorkSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomWorkSelector")
            .field("payloads", &self.payload_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedDraws;

    struct Named(&'static str);

    impl WorkPayload for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn execute(&self, _ctx: &WorkContext) -> Result<WorkOutcome, WorkError> {
            Ok(WorkOutcome::Skipped { reason: "test" })
        }
    }

    fn ctx() -> WorkContext {
        WorkContext { worker: 0, step: 0 }
    }

    #[test]
    fn test_selector_follows_draws() {
        let draws = Arc::new(ScriptedDraws::new([2, 0, 1, 2]));
        let selector = RandomWorkSelector::new(
            draws,
            vec![Box::new(Named("a")), Box::new(Named("b")), Box::new(Named("c"))],
        );

        let picked: Vec<&str> = (0..4)
            .map(|_| selector.do_work(&ctx()).unwrap().payload)
            .collect();
        assert_eq!(picked, vec!["c", "a", "b", "c"]);
    }

    #[test]
    fn test_empty_selector_fails() {
        let selector = RandomWorkSelector::new(Arc::new(ScriptedDraws::new([0])), Vec::new());
        assert!(matches!(selector.do_work(&ctx()), Err(WorkError::NoPayloads)));
    }

    #[test]
    fn test_exhausted_draws_surface_as_dice_error() {
        let selector = RandomWorkSelector::new(
            Arc::new(ScriptedDraws::new(Vec::<u32>::new())),
            vec![Box::new(Named("a"))],
        );
        let err = selector.do_work(&ctx()).unwrap_err();
        assert_eq!(err.code(), "EXHAUSTED");
    }
}
