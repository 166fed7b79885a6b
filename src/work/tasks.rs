//! Table payloads: create, drop, add data.

use std::sync::Arc;

use tracing::info;

use super::error::WorkError;
use super::state::WalkState;
use super::{WorkContext, WorkOutcome, WorkPayload};

pub struct CreateTableTask {
    state: Arc<WalkState>,
}

impl CreateTableTask {
    pub fn new(state: Arc<WalkState>) -> Self {
        Self { state }
    }
}

impl WorkPayload for CreateTableTask {
    fn name(&self) -> &'static str {
        "create_table"
    }

    fn execute(&self, _ctx: &WorkContext) -> Result<WorkOutcome, WorkError> {
        let table = self.state.create_next()?;
        info!(%table, "Created a table");
        Ok(WorkOutcome::Created { table })
    }
}

pub struct DropTableTask {
    state: Arc<WalkState>,
}

impl DropTableTask {
    pub fn new(state: Arc<WalkState>) -> Self {
        Self { state }
    }
}

impl WorkPayload for DropTableTask {
    fn name(&self) -> &'static str {
        "drop_table"
    }

    fn execute(&self, _ctx: &WorkContext) -> Result<WorkOutcome, WorkError> {
        match self.state.drop_oldest()? {
            Some(table) => {
                info!(%table, "Dropped a table");
                Ok(WorkOutcome::Dropped { table })
            }
            None => {
                info!("Cannot find a table to drop, skipping");
                Ok(WorkOutcome::Skipped {
                    reason: "no live table",
                })
            }
        }
    }
}

/// Writes one row into the newest live table; the row's speed is the step.
pub struct AddDataTask {
    state: Arc<WalkState>,
}

impl AddDataTask {
    pub fn new(state: Arc<WalkState>) -> Self {
        Self { state }
    }
}

impl WorkPayload for AddDataTask {
    fn name(&self) -> &'static str {
        "add_data"
    }

    fn execute(&self, ctx: &WorkContext) -> Result<WorkOutcome, WorkError> {
        let speed =
            i32::try_from(ctx.step).map_err(|_| WorkError::SpeedOutOfRange { step: ctx.step })?;
        match self.state.insert_newest(speed)? {
            Some(table) => {
                info!(%table, speed, "Added some data");
                Ok(WorkOutcome::DataAdded { table, speed })
            }
            None => {
                info!("No table to add data to, skipping");
                Ok(WorkOutcome::Skipped {
                    reason: "no live table",
                })
            }
        }
    }
}

/// The three table payloads in their canonical order.
///
/// The order is part of the reproducible selection sequence: draw 0 creates,
/// 1 drops, 2 adds data.
pub fn standard_payloads(state: &Arc<WalkState>) -> Vec<Box<dyn WorkPayload>> {
    vec![
        Box::new(CreateTableTask::new(state.clone())),
        Box::new(DropTableTask::new(state.clone())),
        Box::new(AddDataTask::new(state.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::store::MemoryTableStore;

    fn setup() -> (Arc<MemoryTableStore>, Arc<WalkState>) {
        let store = Arc::new(MemoryTableStore::new());
        let state = Arc::new(WalkState::new(store.clone()));
        (store, state)
    }

    fn ctx(step: i64) -> WorkContext {
        WorkContext { worker: 0, step }
    }

    #[test]
    fn test_drop_on_empty_is_skipped() {
        let (store, state) = setup();
        let outcome = DropTableTask::new(state).execute(&ctx(0)).unwrap();
        assert!(matches!(outcome, WorkOutcome::Skipped { .. }));
        assert_eq!(store.snapshot().dropped, 0);
    }

    #[test]
    fn test_add_data_on_empty_is_skipped() {
        let (store, state) = setup();
        let outcome = AddDataTask::new(state).execute(&ctx(3)).unwrap();
        assert!(matches!(outcome, WorkOutcome::Skipped { .. }));
        assert_eq!(store.snapshot().rows_inserted, 0);
    }

    #[test]
    fn test_create_drop_oldest_first() {
        let (store, state) = setup();
        let create = CreateTableTask::new(state.clone());
        let dropper = DropTableTask::new(state.clone());

        create.execute(&ctx(0)).unwrap();
        create.execute(&ctx(0)).unwrap();
        assert_eq!(
            dropper.execute(&ctx(1)).unwrap(),
            WorkOutcome::Dropped {
                table: "table_1".to_string()
            }
        );
        assert_eq!(store.snapshot().live_tables, vec!["table_2".to_string()]);
    }

    #[test]
    fn test_add_data_targets_newest_table() {
        let (store, state) = setup();
        let create = CreateTableTask::new(state.clone());
        create.execute(&ctx(0)).unwrap();
        create.execute(&ctx(0)).unwrap();

        let outcome = AddDataTask::new(state).execute(&ctx(4)).unwrap();
        assert_eq!(
            outcome,
            WorkOutcome::DataAdded {
                table: "table_2".to_string(),
                speed: 4
            }
        );
        assert_eq!(store.rows("table_2"), Some(vec![4]));
        assert_eq!(store.rows("table_1"), Some(vec![]));
    }

    #[test]
    fn test_add_data_rejects_step_beyond_i32() {
        let (store, state) = setup();
        CreateTableTask::new(state.clone()).execute(&ctx(0)).unwrap();

        let step = i64::from(i32::MAX) + 1;
        let err = AddDataTask::new(state).execute(&ctx(step)).unwrap_err();
        assert!(matches!(err, WorkError::SpeedOutOfRange { step: s } if s == step));
        assert_eq!(err.code(), "SPEED_OUT_OF_RANGE");
        assert_eq!(store.snapshot().rows_inserted, 0);
    }

    #[test]
    fn test_standard_payload_order() {
        let (_store, state) = setup();
        let names: Vec<&str> = standard_payloads(&state).iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["create_table", "drop_table", "add_data"]);
    }
}
