//! random_walk - Deterministic Lock-Step Random Walk
//!
//! A fixed pool of worker threads walks through a configured number of
//! steps. Each step every worker runs one randomly chosen payload (create a
//! table, drop a table, add data), and no worker starts the next step until
//! all have finished the current one. Everything random, including the order
//! in which workers are released each step, comes from one seed.
//!
//! # Modules
//!
//! - [`random`] - MT19937 replica and the seeded-once dice
//! - [`id_alloc`] - contiguous FIFO id range for table numbers
//! - [`work`] - payloads, the random selector, table stores
//! - [`harness`] - gates, workers and the step coordinator
//! - [`persistence`] - TDengine table store
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod harness;
pub mod id_alloc;
pub mod logging;
pub mod persistence;
pub mod random;
pub mod work;

// Convenient re-exports at crate root
pub use harness::{
    HarnessError, ProtocolViolation, ReleaseMode, RunReport, StepCoordinator, WorkerState,
};
pub use id_alloc::SequentialIdAllocator;
pub use random::{Dice, DiceError, DrawSource, ScriptedDraws};
pub use work::{
    MemoryTableStore, RandomWorkSelector, TableStore, WalkState, WorkError, WorkPayload,
    WorkSelector, standard_payloads,
};
