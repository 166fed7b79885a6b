//! Lock-step worker harness
//!
//! A fixed pool of worker threads is driven through a fixed number of
//! steps. No worker starts step k+1 before every worker has finished step k,
//! and the order in which workers are released each step comes from the
//! seeded dice, so a run replays exactly from its seed.
//!
//! # Components
//!
//! - [`gate`] - mutex + condvar pair with predicate waits
//! - [`worker`] - per-thread state machine and thread body
//! - [`rendezvous`] - waiting counter, main gate, shutdown flag, trace
//! - [`coordinator`] - the run loop and wake-order construction
//! - [`error`] - protocol violations and run failures

pub mod coordinator;
pub mod error;
pub mod gate;
pub mod rendezvous;
pub mod worker;

pub use coordinator::{ReleaseMode, RoundRecord, RunReport, StepCoordinator, wake_order};
pub use error::{HarnessError, ProtocolViolation};
pub use gate::Gate;
pub use rendezvous::{MainSignal, Rendezvous, ShutdownSignal, TraceEntry};
pub use worker::{Worker, WorkerState, WorkerSummary};
