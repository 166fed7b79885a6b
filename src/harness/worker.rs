//! Worker: one thread stepping through the walk.
//!
//! # State machine
//!
//! ```text
//!            cross_step_gate (own thread)
//!   Running ─────────────────────────────▶ WaitingAtGate
//!      ▲                                        │
//!      └────────────── tap (coordinator) ───────┘
//!      │
//!      └── last step done / error ──▶ Terminated
//! ```
//!
//! The state lives inside the worker's own gate, so "is sleeping" only ever
//! changes under that gate's lock. The step counter is written only by the
//! worker thread, right after it is released.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use serde::Serialize;
use tracing::{debug, info};

use crate::work::{WorkContext, WorkSelector};

use super::error::{HarnessError, ProtocolViolation};
use super::gate::Gate;
use super::rendezvous::{Rendezvous, TraceEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// Awake, executing (or about to execute) a step
    Running,
    /// Blocked on its own gate until tapped
    WaitingAtGate,
    /// Thread function has returned
    Terminated,
}

impl WorkerState {
    #[inline]
    pub fn is_sleeping(&self) -> bool {
        matches!(self, WorkerState::WaitingAtGate)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Running => "RUNNING",
            WorkerState::WaitingAtGate => "WAITING_AT_GATE",
            WorkerState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-worker end-of-run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub id: usize,
    /// Payload executions performed
    pub executed: usize,
    pub last_step: i64,
    pub state: WorkerState,
}

pub struct Worker {
    id: usize,
    step: AtomicI64,
    gate: Gate<WorkerState>,
    /// Thread allowed to cross this worker's gate, bound when it starts
    owner: OnceLock<ThreadId>,
    /// Thread allowed to tap this worker's gate
    coordinator: ThreadId,
}

impl Worker {
    pub fn new(id: usize, coordinator: ThreadId) -> Self {
        Self {
            id,
            step: AtomicI64::new(-1),
            gate: Gate::new(WorkerState::Running),
            owner: OnceLock::new(),
            coordinator,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Last step this worker was released for; -1 before the first.
    #[inline]
    pub fn step(&self) -> i64 {
        self.step.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        *self.gate.lock()
    }

    /// Record the thread that owns this worker. Binding is permanent.
    pub fn bind_owner(&self, thread: ThreadId) -> Result<(), ProtocolViolation> {
        let owner = *self.owner.get_or_init(|| thread);
        if owner != thread {
            return Err(ProtocolViolation::ForeignCaller {
                worker: self.id,
                caller: thread,
                owner,
            });
        }
        Ok(())
    }

    fn verify_owner(&self, caller: ThreadId) -> Result<(), ProtocolViolation> {
        match self.owner.get() {
            None => Err(ProtocolViolation::UnboundOwner { worker: self.id }),
            Some(&owner) if owner != caller => Err(ProtocolViolation::ForeignCaller {
                worker: self.id,
                caller,
                owner,
            }),
            Some(_) => Ok(()),
        }
    }

    fn verify_alive(&self, state: WorkerState) -> Result<(), ProtocolViolation> {
        if state.is_terminal() {
            return Err(ProtocolViolation::DeadThread { worker: self.id });
        }
        Ok(())
    }

    fn verify_is_sleeping(&self, state: WorkerState, expected: bool) -> Result<(), ProtocolViolation> {
        if state.is_sleeping() != expected {
            return Err(ProtocolViolation::UnexpectedSleepState {
                worker: self.id,
                expected,
            });
        }
        Ok(())
    }

    /// Go to sleep at the step gate until the coordinator taps us.
    ///
    /// Only the owning thread may call this, and only while awake. Returns
    /// the step the worker has been released for.
    pub fn cross_step_gate(&self, caller: ThreadId, rendezvous: &Rendezvous) -> Result<i64, HarnessError> {
        {
            let mut state = self.gate.lock();
            self.verify_alive(*state)?;
            self.verify_owner(caller)?;
            self.verify_is_sleeping(*state, false)?;
            if rendezvous.shutdown.is_shutdown_requested() {
                return Err(HarnessError::Aborted { worker: self.id });
            }
            *state = WorkerState::WaitingAtGate;
        }

        debug!(worker = self.id, "Worker going to sleep");
        rendezvous.report_waiting();

        let state = self.gate.lock();
        let mut state = self.gate.wait_while(state, |s| {
            s.is_sleeping() && !rendezvous.shutdown.is_shutdown_requested()
        });
        if state.is_sleeping() {
            *state = WorkerState::Running;
            return Err(HarnessError::Aborted { worker: self.id });
        }
        drop(state);

        let step = self.step.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(worker = self.id, step, "Worker woke up");
        Ok(step)
    }

    /// Release this worker from its gate. Coordinator thread only.
    pub fn tap(&self, caller: ThreadId) -> Result<(), ProtocolViolation> {
        {
            let mut state = self.gate.lock();
            self.verify_alive(*state)?;
            if caller != self.coordinator {
                return Err(ProtocolViolation::ForeignCaller {
                    worker: self.id,
                    caller,
                    owner: self.coordinator,
                });
            }
            self.verify_is_sleeping(*state, true)?;

            debug!(worker = self.id, "Tapping worker");
            *state = WorkerState::Running;
            self.gate.notify_one();
        }
        // let the released thread run a bit
        thread::yield_now();
        Ok(())
    }

    /// Wake a sleeping worker so it can observe shutdown.
    pub(crate) fn release_for_shutdown(&self) {
        let _state = self.gate.lock();
        self.gate.notify_all();
    }

    pub(crate) fn mark_terminated(&self) {
        *self.gate.lock() = WorkerState::Terminated;
    }

    pub fn summary(&self, executed: usize) -> WorkerSummary {
        WorkerSummary {
            id: self.id,
            executed,
            last_step: self.step(),
            state: self.state(),
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("step", &self.step())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Marks the worker terminated and tells the coordinator, however the
/// thread function exits.
struct ExitGuard<'a> {
    worker: &'a Worker,
    rendezvous: &'a Rendezvous,
    clean: bool,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.worker.mark_terminated();
        self.rendezvous
            .report_exit(self.worker.id(), self.clean && !thread::panicking());
    }
}

/// Thread body: cross the gate, do one unit of work, repeat for `max_steps`.
///
/// Returns the number of payloads executed.
pub(crate) fn run_worker(
    worker: Arc<Worker>,
    rendezvous: Arc<Rendezvous>,
    selector: Arc<dyn WorkSelector>,
    max_steps: usize,
) -> Result<usize, HarnessError> {
    let mut guard = ExitGuard {
        worker: &worker,
        rendezvous: &rendezvous,
        clean: false,
    };

    let me = thread::current().id();
    worker.bind_owner(me)?;
    info!(worker = worker.id(), "Running worker thread");

    let last_step = max_steps as i64 - 1;
    let mut executed = 0usize;
    loop {
        let step = worker.cross_step_gate(me, &rendezvous)?;
        info!(step, worker = worker.id(), "Step started");

        let ctx = WorkContext {
            worker: worker.id(),
            step,
        };
        let selection = selector.do_work(&ctx)?;
        executed += 1;
        rendezvous.report_payload_done(TraceEntry {
            step,
            worker: worker.id(),
            index: selection.index,
            payload: selection.payload,
            outcome: selection.outcome,
        });

        if step >= last_step {
            break;
        }
    }

    guard.clean = true;
    Ok(executed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_until_sleeping(worker: &Worker, rv: &Rendezvous) {
        for _ in 0..1000 {
            if worker.state().is_sleeping() && rv.signal().rounds_arrived > 0 {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("worker {} never went to sleep", worker.id());
    }

    #[test]
    fn test_initial_state() {
        let worker = Worker::new(4, thread::current().id());
        assert_eq!(worker.id(), 4);
        assert_eq!(worker.step(), -1);
        assert_eq!(worker.state(), WorkerState::Running);
    }

    #[test]
    fn test_cross_from_foreign_thread_is_violation() {
        let rv = Rendezvous::new(1);
        let worker = Arc::new(Worker::new(0, thread::current().id()));

        let owner = {
            let worker = worker.clone();
            thread::spawn(move || {
                let me = thread::current().id();
                worker.bind_owner(me).unwrap();
                me
            })
            .join()
            .unwrap()
        };

        let err = worker.cross_step_gate(thread::current().id(), &rv).unwrap_err();
        match err {
            HarnessError::Protocol(ProtocolViolation::ForeignCaller { owner: o, .. }) => {
                assert_eq!(o, owner)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rv.waiting_count(), 0);
    }

    #[test]
    fn test_cross_before_bind_is_violation() {
        let rv = Rendezvous::new(1);
        let worker = Worker::new(0, thread::current().id());
        let err = worker.cross_step_gate(thread::current().id(), &rv).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Protocol(ProtocolViolation::UnboundOwner { worker: 0 })
        ));
    }

    #[test]
    fn test_rebinding_to_other_thread_fails() {
        let worker = Worker::new(0, thread::current().id());
        worker.bind_owner(thread::current().id()).unwrap();
        let other = thread::spawn(|| thread::current().id()).join().unwrap();
        assert!(worker.bind_owner(other).is_err());
    }

    #[test]
    fn test_tap_awake_worker_is_violation() {
        let worker = Worker::new(1, thread::current().id());
        assert_eq!(
            worker.tap(thread::current().id()),
            Err(ProtocolViolation::UnexpectedSleepState {
                worker: 1,
                expected: true
            })
        );
    }

    #[test]
    fn test_tap_dead_worker_is_violation() {
        let worker = Worker::new(1, thread::current().id());
        worker.mark_terminated();
        assert_eq!(
            worker.tap(thread::current().id()),
            Err(ProtocolViolation::DeadThread { worker: 1 })
        );
    }

    #[test]
    fn test_gate_round_trip() {
        let rv = Arc::new(Rendezvous::new(1));
        let worker = Arc::new(Worker::new(0, thread::current().id()));

        let sleeper = {
            let worker = worker.clone();
            let rv = rv.clone();
            thread::spawn(move || {
                let me = thread::current().id();
                worker.bind_owner(me).unwrap();
                worker.cross_step_gate(me, &rv)
            })
        };

        wait_until_sleeping(&worker, &rv);
        assert_eq!(rv.signal().rounds_arrived, 1);

        // only the coordinator thread may tap
        let foreign = {
            let worker = worker.clone();
            thread::spawn(move || worker.tap(thread::current().id()))
                .join()
                .unwrap()
        };
        assert!(matches!(foreign, Err(ProtocolViolation::ForeignCaller { .. })));

        worker.tap(thread::current().id()).unwrap();
        assert_eq!(sleeper.join().unwrap().unwrap(), 0);
        assert_eq!(worker.step(), 0);
        assert_eq!(worker.state(), WorkerState::Running);
    }

    #[test]
    fn test_shutdown_releases_sleeping_worker() {
        let rv = Arc::new(Rendezvous::new(1));
        let worker = Arc::new(Worker::new(0, thread::current().id()));

        let sleeper = {
            let worker = worker.clone();
            let rv = rv.clone();
            thread::spawn(move || {
                let me = thread::current().id();
                worker.bind_owner(me).unwrap();
                worker.cross_step_gate(me, &rv)
            })
        };

        wait_until_sleeping(&worker, &rv);
        rv.shutdown.request_shutdown();
        worker.release_for_shutdown();

        let err = sleeper.join().unwrap().unwrap_err();
        assert!(matches!(err, HarnessError::Aborted { worker: 0 }));
        assert_eq!(worker.step(), -1);
    }
}
