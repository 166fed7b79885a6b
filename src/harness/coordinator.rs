//! Step Coordinator
//!
//! Drives N workers through M lock-stepped rounds:
//!
//! ```text
//!  main thread                         worker threads
//!  ───────────                         ──────────────
//!  spawn N workers ──────────────────▶ bind owner, cross gate (step -1)
//!  wait: all N waiting ◀────────────── report_waiting (last one signals)
//!  global step += 1
//!  wake order = coin flips
//!  tap w[o0] ────────────────────────▶ step += 1, do_work, report done
//!  (synchronous: wait for done)
//!  tap w[o1] ...
//!  ... repeat M rounds ...
//!  join all ◀───────────────────────── last step done, return
//! ```
//!
//! The wake order for a round is built by visiting worker ids in ascending
//! order and, per id, flipping a coin: 1 appends it, 0 puts it at the front.
//! This exact construction (not a uniform shuffle) is what replays across
//! runs for a given seed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::random::{DiceError, DrawSource};
use crate::work::WorkSelector;

use super::error::HarnessError;
use super::rendezvous::{MainSignal, Rendezvous, TraceEntry};
use super::worker::{Worker, WorkerSummary, run_worker};

/// How workers are released within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    /// Tap one worker, wait until its payload is done, tap the next.
    /// Payloads never overlap; the whole run replays from the seed.
    #[default]
    Synchronous,
    /// Tap, yield, tap the next. Payloads may overlap within a round;
    /// wake orders still replay, payload order may not.
    Overlapped,
}

/// One completed barrier round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRecord {
    pub step: i64,
    pub wake_order: Vec<usize>,
}

/// Result of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workers: usize,
    pub steps: usize,
    /// Global step after the run; equals `steps`
    pub final_step: i64,
    pub release_mode: ReleaseMode,
    pub rounds: Vec<RoundRecord>,
    pub trace: Vec<TraceEntry>,
    pub summaries: Vec<WorkerSummary>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn wake_orders(&self) -> Vec<Vec<usize>> {
        self.rounds.iter().map(|r| r.wake_order.clone()).collect()
    }

    /// `(step, worker, payload)` in execution order.
    pub fn selections(&self) -> Vec<(i64, usize, &'static str)> {
        self.trace
            .iter()
            .map(|e| (e.step, e.worker, e.payload))
            .collect()
    }

    pub fn total_executed(&self) -> usize {
        self.summaries.iter().map(|s| s.executed).sum()
    }
}

/// Build one round's wake order from `num_workers` coin flips.
pub fn wake_order(draws: &dyn DrawSource, num_workers: usize) -> Result<Vec<usize>, DiceError> {
    let mut order = VecDeque::with_capacity(num_workers);
    for id in 0..num_workers {
        if draws.throw(2)? == 1 {
            order.push_back(id);
        } else {
            order.push_front(id);
        }
    }
    Ok(order.into())
}

struct WorkerHandle {
    worker: Arc<Worker>,
    thread: JoinHandle<Result<usize, HarnessError>>,
}

/// Barrier-synchronized worker pool
pub struct StepCoordinator {
    num_workers: usize,
    max_steps: usize,
    release_mode: ReleaseMode,
    barrier_timeout: Option<Duration>,
    draws: Arc<dyn DrawSource>,
    selector: Arc<dyn WorkSelector>,
    /// -1 until the first round starts
    global_step: i64,
}

impl StepCoordinator {
    pub fn new(
        num_workers: usize,
        max_steps: usize,
        draws: Arc<dyn DrawSource>,
        selector: Arc<dyn WorkSelector>,
    ) -> Result<Self, HarnessError> {
        if num_workers == 0 {
            return Err(HarnessError::InvalidConfig(
                "worker count must be positive".to_string(),
            ));
        }
        if max_steps == 0 {
            return Err(HarnessError::InvalidConfig(
                "step count must be positive".to_string(),
            ));
        }
        Ok(Self {
            num_workers,
            max_steps,
            release_mode: ReleaseMode::default(),
            barrier_timeout: None,
            draws,
            selector,
            global_step: -1,
        })
    }

    pub fn with_release_mode(mut self, mode: ReleaseMode) -> Self {
        self.release_mode = mode;
        self
    }

    /// Bound every wait of the main thread. `None` waits forever.
    pub fn with_barrier_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.barrier_timeout = timeout;
        self
    }

    #[inline]
    pub fn global_step(&self) -> i64 {
        self.global_step
    }

    /// Run all rounds on the calling thread, which becomes the only thread
    /// allowed to tap workers. Blocks until every worker has been joined.
    pub fn run(mut self) -> Result<RunReport, HarnessError> {
        let started = Instant::now();
        let me = thread::current().id();
        let rendezvous = Arc::new(Rendezvous::new(self.num_workers));

        let mut workers = Vec::with_capacity(self.num_workers);
        for id in 0..self.num_workers {
            match self.spawn_worker(id, me, &rendezvous) {
                Ok(handle) => workers.push(handle),
                Err(e) => return Err(self.abort(&rendezvous, workers, e)),
            }
        }
        info!(
            workers = self.num_workers,
            steps = self.max_steps,
            mode = ?self.release_mode,
            "Stepping thread pool started"
        );

        let mut rounds = Vec::with_capacity(self.max_steps);
        if let Err(cause) = self.drive(me, &rendezvous, &workers, &mut rounds) {
            let err = self.abort(&rendezvous, workers, cause);
            error!(
                step = self.global_step,
                code = err.code(),
                protocol_violation = err.is_protocol_violation(),
                error = %err,
                "Run failed"
            );
            return Err(err);
        }

        let mut summaries = Vec::with_capacity(self.num_workers);
        for handle in workers {
            let id = handle.worker.id();
            match handle.thread.join() {
                Ok(Ok(executed)) => summaries.push(handle.worker.summary(executed)),
                Ok(Err(e)) => {
                    return Err(HarnessError::WorkerFailed {
                        worker: id,
                        source: Box::new(e),
                    });
                }
                Err(_) => return Err(HarnessError::WorkerPanicked { worker: id }),
            }
        }
        self.global_step = self.max_steps as i64;

        let report = RunReport {
            workers: self.num_workers,
            steps: self.max_steps,
            final_step: self.global_step,
            release_mode: self.release_mode,
            rounds,
            trace: rendezvous.take_trace(),
            summaries,
            elapsed: started.elapsed(),
        };
        info!(
            executed = report.total_executed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "All workers finished"
        );
        Ok(report)
    }

    fn spawn_worker(
        &self,
        id: usize,
        coordinator: ThreadId,
        rendezvous: &Arc<Rendezvous>,
    ) -> Result<WorkerHandle, HarnessError> {
        let worker = Arc::new(Worker::new(id, coordinator));
        let thread = {
            let worker = worker.clone();
            let rendezvous = rendezvous.clone();
            let selector = self.selector.clone();
            let max_steps = self.max_steps;
            thread::Builder::new()
                .name(format!("walker-{}", id))
                .spawn(move || run_worker(worker, rendezvous, selector, max_steps))
                .map_err(|e| HarnessError::Spawn {
                    worker: id,
                    reason: e.to_string(),
                })?
        };
        Ok(WorkerHandle { worker, thread })
    }

    fn drive(
        &mut self,
        me: ThreadId,
        rendezvous: &Rendezvous,
        workers: &[WorkerHandle],
        rounds: &mut Vec<RoundRecord>,
    ) -> Result<(), HarnessError> {
        let mut rounds_seen = 0u64;
        let mut payloads_expected = 0u64;

        for _ in 0..self.max_steps {
            debug!("Main thread going to sleep");
            let signal = self.await_signal(rendezvous, |s| s.rounds_arrived > rounds_seen)?;
            rounds_seen = signal.rounds_arrived;
            debug!(step = self.global_step, "Main thread woke up");

            self.verify_barrier(workers)?;
            self.global_step += 1;

            let order = wake_order(self.draws.as_ref(), self.num_workers)?;
            info!(step = self.global_step, ?order, "Waking up workers");
            for &id in &order {
                workers[id].worker.tap(me).map_err(|violation| {
                    error!(worker = violation.worker(), %violation, "Tap refused");
                    violation
                })?;
                if self.release_mode == ReleaseMode::Synchronous {
                    payloads_expected += 1;
                    self.await_signal(rendezvous, |s| s.payloads_done >= payloads_expected)?;
                }
            }

            rounds.push(RoundRecord {
                step: self.global_step,
                wake_order: order,
            });
        }
        Ok(())
    }

    /// After a main-gate wake every worker must sit at the current step.
    fn verify_barrier(&self, workers: &[WorkerHandle]) -> Result<(), HarnessError> {
        for handle in workers {
            let observed = handle.worker.step();
            if observed != self.global_step {
                return Err(HarnessError::BarrierBroken {
                    step: self.global_step,
                    worker: handle.worker.id(),
                    observed,
                });
            }
        }
        Ok(())
    }

    /// Sleep on the main gate until `ready` holds or a worker dies.
    fn await_signal<F>(&self, rendezvous: &Rendezvous, mut ready: F) -> Result<MainSignal, HarnessError>
    where
        F: FnMut(&MainSignal) -> bool,
    {
        let gate = rendezvous.main_gate();
        let guard = gate.lock();
        let blocked = |s: &mut MainSignal| s.failed.is_none() && !ready(&*s);

        let guard = match self.barrier_timeout {
            None => gate.wait_while(guard, blocked),
            Some(timeout) => {
                let (guard, timed_out) = gate.wait_timeout_while(guard, timeout, blocked);
                if timed_out {
                    drop(guard);
                    return Err(HarnessError::BarrierTimeout {
                        step: self.global_step,
                        timeout,
                        waiting: rendezvous.waiting_count(),
                        expected: self.num_workers,
                    });
                }
                guard
            }
        };

        if let Some(worker) = guard.failed {
            return Err(HarnessError::WorkerExited { worker });
        }
        Ok(guard.clone())
    }

    /// Tear the pool down after a failure and return the most precise error.
    ///
    /// Sleeping workers are woken into shutdown and joined. After a timeout,
    /// workers that are still busy are left detached rather than joined.
    fn abort(
        &self,
        rendezvous: &Rendezvous,
        workers: Vec<WorkerHandle>,
        cause: HarnessError,
    ) -> HarnessError {
        rendezvous.shutdown.request_shutdown();
        for handle in &workers {
            handle.worker.release_for_shutdown();
        }

        let timed_out = matches!(cause, HarnessError::BarrierTimeout { .. });
        let failed_worker = match &cause {
            HarnessError::WorkerExited { worker } => Some(*worker),
            _ => None,
        };
        let mut resolved = cause;

        for handle in workers {
            let id = handle.worker.id();
            if timed_out && !handle.thread.is_finished() {
                warn!(worker = id, state = %handle.worker.state(), "Leaving wedged worker detached");
                continue;
            }
            match handle.thread.join() {
                Ok(Ok(_)) | Ok(Err(HarnessError::Aborted { .. })) => {}
                Ok(Err(e)) if failed_worker == Some(id) => {
                    resolved = HarnessError::WorkerFailed {
                        worker: id,
                        source: Box::new(e),
                    };
                }
                Ok(Err(e)) => error!(worker = id, error = %e, "Worker failed during shutdown"),
                Err(_) if failed_worker == Some(id) => {
                    resolved = HarnessError::WorkerPanicked { worker: id };
                }
                Err(_) => error!(worker = id, "Worker panicked during shutdown"),
            }
        }
        resolved
    }
}

impl std::fmt::Debug for StepCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepCoordinator")
            .field("num_workers", &self.num_workers)
            .field("max_steps", &self.max_steps)
            .field("release_mode", &self.release_mode)
            .field("barrier_timeout", &self.barrier_timeout)
            .field("global_step", &self.global_step)
            .finish_non_exhaustive()
    }
}
