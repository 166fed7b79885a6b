//! State shared between the coordinator and every worker thread.
//!
//! - `waiting`: how many workers have reached the gate this round. Reset to
//!   0 under its own lock, before the main gate is signalled.
//! - `main_gate`: monotonically increasing counters the coordinator waits on,
//!   so it can never miss or double-count a round.
//! - `shutdown`: set once when a run is being torn down.
//! - `trace`: ordered record of every payload execution.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::debug;

use crate::work::WorkOutcome;

use super::gate::Gate;

/// Signal for graceful shutdown
#[derive(Debug)]
pub struct ShutdownSignal {
    shutdown: AtomicBool,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// What the coordinator waits on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MainSignal {
    /// Completed "all workers waiting" rounds, including the initial one
    pub rounds_arrived: u64,
    /// Payload executions finished, over the whole run
    pub payloads_done: u64,
    /// Worker threads that have exited
    pub exited: usize,
    /// First worker to exit abnormally
    pub failed: Option<usize>,
}

/// One payload execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub step: i64,
    pub worker: usize,
    /// Drawn payload index
    pub index: usize,
    pub payload: &'static str,
    pub outcome: WorkOutcome,
}

#[derive(Debug)]
pub struct Rendezvous {
    num_workers: usize,
    waiting: Mutex<usize>,
    main_gate: Gate<MainSignal>,
    pub shutdown: ShutdownSignal,
    trace: Mutex<Vec<TraceEntry>>,
}

impl Rendezvous {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            waiting: Mutex::new(0),
            main_gate: Gate::new(MainSignal::default()),
            shutdown: ShutdownSignal::new(),
            trace: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn main_gate(&self) -> &Gate<MainSignal> {
        &self.main_gate
    }

    /// Workers currently counted as waiting in this round.
    pub fn waiting_count(&self) -> usize {
        *self.waiting.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Count one more worker at the gate; the last one wakes the coordinator.
    pub fn report_waiting(&self) {
        let all_arrived = {
            let mut waiting = self.waiting.lock().unwrap_or_else(|poison| poison.into_inner());
            *waiting += 1;
            if *waiting == self.num_workers {
                *waiting = 0;
                true
            } else {
                false
            }
        };

        if all_arrived {
            debug!("All workers are now waiting");
            let mut signal = self.main_gate.lock();
            signal.rounds_arrived += 1;
            self.main_gate.notify_all();
        }
    }

    pub fn report_payload_done(&self, entry: TraceEntry) {
        self.trace
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(entry);
        let mut signal = self.main_gate.lock();
        signal.payloads_done += 1;
        self.main_gate.notify_all();
    }

    pub fn report_exit(&self, worker: usize, clean: bool) {
        let mut signal = self.main_gate.lock();
        signal.exited += 1;
        if !clean && signal.failed.is_none() {
            signal.failed = Some(worker);
        }
        self.main_gate.notify_all();
    }

    pub fn signal(&self) -> MainSignal {
        self.main_gate.lock().clone()
    }

    pub fn take_trace(&self) -> Vec<TraceEntry> {
        std::mem::take(&mut *self.trace.lock().unwrap_or_else(|poison| poison.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_arrival_resets_counter_and_signals_once() {
        let rv = Rendezvous::new(3);
        rv.report_waiting();
        rv.report_waiting();
        assert_eq!(rv.waiting_count(), 2);
        assert_eq!(rv.signal().rounds_arrived, 0);

        rv.report_waiting();
        assert_eq!(rv.waiting_count(), 0);
        assert_eq!(rv.signal().rounds_arrived, 1);

        rv.report_waiting();
        assert_eq!(rv.signal().rounds_arrived, 1);
    }

    #[test]
    fn test_first_failure_is_kept() {
        let rv = Rendezvous::new(2);
        rv.report_exit(0, true);
        rv.report_exit(1, false);
        let signal = rv.signal();
        assert_eq!(signal.exited, 2);
        assert_eq!(signal.failed, Some(1));
    }

    #[test]
    fn test_trace_in_report_order() {
        let rv = Rendezvous::new(1);
        for step in 0..3 {
            rv.report_payload_done(TraceEntry {
                step,
                worker: 0,
                index: 0,
                payload: "noop",
                outcome: WorkOutcome::Skipped { reason: "test" },
            });
        }
        assert_eq!(rv.signal().payloads_done, 3);
        let steps: Vec<i64> = rv.take_trace().iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![0, 1, 2]);
    }
}
