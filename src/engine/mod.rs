//! Run Execution Engine
//!
//! The [`Engine`] owns the storage and evaluation seams and exposes the
//! whole run lifecycle:
//!
//! - [`Engine::create_run`] / [`Engine::start_run`]: admission-checked
//!   run creation ([`admission`])
//! - [`Engine::execute_run`]: drive one run until it suspends or
//!   finishes ([`executor`])
//! - [`Engine::trigger_flows`]: named-event fan-out ([`trigger_eval`])
//! - [`Engine::run_pending`]: drain every currently runnable run once
//!   (the body a periodic scheduler invokes)
//! - out-of-band terminations: cancel, abort, discard, error

pub mod admission;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod trigger_eval;

use std::sync::Arc;

use chrono::Utc;
use log::{error, info};

use crate::eval::{Evaluator, SimpleEvaluator};
use crate::flow::{Outcome, Run, SubjectRef};
use crate::store::FlowStore;

/// Step budget per `execute_run` invocation unless overridden.
pub const DEFAULT_MAX_HOT_LOOP: u32 = 1000;

/// Resume delay applied when a suspending action sets no deadline.
pub const DEFAULT_RESUME_DELAY_SECS: i64 = 60;

/// The run execution engine.
///
/// Cheap to share: hold it in an `Arc` and call it from any worker.
/// Execution of a single run is synchronous and single-threaded; the
/// store's claim protocol keeps two workers off the same run.
pub struct Engine {
    store: Arc<dyn FlowStore>,
    evaluator: Arc<dyn Evaluator>,
    max_hot_loop: u32,
}

impl Engine {
    /// Creates an engine over a store with the built-in evaluator.
    pub fn new(store: Arc<dyn FlowStore>) -> Self {
        Self {
            store,
            evaluator: Arc::new(SimpleEvaluator),
            max_hot_loop: DEFAULT_MAX_HOT_LOOP,
        }
    }

    /// Replaces the expression evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Sets the default hot-loop step budget.
    pub fn set_max_hot_loop(&mut self, max: u32) {
        self.max_hot_loop = max;
    }

    /// The storage seam.
    pub fn store(&self) -> &dyn FlowStore {
        self.store.as_ref()
    }

    /// The expression-evaluation seam.
    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    /// The default hot-loop step budget.
    pub fn max_hot_loop(&self) -> u32 {
        self.max_hot_loop
    }

    /// Executes every currently runnable run once and returns how many
    /// were picked up. The periodic scheduler calls this.
    pub fn run_pending(&self) -> usize {
        let runnable = self.store.runnable_runs(Utc::now());
        let mut executed = 0;
        for id in runnable {
            let Some(mut run) = self.store.run(id) else {
                continue;
            };
            match self.execute_run(&mut run) {
                Ok(()) => executed += 1,
                Err(e) => error!("failed to execute flow run {}: {}", id, e),
            }
        }
        executed
    }

    /// Cancels a run out-of-band. Returns false if it was already Done.
    pub fn cancel_run(&self, run: &mut Run) -> bool {
        self.terminate(run, Outcome::Canceled, None)
    }

    /// Aborts a run out-of-band.
    pub fn abort_run(&self, run: &mut Run) -> bool {
        self.terminate(run, Outcome::Aborted, None)
    }

    /// Discards a run: it no longer applies (outcome Obsolete).
    pub fn discard_run(&self, run: &mut Run) -> bool {
        self.terminate(run, Outcome::Obsolete, None)
    }

    /// Marks a run as errored with a log message.
    pub fn error_run(&self, run: &mut Run, message: &str) -> bool {
        self.terminate(run, Outcome::Errored, Some(message))
    }

    /// Cancels every non-Done run holding the given subject reference.
    /// Returns the number of runs cancelled.
    pub fn cancel_runs_for_subject(&self, subject: &SubjectRef) -> usize {
        let mut cancelled = 0;
        for id in self.store.runs_for_subject(subject) {
            let Some(mut run) = self.store.run(id) else {
                continue;
            };
            if self.cancel_run(&mut run) {
                cancelled += 1;
            }
        }
        cancelled
    }

    fn terminate(&self, run: &mut Run, outcome: Outcome, message: Option<&str>) -> bool {
        if run.is_done() {
            return false;
        }
        if let Some(message) = message {
            run.append_log(message);
        }
        run.finish(outcome);
        self.store.update_run(run);
        info!("Flow run {} finished out-of-band: {}", run.id, outcome);
        true
    }
}
