//! Run Executor
//!
//! Drives one run until it suspends or finishes: validates the resume
//! state, claims the run at the store, resolves the subject, then
//! interprets the traversal table one step at a time, dispatching each
//! node to its registered action.
//!
//! Error containment: everything that goes wrong while invoking an
//! action (missing registration, evaluation failure, directive decode
//! failure, any other action error) terminates only the current run —
//! outcome `Errored`, one log line with the error kind and message —
//! and the caller of [`Engine::execute_run`] still sees `Ok`. Only
//! caller-usage errors (malformed Waiting records, unknown flows)
//! propagate.

use chrono::{Duration, Utc};
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::action::registry::lookup_action;
use crate::action::{ActionCtx, Directive};
use crate::flow::{Flow, Outcome, Run, RunStatus};
use crate::store::FlowStore;

use super::cursor::{self, Cursor, Next, Phase};
use super::error::{ActionError, EngineError};
use super::{Engine, DEFAULT_RESUME_DELAY_SECS};

impl Engine {
    /// Executes a run with the engine's default hot-loop budget.
    ///
    /// The run is mutated in place and written back to the store on
    /// every exit path that changed it.
    pub fn execute_run(&self, run: &mut Run) -> Result<(), EngineError> {
        self.execute_run_with(run, self.max_hot_loop())
    }

    /// Executes a run with an explicit hot-loop budget.
    pub fn execute_run_with(&self, run: &mut Run, max_hot_loop: u32) -> Result<(), EngineError> {
        // Resume-state validation. A Done run is a benign scheduler
        // race; malformed Waiting records are caller bugs.
        match run.status {
            RunStatus::Done => {
                warn!("Flow run {} is not in a valid state to execute", run.id);
                return Ok(());
            }
            RunStatus::Waiting => {
                if run.continue_after.is_none() {
                    return Err(EngineError::WaitingWithoutDeadline);
                }
                if run.node.is_none() {
                    return Err(EngineError::WaitingWithoutNode);
                }
            }
            RunStatus::Pending => {}
        }

        // Not yet due.
        if run.status == RunStatus::Waiting {
            if let Some(continue_after) = run.continue_after {
                if continue_after > Utc::now() {
                    debug!(
                        "Flow run {} is not due until {}",
                        run.id, continue_after
                    );
                    return Ok(());
                }
            }
        }

        let flow = self
            .store()
            .flow(run.flow)
            .ok_or(EngineError::UnknownFlow(run.flow))?;

        if !self.store().claim_run(run.id) {
            warn!("Flow run {} is already being executed", run.id);
            return Ok(());
        }

        self.drive(run, &flow, max_hot_loop);
        self.store().update_run(run);
        self.store().release_run(run.id);
        Ok(())
    }

    fn drive(&self, run: &mut Run, flow: &Flow, max_hot_loop: u32) {
        // Resolve the subject before touching any node; a vanished
        // entity obsoletes the run without invoking an action.
        let subject: Option<Value> = match &run.subject {
            Some(subject_ref) => match self.store().resolve_subject(subject_ref) {
                Some(value) => Some(value),
                None => {
                    info!(
                        "Subject {} for flow run {} no longer exists",
                        subject_ref, run.id
                    );
                    run.finish(Outcome::Obsolete);
                    return;
                }
            },
            None => None,
        };

        let was_waiting = run.status == RunStatus::Waiting;
        let repeat = run.repeat_action;
        let resume_node = run.node;

        // The run is executing now; the Waiting bookkeeping is consumed.
        run.status = RunStatus::Pending;
        run.continue_after = None;
        run.repeat_action = false;

        let mut next = match resume_node {
            Some(node) if was_waiting && !repeat => cursor::resume_after(flow, node),
            Some(node) => Next::Step(Cursor::entering(node)),
            None => match cursor::start(flow) {
                Some(c) => Next::Step(c),
                None => Next::Finished(Outcome::Complete),
            },
        };

        let mut steps: u32 = 0;
        loop {
            match next {
                Next::Finished(outcome) => {
                    run.finish(outcome);
                    info!("Flow run {} finished: {}", run.id, outcome);
                    return;
                }

                Next::Suspend { repeat } => {
                    // A suspend directive always follows a node
                    // invocation, so the cursor node is set.
                    let Some(node) = run.node else {
                        run.append_log("ActionError: suspend with no current action");
                        run.finish(Outcome::Errored);
                        return;
                    };
                    let continue_after = run.continue_after.unwrap_or_else(|| {
                        Utc::now() + Duration::seconds(DEFAULT_RESUME_DELAY_SECS)
                    });
                    run.suspend(node, continue_after, repeat);
                    info!(
                        "Flow run {} suspended until {} (repeat: {})",
                        run.id, continue_after, repeat
                    );
                    return;
                }

                Next::Step(step) => {
                    steps += 1;
                    if steps > max_hot_loop {
                        run.append_log(format!(
                            "Loop times {} exceeded in flow run {}",
                            max_hot_loop, run.id
                        ));
                        run.finish(Outcome::Errored);
                        warn!(
                            "Flow run {} exceeded the hot-loop budget of {}",
                            run.id, max_hot_loop
                        );
                        return;
                    }

                    run.node = Some(step.node);
                    match self.invoke(run, subject.as_ref(), flow, step) {
                        Ok(directive) => {
                            let directive = directive.unwrap_or(Directive::Continue);
                            next = cursor::advance(flow, step.node, directive);
                        }
                        Err(e) => {
                            error!("Flow run {} failed at node {}: {}", run.id, step.node, e);
                            run.append_log(e.log_line());
                            run.finish(Outcome::Errored);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn invoke(
        &self,
        run: &mut Run,
        subject: Option<&Value>,
        flow: &Flow,
        step: Cursor,
    ) -> Result<Option<Directive>, ActionError> {
        let node = flow.node(step.node).ok_or_else(|| {
            ActionError::failed(format!(
                "node {} is not part of flow {}",
                step.node, flow.id
            ))
        })?;
        let action =
            lookup_action(&node.action).ok_or_else(|| ActionError::missing(node.action.as_str()))?;

        let mut ctx = ActionCtx::new(run, subject, &node.config, self, step.node);
        match step.phase {
            Phase::Entering => action.run(&mut ctx),
            Phase::Returning => action.return_from_children(&mut ctx),
        }
    }
}
