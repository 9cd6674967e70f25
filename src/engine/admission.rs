//! Admission Control
//!
//! Decides whether a new run may exist before one is created. Limits
//! live on the flow definition:
//!
//! - `max_concurrent`: non-Done runs for the flow
//! - `max_per_subject`: runs ever created for the flow + subject
//! - `max_concurrent_per_subject`: non-Done runs for the flow + subject
//!
//! A refused admission is a normal outcome (`Ok(None)`), not an error;
//! only an inactive flow fails loudly. The store computes the counts
//! and inserts the run inside one critical section, so racing creators
//! cannot both slip under a limit.

use log::{debug, info};
use serde_json::{Map, Value};

use crate::flow::{Flow, Run, RunId, SubjectRef, TriggerId};
use crate::store::{FlowStore, RunCounts};

use super::error::EngineError;
use super::Engine;

/// Optional initial fields for a new run (sub-flow and trigger paths).
#[derive(Debug, Default, Clone)]
pub struct RunSeed {
    pub state: Option<Map<String, Value>>,
    pub parent_run: Option<RunId>,
    pub trigger: Option<TriggerId>,
}

impl Engine {
    /// Creates a Pending run for the flow if admission allows it.
    ///
    /// Fails if the flow is not currently active. Returns `Ok(None)`
    /// when a configured limit refuses the run.
    pub fn create_run(
        &self,
        flow: &Flow,
        subject: Option<SubjectRef>,
    ) -> Result<Option<Run>, EngineError> {
        self.create_run_with(flow, subject, RunSeed::default())
    }

    /// Like [`Engine::create_run`] with initial state and provenance.
    pub fn create_run_with(
        &self,
        flow: &Flow,
        subject: Option<SubjectRef>,
        seed: RunSeed,
    ) -> Result<Option<Run>, EngineError> {
        if !flow.is_active() {
            return Err(EngineError::InactiveFlow);
        }

        let mut run = Run::new(flow.id, subject);
        if let Some(state) = seed.state {
            run.state = state;
        }
        run.parent_run = seed.parent_run;
        run.trigger = seed.trigger;

        let max_concurrent = flow.max_concurrent;
        let max_per_subject = flow.max_per_subject;
        let max_concurrent_per_subject = flow.max_concurrent_per_subject;
        let has_subject = run.subject.is_some();

        let admitted = self.store().insert_run(run, &mut |counts: &RunCounts| {
            if let Some(max) = max_concurrent {
                if counts.active_for_flow >= max as usize {
                    return false;
                }
            }
            if has_subject {
                if let Some(max) = max_per_subject {
                    if counts.total_for_subject >= max as usize {
                        return false;
                    }
                }
                if let Some(max) = max_concurrent_per_subject {
                    if counts.active_for_subject >= max as usize {
                        return false;
                    }
                }
            }
            true
        });

        match admitted {
            Some(id) => {
                info!("Created flow run {} for flow '{}'", id, flow.name);
                Ok(self.store().run(id))
            }
            None => {
                debug!("Flow '{}' refused a new run (limit reached)", flow.name);
                Ok(None)
            }
        }
    }

    /// Creates a run and executes it synchronously.
    ///
    /// Returns the run in its post-execution state (Done or Waiting),
    /// or `Ok(None)` if admission refused.
    pub fn start_run(
        &self,
        flow: &Flow,
        subject: Option<SubjectRef>,
    ) -> Result<Option<Run>, EngineError> {
        self.start_run_with(flow, subject, RunSeed::default())
    }

    /// Like [`Engine::start_run`] with initial state and provenance.
    pub fn start_run_with(
        &self,
        flow: &Flow,
        subject: Option<SubjectRef>,
        seed: RunSeed,
    ) -> Result<Option<Run>, EngineError> {
        match self.create_run_with(flow, subject, seed)? {
            Some(mut run) => {
                self.execute_run(&mut run)?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }
}
