//! Trigger Evaluation
//!
//! Maps a named external event onto run creation: every active trigger
//! bound to the event name is considered, its optional condition is
//! evaluated against the subject, and a run is created (or started,
//! when `immediate`) through admission control.
//!
//! Admission refusals and inactive flows are skipped quietly — an
//! external event firing is not the place to surface configuration
//! drift as hard errors. A malformed condition expression does
//! propagate: it is a flaw in the trigger itself.

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::action::registry::trigger_registered;
use crate::eval::truthy;
use crate::flow::{Run, SubjectRef};
use crate::store::FlowStore;

use super::admission::RunSeed;
use super::error::EngineError;
use super::Engine;

impl Engine {
    /// Fires the named event: creates a run for every active, matching
    /// trigger and returns the runs actually created.
    pub fn trigger_flows(
        &self,
        name: &str,
        subject: Option<SubjectRef>,
        initial_state: Option<Map<String, Value>>,
        immediate: bool,
    ) -> Result<Vec<Run>, EngineError> {
        if !trigger_registered(name) {
            debug!("event '{}' fired without a declared trigger name", name);
        }

        let subject_value = subject
            .as_ref()
            .and_then(|s| self.store().resolve_subject(s))
            .unwrap_or(Value::Null);

        let mut created = Vec::new();
        for trigger in self.store().triggers_named(name) {
            if !trigger.is_active() {
                continue;
            }

            if let Some(condition) = trigger.condition.as_deref() {
                if !condition.trim().is_empty() {
                    let mut context = Map::new();
                    context.insert("subject".to_string(), subject_value.clone());
                    let result = self.evaluator().evaluate(condition, &context)?;
                    if !truthy(&result) {
                        debug!(
                            "trigger {} for event '{}' did not match",
                            trigger.id, name
                        );
                        continue;
                    }
                }
            }

            let Some(flow) = self.store().flow(trigger.flow) else {
                warn!(
                    "trigger {} references missing flow {}",
                    trigger.id, trigger.flow
                );
                continue;
            };
            if !flow.is_active() {
                warn!(
                    "trigger {} fired for inactive flow '{}'",
                    trigger.id, flow.name
                );
                continue;
            }

            let seed = RunSeed {
                state: initial_state.clone(),
                parent_run: None,
                trigger: Some(trigger.id),
            };
            let run = if immediate {
                self.start_run_with(&flow, subject.clone(), seed)?
            } else {
                self.create_run_with(&flow, subject.clone(), seed)?
            };

            match run {
                Some(run) => created.push(run),
                None => debug!(
                    "trigger {} for event '{}' refused by admission",
                    trigger.id, name
                ),
            }
        }

        Ok(created)
    }
}
