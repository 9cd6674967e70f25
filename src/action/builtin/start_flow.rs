//! Sub-Flow Action
//!
//! Instantiates a run of another flow from inside a running flow. The
//! sub-run goes through the target flow's own admission limits; a
//! refusal is silent (the parent continues). With `immediate` the
//! sub-run executes synchronously, otherwise it is left Pending for the
//! scheduler.

use log::debug;
use serde::Deserialize;

use crate::action::{Action, ActionCtx, Directive};
use crate::engine::admission::RunSeed;
use crate::engine::error::ActionError;
use crate::store::FlowStore;

#[derive(Debug, Deserialize)]
struct StartFlowConfig {
    /// Name of the flow to instantiate.
    flow: String,

    /// Execute the sub-run synchronously instead of leaving it Pending.
    #[serde(default)]
    immediate: bool,

    /// Copy the parent run's state into the sub-run.
    #[serde(default)]
    pass_state: bool,

    /// Forward the parent run's subject reference (default true).
    #[serde(default = "default_true")]
    pass_subject: bool,
}

fn default_true() -> bool {
    true
}

/// Starts a run of a named flow as a child of the current run.
pub struct StartFlow;

impl Action for StartFlow {
    fn name(&self) -> &str {
        "StartFlow"
    }

    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        let config: StartFlowConfig = serde_json::from_value(ctx.config().clone())
            .map_err(|e| ActionError::failed(format!("invalid StartFlow configuration: {}", e)))?;

        let engine = ctx.engine();
        let target = engine
            .store()
            .flow_by_name(&config.flow)
            .ok_or_else(|| ActionError::failed(format!("unknown flow '{}'", config.flow)))?;

        let subject = if config.pass_subject {
            ctx.run().subject.clone()
        } else {
            None
        };
        let seed = RunSeed {
            state: config.pass_state.then(|| ctx.run().state.clone()),
            parent_run: Some(ctx.run().id),
            trigger: None,
        };

        let sub_run = if config.immediate {
            engine.start_run_with(&target, subject, seed)
        } else {
            engine.create_run_with(&target, subject, seed)
        }
        .map_err(|e| ActionError::failed(e.to_string()))?;

        match sub_run {
            Some(sub_run) => debug!(
                "flow run {} started sub-run {} of flow '{}'",
                ctx.run().id,
                sub_run.id,
                target.name
            ),
            None => debug!(
                "flow run {} was refused a sub-run of flow '{}'",
                ctx.run().id,
                target.name
            ),
        }

        Ok(Some(Directive::Continue))
    }
}
