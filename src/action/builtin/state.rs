//! State Actions
//!
//! `SetState` replaces the run's visible state with the configured
//! mapping; keys starting with `_` are internal bookkeeping (loop
//! counters and the like) and survive the replacement. `UpdateState`
//! merges instead of replacing.
//!
//! With `evaluate: true`, string values in the mapping are expressions
//! evaluated against the current context before being stored.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::action::{Action, ActionCtx, Directive};
use crate::engine::error::ActionError;

use super::decode;

#[derive(Debug, Default, Deserialize)]
struct StateConfig {
    #[serde(default)]
    state: Map<String, Value>,

    #[serde(default)]
    evaluate: bool,
}

fn resolved_entries(
    ctx: &ActionCtx<'_>,
    config: &StateConfig,
) -> Result<Vec<(String, Value)>, ActionError> {
    let mut entries = Vec::with_capacity(config.state.len());
    for (key, value) in &config.state {
        let value = match (config.evaluate, value) {
            (true, Value::String(expr)) => ctx.eval(expr)?,
            _ => value.clone(),
        };
        entries.push((key.clone(), value));
    }
    Ok(entries)
}

/// Replaces the visible run state with the configured mapping.
pub struct SetState;

impl Action for SetState {
    fn name(&self) -> &str {
        "SetState"
    }

    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        let config: StateConfig = decode(self.name(), ctx.config())?;
        let entries = resolved_entries(ctx, &config)?;

        let state = ctx.state_mut();
        state.retain(|key, _| key.starts_with('_'));
        for (key, value) in entries {
            state.insert(key, value);
        }
        Ok(Some(Directive::Continue))
    }
}

/// Merges the configured mapping into the run state.
pub struct UpdateState;

impl Action for UpdateState {
    fn name(&self) -> &str {
        "UpdateState"
    }

    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        let config: StateConfig = decode(self.name(), ctx.config())?;
        let entries = resolved_entries(ctx, &config)?;

        let state = ctx.state_mut();
        for (key, value) in entries {
            state.insert(key, value);
        }
        Ok(Some(Directive::Continue))
    }
}
