//! Control-Flow Actions
//!
//! Conditionals and loops built entirely out of directives: `If` and
//! `WhileLoop` decide between Enter and Continue, `ForLoop` keeps its
//! counter in the run state, and `Leave`/`Break`/`Abort` are thin
//! directive emitters.

use serde::Deserialize;
use serde_json::Value;

use crate::action::{Action, ActionCtx, Directive};
use crate::engine::error::ActionError;

use super::decode;

#[derive(Debug, Default, Deserialize)]
struct ConditionConfig {
    #[serde(default)]
    condition: String,
}

/// Enters its children when the condition holds.
///
/// An empty condition never enters; a conditional without a condition
/// has nothing to say yes to.
pub struct If;

impl Action for If {
    fn name(&self) -> &str {
        "If"
    }

    fn has_children(&self) -> bool {
        true
    }

    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        let config: ConditionConfig = decode(self.name(), ctx.config())?;
        if config.condition.trim().is_empty() {
            return Ok(Some(Directive::Continue));
        }
        if ctx.eval_truthy(&config.condition)? {
            Ok(Some(Directive::Enter))
        } else {
            Ok(Some(Directive::Continue))
        }
    }

    fn return_from_children(
        &self,
        _ctx: &mut ActionCtx<'_>,
    ) -> Result<Option<Directive>, ActionError> {
        Ok(Some(Directive::Continue))
    }
}

/// Re-enters its children for as long as the condition holds.
pub struct WhileLoop;

impl WhileLoop {
    fn decide(&self, ctx: &ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        let config: ConditionConfig = decode("WhileLoop", ctx.config())?;
        if config.condition.trim().is_empty() {
            return Ok(Some(Directive::Continue));
        }
        if ctx.eval_truthy(&config.condition)? {
            Ok(Some(Directive::Enter))
        } else {
            Ok(Some(Directive::Continue))
        }
    }
}

impl Action for WhileLoop {
    fn name(&self) -> &str {
        "WhileLoop"
    }

    fn has_children(&self) -> bool {
        true
    }

    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        self.decide(ctx)
    }

    fn return_from_children(
        &self,
        ctx: &mut ActionCtx<'_>,
    ) -> Result<Option<Directive>, ActionError> {
        self.decide(ctx)
    }
}

#[derive(Debug, Deserialize)]
struct ForLoopConfig {
    #[serde(default)]
    var: Option<String>,

    #[serde(default)]
    start: i64,

    #[serde(default)]
    end: i64,

    #[serde(default = "default_step")]
    step: i64,
}

fn default_step() -> i64 {
    1
}

impl Default for ForLoopConfig {
    fn default() -> Self {
        Self {
            var: None,
            start: 0,
            end: 0,
            step: default_step(),
        }
    }
}

/// Counted loop over `start..end` with the counter kept in run state.
///
/// A named counter (`var`) is visible to child expressions and removed
/// when the loop finishes; an unnamed loop keeps its counter under an
/// internal per-node key.
pub struct ForLoop;

impl ForLoop {
    fn counter_key(config: &ForLoopConfig, ctx: &ActionCtx<'_>) -> String {
        match &config.var {
            Some(var) if !var.trim().is_empty() => var.clone(),
            _ => format!("_loop_{}", ctx.node()),
        }
    }
}

impl Action for ForLoop {
    fn name(&self) -> &str {
        "ForLoop"
    }

    fn has_children(&self) -> bool {
        true
    }

    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        let config: ForLoopConfig = decode(self.name(), ctx.config())?;
        if config.step <= 0 {
            return Err(ActionError::failed("loop step must be positive"));
        }
        if config.start >= config.end {
            return Ok(Some(Directive::Continue));
        }

        let key = Self::counter_key(&config, ctx);
        ctx.state_mut().insert(key, Value::from(config.start));
        Ok(Some(Directive::Enter))
    }

    fn return_from_children(
        &self,
        ctx: &mut ActionCtx<'_>,
    ) -> Result<Option<Directive>, ActionError> {
        let config: ForLoopConfig = decode(self.name(), ctx.config())?;
        let key = Self::counter_key(&config, ctx);

        let current = ctx
            .run()
            .state
            .get(&key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                ActionError::failed(format!("loop counter '{}' is missing from state", key))
            })?;

        let next = current + config.step;
        if next < config.end {
            ctx.state_mut().insert(key, Value::from(next));
            Ok(Some(Directive::Enter))
        } else {
            ctx.state_mut().remove(&key);
            Ok(Some(Directive::Continue))
        }
    }
}

/// Skips the remaining siblings and returns to the parent.
pub struct Leave;

impl Action for Leave {
    fn name(&self) -> &str {
        "Leave"
    }

    fn run(&self, _ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        Ok(Some(Directive::Leave))
    }
}

/// Unwinds to the outermost ancestor, optionally behind a condition.
pub struct Break;

impl Action for Break {
    fn name(&self) -> &str {
        "Break"
    }

    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        let config: ConditionConfig = decode(self.name(), ctx.config())?;
        if config.condition.trim().is_empty() || ctx.eval_truthy(&config.condition)? {
            Ok(Some(Directive::Break))
        } else {
            Ok(Some(Directive::Continue))
        }
    }
}

/// Terminates the run with outcome `Aborted`.
pub struct Abort;

impl Action for Abort {
    fn name(&self) -> &str {
        "Abort"
    }

    fn run(&self, _ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError> {
        Ok(Some(Directive::Abort))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::flow::{FlowId, NodeId, Run};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> Engine {
        Engine::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_if_empty_condition_continues() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"condition": ""});
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(If.run(&mut ctx).unwrap(), Some(Directive::Continue));
    }

    #[test]
    fn test_if_true_enters_false_continues() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);

        let config = json!({"condition": "true"});
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(If.run(&mut ctx).unwrap(), Some(Directive::Enter));

        let config = json!({"condition": "false"});
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(If.run(&mut ctx).unwrap(), Some(Directive::Continue));
    }

    #[test]
    fn test_if_condition_reads_state() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"condition": "foo == 'bar'"});

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(If.run(&mut ctx).unwrap(), Some(Directive::Continue));

        run.state.insert("foo".to_string(), json!("bad"));
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(If.run(&mut ctx).unwrap(), Some(Directive::Continue));

        run.state.insert("foo".to_string(), json!("bar"));
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(If.run(&mut ctx).unwrap(), Some(Directive::Enter));
    }

    #[test]
    fn test_if_return_from_children_continues() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"condition": "true"});
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(
            If.return_from_children(&mut ctx).unwrap(),
            Some(Directive::Continue)
        );
    }

    #[test]
    fn test_while_loop_repeats_until_condition_fails() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        run.state.insert("counter".to_string(), json!(0));
        let config = json!({"condition": "counter < 2"});

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(WhileLoop.run(&mut ctx).unwrap(), Some(Directive::Enter));

        run.state.insert("counter".to_string(), json!(1));
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(
            WhileLoop.return_from_children(&mut ctx).unwrap(),
            Some(Directive::Enter)
        );

        run.state.insert("counter".to_string(), json!(2));
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(
            WhileLoop.return_from_children(&mut ctx).unwrap(),
            Some(Directive::Continue)
        );
    }

    #[test]
    fn test_empty_for_loop_continues_without_state() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"var": "i", "start": 0, "end": 0});
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));

        assert_eq!(ForLoop.run(&mut ctx).unwrap(), Some(Directive::Continue));
        assert!(!run.state.contains_key("i"));
    }

    #[test]
    fn test_for_loop_full_cycle() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"var": "i", "start": 0, "end": 3, "step": 1});

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(ForLoop.run(&mut ctx).unwrap(), Some(Directive::Enter));
        assert_eq!(run.state.get("i"), Some(&json!(0)));

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(
            ForLoop.return_from_children(&mut ctx).unwrap(),
            Some(Directive::Enter)
        );
        assert_eq!(run.state.get("i"), Some(&json!(1)));

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(
            ForLoop.return_from_children(&mut ctx).unwrap(),
            Some(Directive::Enter)
        );
        assert_eq!(run.state.get("i"), Some(&json!(2)));

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(
            ForLoop.return_from_children(&mut ctx).unwrap(),
            Some(Directive::Continue)
        );
        // Counter removed once the loop is over.
        assert!(!run.state.contains_key("i"));
    }

    #[test]
    fn test_for_loop_corrupted_counter_fails() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"var": "i", "start": 0, "end": 3});

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        ForLoop.run(&mut ctx).unwrap();

        run.state.remove("i");
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        let err = ForLoop.return_from_children(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("loop counter 'i' is missing"));
    }

    #[test]
    fn test_for_loop_anonymous_counter_key_is_internal() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"end": 2});
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(4));

        assert_eq!(ForLoop.run(&mut ctx).unwrap(), Some(Directive::Enter));
        assert_eq!(run.state.get("_loop_4"), Some(&json!(0)));
    }

    #[test]
    fn test_for_loop_rejects_non_positive_step() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = json!({"var": "i", "start": 0, "end": 3, "step": 0});
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert!(ForLoop.run(&mut ctx).is_err());
    }

    #[test]
    fn test_leave_and_abort_directives() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = Value::Null;

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(Leave.run(&mut ctx).unwrap(), Some(Directive::Leave));

        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(Abort.run(&mut ctx).unwrap(), Some(Directive::Abort));
    }

    #[test]
    fn test_break_condition_variants() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);

        for config in [json!(null), json!({"condition": ""}), json!({"condition": "true"})] {
            let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
            assert_eq!(Break.run(&mut ctx).unwrap(), Some(Directive::Break));
        }

        let config = json!({"condition": "false"});
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));
        assert_eq!(Break.run(&mut ctx).unwrap(), Some(Directive::Continue));
    }

    #[test]
    fn test_leaf_actions_reject_return_from_children() {
        let engine = engine();
        let mut run = Run::new(FlowId(1), None);
        let config = Value::Null;
        let mut ctx = ActionCtx::new(&mut run, None, &config, &engine, NodeId(0));

        let err = Leave.return_from_children(&mut ctx).unwrap_err();
        assert!(err
            .to_string()
            .contains("does not implement return_from_children"));
    }
}
