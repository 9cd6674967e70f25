//! Action Contract
//!
//! Every pluggable unit of logic implements [`Action`]. The executor
//! calls [`Action::run`] when it enters a node and
//! [`Action::return_from_children`] when a container node's subtree has
//! finished for the current visit; both return a [`Directive`] telling
//! the traversal where to go next.
//!
//! Implementations receive an [`ActionCtx`]: a mutable handle on the
//! run state, the resolved subject, the node's configuration payload
//! and evaluation helpers. The handle must not be retained beyond the
//! call.

pub mod builtin;
pub mod registry;

use serde_json::{Map, Value};

use crate::engine::error::ActionError;
use crate::engine::Engine;
use crate::flow::{NodeId, Run};

/// Control-flow signal an action returns to the executor.
///
/// The numeric values are stable; configuration payloads may reference
/// directives by number or by name (see [`Directive::from_value`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Directive {
    /// Advance to the next sibling (or finish the parent's subtree).
    Continue = 0,

    /// Descend into the node's children; no children behaves like
    /// `Continue`.
    Enter = 1,

    /// Skip the remaining siblings and return to the parent.
    Leave = 2,

    /// Unwind to the outermost ancestor and continue after it.
    Break = 3,

    /// Terminate the run with outcome `Aborted`.
    Abort = 4,

    /// Persist the cursor and go to sleep until `continue_after`.
    Suspend = 5,

    /// Like `Suspend`, but re-invoke the same node on resume.
    SuspendAndRepeat = 6,
}

impl Directive {
    /// Decodes a directive from a configuration value (an integer code
    /// or a name). An unrecognized value is a directive-type error.
    pub fn from_value(value: &Value) -> Result<Self, ActionError> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Directive::Continue),
                Some(1) => Ok(Directive::Enter),
                Some(2) => Ok(Directive::Leave),
                Some(3) => Ok(Directive::Break),
                Some(4) => Ok(Directive::Abort),
                Some(5) => Ok(Directive::Suspend),
                Some(6) => Ok(Directive::SuspendAndRepeat),
                _ => Err(ActionError::bad_directive(value)),
            },
            Value::String(s) => {
                let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    "continue" => Ok(Directive::Continue),
                    "enter" => Ok(Directive::Enter),
                    "leave" => Ok(Directive::Leave),
                    "break" => Ok(Directive::Break),
                    "abort" => Ok(Directive::Abort),
                    "suspend" => Ok(Directive::Suspend),
                    "suspend_and_repeat" => Ok(Directive::SuspendAndRepeat),
                    _ => Err(ActionError::bad_directive(value)),
                }
            }
            _ => Err(ActionError::bad_directive(value)),
        }
    }
}

/// The polymorphic contract every action type implements.
///
/// `run` executes the node's logic once per visit and may mutate the
/// run state through the ctx; a `None` return is treated as
/// [`Directive::Continue`]. Domain errors are signalled by failing,
/// never by returning a sentinel value.
pub trait Action: Send + Sync {
    /// Registered name of this action type.
    fn name(&self) -> &str;

    /// Whether nodes of this type may have children.
    fn has_children(&self) -> bool {
        false
    }

    /// Executes the node's logic for this visit.
    fn run(&self, ctx: &mut ActionCtx<'_>) -> Result<Option<Directive>, ActionError>;

    /// Invoked after this node's subtree has finished for the current
    /// visit. Only container types are ever called here; the default
    /// fails immediately, so reaching it is a programming error (a
    /// container type without an override, or a corrupted tree).
    fn return_from_children(
        &self,
        ctx: &mut ActionCtx<'_>,
    ) -> Result<Option<Directive>, ActionError> {
        let _ = ctx;
        Err(ActionError::failed(format!(
            "{} does not implement return_from_children",
            self.name()
        )))
    }
}

/// Per-invocation handle passed to an action.
pub struct ActionCtx<'a> {
    run: &'a mut Run,
    subject: Option<&'a Value>,
    config: &'a Value,
    engine: &'a Engine,
    node: NodeId,
}

impl<'a> ActionCtx<'a> {
    pub fn new(
        run: &'a mut Run,
        subject: Option<&'a Value>,
        config: &'a Value,
        engine: &'a Engine,
        node: NodeId,
    ) -> Self {
        Self {
            run,
            subject,
            config,
            engine,
            node,
        }
    }

    /// The run being executed.
    pub fn run(&self) -> &Run {
        self.run
    }

    /// Mutable access to the run's state mapping.
    pub fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.run.state
    }

    /// The resolved subject entity, if the run has one.
    pub fn subject(&self) -> Option<&'a Value> {
        self.subject
    }

    /// The node's configuration payload.
    pub fn config(&self) -> &'a Value {
        self.config
    }

    /// The node being executed.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The engine driving this run (for sub-flow instantiation).
    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    /// Records the instant the run should resume at if it suspends.
    pub fn set_continue_after(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.run.continue_after = Some(at);
    }

    /// Read-only snapshot of the state visible to expression
    /// evaluation: the run state plus the subject under `"subject"`.
    pub fn context(&self) -> Map<String, Value> {
        let mut context = self.run.state.clone();
        context.insert(
            "subject".to_string(),
            self.subject.cloned().unwrap_or(Value::Null),
        );
        context
    }

    /// Evaluates an expression against the current context.
    pub fn eval(&self, expr: &str) -> Result<Value, ActionError> {
        let context = self.context();
        Ok(self.engine.evaluator().evaluate(expr, &context)?)
    }

    /// Evaluates an expression and reduces it to a boolean.
    pub fn eval_truthy(&self, expr: &str) -> Result<bool, ActionError> {
        Ok(crate::eval::truthy(&self.eval(expr)?))
    }
}
