//! Run Records
//!
//! A [`Run`] is one execution instance of a flow against an optional
//! subject. It carries everything the executor needs to resume after a
//! suspension: the cursor node, the repeat flag, the mutable state
//! mapping and the `continue_after` deadline.
//!
//! Invariants:
//! - `continue_after` is set iff the status is [`RunStatus::Waiting`].
//! - a Done run always has an outcome and a `done_at` timestamp, and
//!   its outcome never changes afterwards.
//! - `repeat_action` is only meaningful while Waiting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::{FlowId, NodeId};
use super::trigger::TriggerId;

/// Identifier of a run record, assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the subject entity a run executes against.
///
/// The engine never interprets the reference; it asks the store to
/// resolve it to a JSON representation when a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: String,
    pub key: String,
}

impl SubjectRef {
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.key)
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Created but not currently executing; runnable immediately.
    Pending,

    /// Suspended until `continue_after`.
    Waiting,

    /// Terminal; see the outcome.
    Done,
}

/// Terminal result of a run, set exactly once when it reaches Done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Traversal reached the end of the forest.
    Complete,

    /// An action returned the Abort directive.
    Aborted,

    /// Cancelled out-of-band.
    Canceled,

    /// An action failed or the hot-loop limit was hit.
    Errored,

    /// The subject no longer exists (or the run was discarded).
    Obsolete,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Outcome::Complete => "complete",
            Outcome::Aborted => "aborted",
            Outcome::Canceled => "canceled",
            Outcome::Errored => "errored",
            Outcome::Obsolete => "obsolete",
        };
        write!(f, "{}", name)
    }
}

/// One execution instance of a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub flow: FlowId,
    pub subject: Option<SubjectRef>,

    /// Mutable state mapping, exclusively owned by the executor while a
    /// step is in flight.
    pub state: Map<String, Value>,

    pub status: RunStatus,
    pub outcome: Option<Outcome>,

    /// Cursor: the node to resume at, `None` before the first step.
    pub node: Option<NodeId>,

    /// Resume deadline; set iff status is Waiting.
    pub continue_after: Option<DateTime<Utc>>,

    /// Re-invoke `run` on the cursor node instead of advancing past it.
    pub repeat_action: bool,

    /// Append-only human-readable trail.
    pub log: String,

    pub done_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,

    /// Set on sub-runs created by a parent run.
    pub parent_run: Option<RunId>,

    /// Set on runs created through a trigger.
    pub trigger: Option<TriggerId>,
}

impl Run {
    /// Creates a fresh Pending run for a flow.
    pub fn new(flow: FlowId, subject: Option<SubjectRef>) -> Self {
        Self {
            id: RunId(0),
            flow,
            subject,
            state: Map::new(),
            status: RunStatus::Pending,
            outcome: None,
            node: None,
            continue_after: None,
            repeat_action: false,
            log: String::new(),
            done_at: None,
            created_at: Utc::now(),
            parent_run: None,
            trigger: None,
        }
    }

    /// Returns true once the run has reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }

    /// Appends one line to the run's trail.
    pub fn append_log(&mut self, line: impl AsRef<str>) {
        self.log.push_str(line.as_ref());
        self.log.push('\n');
    }

    /// Transitions the run to Done with the given outcome.
    ///
    /// No-op if the run is already Done; a terminal outcome is
    /// immutable.
    pub fn finish(&mut self, outcome: Outcome) {
        if self.is_done() {
            return;
        }
        self.status = RunStatus::Done;
        self.outcome = Some(outcome);
        self.done_at = Some(Utc::now());
        self.continue_after = None;
        self.repeat_action = false;
    }

    /// Transitions the run to Waiting at the given cursor node.
    pub fn suspend(&mut self, node: NodeId, continue_after: DateTime<Utc>, repeat: bool) {
        self.status = RunStatus::Waiting;
        self.node = Some(node);
        self.continue_after = Some(continue_after);
        self.repeat_action = repeat;
    }
}
