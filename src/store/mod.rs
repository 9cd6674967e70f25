//! Storage Seam
//!
//! The engine persists flows, runs and triggers through the
//! [`FlowStore`] trait and never touches a concrete backend directly.
//! [`MemoryStore`] is the reference implementation; durable backends
//! implement the same contract.
//!
//! Two methods carry correctness weight beyond plain CRUD:
//!
//! - [`FlowStore::insert_run`] must compute the admission counts and
//!   insert the run under one critical section, so concurrent creators
//!   cannot both observe room below a limit.
//! - [`FlowStore::claim_run`] must be an atomic test-and-set, so two
//!   workers never execute the same run simultaneously.

pub mod memory;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::flow::{Flow, FlowId, Run, RunId, SubjectRef, Trigger, TriggerId};

pub use memory::MemoryStore;

/// Run counts the store computes for an admission decision, scoped to
/// the flow (and subject, when the candidate run has one) of the run
/// being inserted.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounts {
    /// Non-Done runs for the flow.
    pub active_for_flow: usize,

    /// Runs of any status for the flow + subject.
    pub total_for_subject: usize,

    /// Non-Done runs for the flow + subject.
    pub active_for_subject: usize,
}

/// Storage contract consumed by the engine.
///
/// All methods take `&self`; implementations provide their own interior
/// synchronization.
pub trait FlowStore: Send + Sync {
    /// Stores a flow definition (keyed by its id; replaces any previous
    /// version).
    fn insert_flow(&self, flow: Flow);

    /// Fetches a flow definition by id.
    fn flow(&self, id: FlowId) -> Option<Flow>;

    /// Fetches a flow definition by name.
    fn flow_by_name(&self, name: &str) -> Option<Flow>;

    /// Inserts a run if the admission predicate accepts the current
    /// counts; counting and insertion happen atomically. Returns the
    /// assigned id, or `None` if admission refused.
    fn insert_run(&self, run: Run, admit: &mut dyn FnMut(&RunCounts) -> bool) -> Option<RunId>;

    /// Fetches a run by id.
    fn run(&self, id: RunId) -> Option<Run>;

    /// Writes a run record back.
    fn update_run(&self, run: &Run);

    /// Atomically marks a run as in-flight. Returns false if another
    /// worker already holds the claim. Claims succeed vacuously for
    /// runs the store does not hold (detached records).
    fn claim_run(&self, id: RunId) -> bool;

    /// Releases an in-flight claim.
    fn release_run(&self, id: RunId);

    /// Every run that is due for execution: `Pending` with no
    /// `continue_after`, or `Waiting` with `continue_after <= now`.
    /// Malformed records (Waiting without a deadline, Pending with
    /// one) and claimed runs are excluded.
    fn runnable_runs(&self, now: DateTime<Utc>) -> Vec<RunId>;

    /// All runs for a flow, in creation order.
    fn runs_for_flow(&self, flow: FlowId) -> Vec<RunId>;

    /// All runs holding the given subject reference, in creation order.
    fn runs_for_subject(&self, subject: &SubjectRef) -> Vec<RunId>;

    /// Stores a trigger and assigns its id.
    fn insert_trigger(&self, trigger: Trigger) -> TriggerId;

    /// All triggers bound to the given event name.
    fn triggers_named(&self, name: &str) -> Vec<Trigger>;

    /// Registers a subject entity the store can resolve.
    fn put_subject(&self, subject: SubjectRef, value: Value);

    /// Forgets a subject entity.
    fn remove_subject(&self, subject: &SubjectRef);

    /// Resolves a subject reference to its JSON representation, `None`
    /// if the entity no longer exists.
    fn resolve_subject(&self, subject: &SubjectRef) -> Option<Value>;
}
