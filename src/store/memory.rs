//! In-Memory Store
//!
//! Reference [`FlowStore`] backed by a single mutex. The one-lock
//! design is what makes `insert_run` (count-then-insert) and
//! `claim_run` (test-and-set) atomic without further ceremony; a
//! durable backend would use a transaction and a compare-and-set
//! instead.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;

use crate::flow::{Flow, FlowId, Run, RunId, RunStatus, SubjectRef, Trigger, TriggerId};

use super::{FlowStore, RunCounts};

#[derive(Default)]
struct Inner {
    flows: HashMap<FlowId, Flow>,
    runs: Vec<Run>,
    next_run_id: u64,
    in_flight: HashSet<RunId>,
    triggers: Vec<Trigger>,
    next_trigger_id: u64,
    subjects: HashMap<SubjectRef, Value>,
}

impl Inner {
    fn run_index(&self, id: RunId) -> Option<usize> {
        self.runs.iter().position(|r| r.id == id)
    }

    fn counts_for(&self, flow: FlowId, subject: Option<&SubjectRef>) -> RunCounts {
        let mut counts = RunCounts::default();
        for run in self.runs.iter().filter(|r| r.flow == flow) {
            let active = run.status != RunStatus::Done;
            if active {
                counts.active_for_flow += 1;
            }
            if subject.is_some() && run.subject.as_ref() == subject {
                counts.total_for_subject += 1;
                if active {
                    counts.active_for_subject += 1;
                }
            }
        }
        counts
    }
}

/// In-memory reference store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowStore for MemoryStore {
    fn insert_flow(&self, flow: Flow) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.flows.insert(flow.id, flow);
    }

    fn flow(&self, id: FlowId) -> Option<Flow> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.flows.get(&id).cloned()
    }

    fn flow_by_name(&self, name: &str) -> Option<Flow> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.flows.values().find(|f| f.name == name).cloned()
    }

    fn insert_run(&self, mut run: Run, admit: &mut dyn FnMut(&RunCounts) -> bool) -> Option<RunId> {
        let mut inner = self.inner.lock().expect("store poisoned");
        let counts = inner.counts_for(run.flow, run.subject.as_ref());
        if !admit(&counts) {
            debug!("admission refused for flow {}", run.flow);
            return None;
        }
        inner.next_run_id += 1;
        let id = RunId(inner.next_run_id);
        run.id = id;
        inner.runs.push(run);
        Some(id)
    }

    fn run(&self, id: RunId) -> Option<Run> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.run_index(id).map(|i| inner.runs[i].clone())
    }

    fn update_run(&self, run: &Run) {
        let mut inner = self.inner.lock().expect("store poisoned");
        match inner.run_index(run.id) {
            Some(i) => inner.runs[i] = run.clone(),
            // Detached records (never inserted) are left alone; the
            // caller keeps the authoritative copy.
            None => debug!("update for run {} the store does not hold", run.id),
        }
    }

    fn claim_run(&self, id: RunId) -> bool {
        let mut inner = self.inner.lock().expect("store poisoned");
        if inner.run_index(id).is_none() {
            return true;
        }
        inner.in_flight.insert(id)
    }

    fn release_run(&self, id: RunId) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.in_flight.remove(&id);
    }

    fn runnable_runs(&self, now: DateTime<Utc>) -> Vec<RunId> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .runs
            .iter()
            .filter(|r| !inner.in_flight.contains(&r.id))
            .filter(|r| match r.status {
                RunStatus::Pending => r.continue_after.is_none(),
                RunStatus::Waiting => r.continue_after.map(|at| at <= now).unwrap_or(false),
                RunStatus::Done => false,
            })
            .map(|r| r.id)
            .collect()
    }

    fn runs_for_flow(&self, flow: FlowId) -> Vec<RunId> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .runs
            .iter()
            .filter(|r| r.flow == flow)
            .map(|r| r.id)
            .collect()
    }

    fn runs_for_subject(&self, subject: &SubjectRef) -> Vec<RunId> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .runs
            .iter()
            .filter(|r| r.subject.as_ref() == Some(subject))
            .map(|r| r.id)
            .collect()
    }

    fn insert_trigger(&self, mut trigger: Trigger) -> TriggerId {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.next_trigger_id += 1;
        let id = TriggerId(inner.next_trigger_id);
        trigger.id = id;
        inner.triggers.push(trigger);
        id
    }

    fn triggers_named(&self, name: &str) -> Vec<Trigger> {
        let inner = self.inner.lock().expect("store poisoned");
        inner
            .triggers
            .iter()
            .filter(|t| t.name == name)
            .cloned()
            .collect()
    }

    fn put_subject(&self, subject: SubjectRef, value: Value) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.subjects.insert(subject, value);
    }

    fn remove_subject(&self, subject: &SubjectRef) {
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.subjects.remove(subject);
    }

    fn resolve_subject(&self, subject: &SubjectRef) -> Option<Value> {
        let inner = self.inner.lock().expect("store poisoned");
        inner.subjects.get(subject).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Outcome;
    use serde_json::json;

    fn store_with_flow() -> (MemoryStore, Flow) {
        let store = MemoryStore::new();
        let flow = Flow::new("mem").activate();
        store.insert_flow(flow.clone());
        (store, flow)
    }

    fn admit_all(counts: &RunCounts) -> bool {
        let _ = counts;
        true
    }

    #[test]
    fn test_flow_crud() {
        let (store, flow) = store_with_flow();
        assert_eq!(store.flow(flow.id).unwrap().name, "mem");
        assert_eq!(store.flow_by_name("mem").unwrap().id, flow.id);
        assert!(store.flow_by_name("nope").is_none());
    }

    #[test]
    fn test_insert_run_assigns_ids() {
        let (store, flow) = store_with_flow();
        let a = store
            .insert_run(Run::new(flow.id, None), &mut admit_all)
            .unwrap();
        let b = store
            .insert_run(Run::new(flow.id, None), &mut admit_all)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(store.runs_for_flow(flow.id), vec![a, b]);
    }

    #[test]
    fn test_insert_run_admission_counts() {
        let (store, flow) = store_with_flow();
        let subject = SubjectRef::new("user", "1");

        let mut seen = RunCounts::default();
        store
            .insert_run(
                Run::new(flow.id, Some(subject.clone())),
                &mut |counts: &RunCounts| {
                    seen = *counts;
                    true
                },
            )
            .unwrap();
        assert_eq!(seen.active_for_flow, 0);
        assert_eq!(seen.total_for_subject, 0);

        // Finish the first run; total still counts it, active does not.
        let id = store.runs_for_flow(flow.id)[0];
        let mut run = store.run(id).unwrap();
        run.finish(Outcome::Complete);
        store.update_run(&run);

        store
            .insert_run(
                Run::new(flow.id, Some(subject.clone())),
                &mut |counts: &RunCounts| {
                    seen = *counts;
                    true
                },
            )
            .unwrap();
        assert_eq!(seen.active_for_flow, 0);
        assert_eq!(seen.total_for_subject, 1);
        assert_eq!(seen.active_for_subject, 0);
    }

    #[test]
    fn test_insert_run_refusal() {
        let (store, flow) = store_with_flow();
        let refused = store.insert_run(Run::new(flow.id, None), &mut |_c: &RunCounts| false);
        assert!(refused.is_none());
        assert!(store.runs_for_flow(flow.id).is_empty());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let (store, flow) = store_with_flow();
        let id = store
            .insert_run(Run::new(flow.id, None), &mut admit_all)
            .unwrap();

        assert!(store.claim_run(id));
        assert!(!store.claim_run(id));
        store.release_run(id);
        assert!(store.claim_run(id));
    }

    #[test]
    fn test_claim_vacuous_for_unknown_run() {
        let store = MemoryStore::new();
        assert!(store.claim_run(RunId(999)));
    }

    #[test]
    fn test_runnable_runs_query() {
        let (store, flow) = store_with_flow();
        let now = Utc::now();

        let pending = store
            .insert_run(Run::new(flow.id, None), &mut admit_all)
            .unwrap();

        let mut waiting_due = Run::new(flow.id, None);
        waiting_due.status = RunStatus::Waiting;
        waiting_due.continue_after = Some(now - chrono::Duration::seconds(5));
        let waiting_due = store.insert_run(waiting_due, &mut admit_all).unwrap();

        let mut waiting_later = Run::new(flow.id, None);
        waiting_later.status = RunStatus::Waiting;
        waiting_later.continue_after = Some(now + chrono::Duration::hours(1));
        store.insert_run(waiting_later, &mut admit_all).unwrap();

        let mut done = Run::new(flow.id, None);
        done.finish(Outcome::Complete);
        store.insert_run(done, &mut admit_all).unwrap();

        // Broken records: Waiting without a deadline, Pending with one.
        let mut broken_waiting = Run::new(flow.id, None);
        broken_waiting.status = RunStatus::Waiting;
        store.insert_run(broken_waiting, &mut admit_all).unwrap();

        let mut broken_pending = Run::new(flow.id, None);
        broken_pending.continue_after = Some(now);
        store.insert_run(broken_pending, &mut admit_all).unwrap();

        let runnable = store.runnable_runs(now);
        assert_eq!(runnable, vec![pending, waiting_due]);
    }

    #[test]
    fn test_runnable_excludes_claimed() {
        let (store, flow) = store_with_flow();
        let id = store
            .insert_run(Run::new(flow.id, None), &mut admit_all)
            .unwrap();
        assert!(store.claim_run(id));
        assert!(store.runnable_runs(Utc::now()).is_empty());
        store.release_run(id);
        assert_eq!(store.runnable_runs(Utc::now()), vec![id]);
    }

    #[test]
    fn test_triggers_named() {
        let (store, flow) = store_with_flow();
        store.insert_trigger(Trigger::new(flow.id, "signup").activate());
        store.insert_trigger(Trigger::new(flow.id, "signup"));
        store.insert_trigger(Trigger::new(flow.id, "other"));

        assert_eq!(store.triggers_named("signup").len(), 2);
        assert_eq!(store.triggers_named("other").len(), 1);
        assert!(store.triggers_named("none").is_empty());
    }

    #[test]
    fn test_subject_resolution() {
        let store = MemoryStore::new();
        let subject = SubjectRef::new("user", "42");
        store.put_subject(subject.clone(), json!({"username": "example"}));

        assert_eq!(
            store.resolve_subject(&subject).unwrap()["username"],
            json!("example")
        );
        store.remove_subject(&subject);
        assert!(store.resolve_subject(&subject).is_none());
    }

    #[test]
    fn test_runs_for_subject() {
        let (store, flow) = store_with_flow();
        let subject = SubjectRef::new("user", "7");
        let with = store
            .insert_run(Run::new(flow.id, Some(subject.clone())), &mut admit_all)
            .unwrap();
        store
            .insert_run(Run::new(flow.id, None), &mut admit_all)
            .unwrap();

        assert_eq!(store.runs_for_subject(&subject), vec![with]);
    }
}
