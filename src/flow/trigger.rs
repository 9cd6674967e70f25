//! Trigger Records
//!
//! A trigger binds a named external event to a flow. When the event
//! fires, every active trigger with that name is considered: its
//! optional condition is evaluated against the subject, and a run is
//! created through admission control if the condition holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::FlowId;

/// Identifier of a trigger record, assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub u64);

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named event binding for a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    pub flow: FlowId,

    /// Event name this trigger answers to.
    pub name: String,

    /// The trigger matches events once this instant has passed; `None`
    /// means the trigger is inactive.
    pub active_at: Option<DateTime<Utc>>,

    /// Optional condition evaluated against the subject; an empty or
    /// missing condition always matches.
    pub condition: Option<String>,
}

impl Trigger {
    /// Creates an inactive trigger for a flow.
    pub fn new(flow: FlowId, name: impl Into<String>) -> Self {
        Self {
            id: TriggerId(0),
            flow,
            name: name.into(),
            active_at: None,
            condition: None,
        }
    }

    /// Marks the trigger active as of now.
    pub fn activate(mut self) -> Self {
        self.active_at = Some(Utc::now());
        self
    }

    /// Sets the condition expression.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Returns true if the trigger currently matches events.
    pub fn is_active(&self) -> bool {
        self.active_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trigger_is_inactive() {
        let trigger = Trigger::new(FlowId(1), "signup");
        assert!(!trigger.is_active());
        assert!(trigger.condition.is_none());
    }

    #[test]
    fn test_activation() {
        let trigger = Trigger::new(FlowId(1), "signup").activate();
        assert!(trigger.is_active());

        let future = Utc::now() + chrono::Duration::hours(1);
        let mut trigger = Trigger::new(FlowId(1), "signup");
        trigger.active_at = Some(future);
        assert!(!trigger.is_active());
    }

    #[test]
    fn test_condition_builder() {
        let trigger = Trigger::new(FlowId(1), "signup")
            .with_condition("subject.username == 'example'");
        assert_eq!(
            trigger.condition.as_deref(),
            Some("subject.username == 'example'")
        );
    }
}
