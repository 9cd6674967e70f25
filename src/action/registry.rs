//! Action and Trigger Registries
//!
//! Process-wide lookup tables, populated once at startup and treated
//! as immutable afterwards in production. Registration validates
//! names (no duplicates, non-empty, bounded length); lookups are the
//! hot path the executor hits on every node visit.
//!
//! Test harnesses may use [`registry_snapshot`]/[`registry_restore`]
//! to scope registry mutations; production code never should.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Once, RwLock};

use once_cell::sync::Lazy;
use thiserror::Error;

use super::builtin;
use super::Action;

/// Registered names must stay below this length.
pub const MAX_NAME_LEN: usize = 100;

static ACTIONS: Lazy<RwLock<HashMap<String, Arc<dyn Action>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static TRIGGERS: Lazy<RwLock<HashSet<String>>> = Lazy::new(|| RwLock::new(HashSet::new()));

/// Error raised when a registration is rejected.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Action {0} is already registered")]
    DuplicateAction(String),

    #[error("Action name cannot be empty")]
    EmptyActionName,

    #[error("Action name is too long, must be less than {} characters", MAX_NAME_LEN + 1)]
    ActionNameTooLong,

    #[error("Trigger {0} is already registered")]
    DuplicateTrigger(String),

    #[error("Trigger name cannot be empty")]
    EmptyTriggerName,

    #[error("Trigger name is too long, must be less than {} characters", MAX_NAME_LEN + 1)]
    TriggerNameTooLong,
}

/// Registers an action implementation under its declared name.
pub fn register_action(action: Arc<dyn Action>) -> Result<(), RegistryError> {
    let name = action.name().to_string();
    if name.is_empty() {
        return Err(RegistryError::EmptyActionName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RegistryError::ActionNameTooLong);
    }

    let mut actions = ACTIONS.write().expect("action registry poisoned");
    if actions.contains_key(&name) {
        return Err(RegistryError::DuplicateAction(name));
    }
    actions.insert(name, action);
    Ok(())
}

/// Looks up the implementation registered for an action-type name.
pub fn lookup_action(name: &str) -> Option<Arc<dyn Action>> {
    ACTIONS
        .read()
        .expect("action registry poisoned")
        .get(name)
        .cloned()
}

/// Declares a trigger event name.
pub fn register_trigger(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::EmptyTriggerName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RegistryError::TriggerNameTooLong);
    }

    let mut triggers = TRIGGERS.write().expect("trigger registry poisoned");
    if !triggers.insert(name.to_string()) {
        return Err(RegistryError::DuplicateTrigger(name.to_string()));
    }
    Ok(())
}

/// Returns true if the trigger event name has been declared.
pub fn trigger_registered(name: &str) -> bool {
    TRIGGERS
        .read()
        .expect("trigger registry poisoned")
        .contains(name)
}

/// Copies the current action table. Test harnesses only.
pub fn registry_snapshot() -> HashMap<String, Arc<dyn Action>> {
    ACTIONS.read().expect("action registry poisoned").clone()
}

/// Replaces the action table wholesale. Test harnesses only.
pub fn registry_restore(snapshot: HashMap<String, Arc<dyn Action>>) {
    *ACTIONS.write().expect("action registry poisoned") = snapshot;
}

static BUILTINS: Once = Once::new();

/// Registers the built-in action set. Safe to call more than once;
/// only the first call registers.
pub fn register_builtin_actions() {
    BUILTINS.call_once(|| {
        for action in builtin::all() {
            // Names are static and unique; a failure here is a bug in
            // the builtin set itself.
            if let Err(e) = register_action(action) {
                panic!("builtin action registration failed: {}", e);
            }
        }
    });
}
