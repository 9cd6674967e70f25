//! Built-in Actions
//!
//! The action vocabulary shipped with the crate: state manipulation,
//! conditionals and loops, timed delays, and sub-flow instantiation.
//! [`crate::action::registry::register_builtin_actions`] registers all
//! of them at startup.

pub mod control;
pub mod delay;
pub mod start_flow;
pub mod state;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::engine::error::ActionError;

use super::Action;

pub use control::{Abort, Break, ForLoop, If, Leave, WhileLoop};
pub use delay::Delay;
pub use start_flow::StartFlow;
pub use state::{SetState, UpdateState};

/// The full built-in set, in registration order.
pub fn all() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(SetState),
        Arc::new(UpdateState),
        Arc::new(If),
        Arc::new(WhileLoop),
        Arc::new(ForLoop),
        Arc::new(Delay),
        Arc::new(Leave),
        Arc::new(Break),
        Arc::new(Abort),
        Arc::new(StartFlow),
    ]
}

/// Decodes a node's configuration payload, treating a null payload as
/// the config type's default.
fn decode<T: DeserializeOwned + Default>(action: &str, config: &Value) -> Result<T, ActionError> {
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone())
        .map_err(|e| ActionError::failed(format!("invalid {} configuration: {}", action, e)))
}
