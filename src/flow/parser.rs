//! Flow Definition Parser
//!
//! Loads flow definitions from YAML files into [`Flow`] values.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: onboarding
//! active: true
//! max_concurrent: 4
//! actions:
//!   - action: SetState
//!     config:
//!       state: {x: 0}
//!   - action: WhileLoop
//!     config: {condition: "x < 5"}
//!     children:
//!       - action: UpdateState
//!         config:
//!           state: {x: "x + 1"}
//!           evaluate: true
//! ```
//!
//! Structure is validated while building: action names must be
//! registered, and children are only accepted under action types
//! declared `has_children`.

use std::fs;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::action::registry::lookup_action;

use super::model::{Flow, NodeId, TreeError};

/// Error raised while loading a flow definition file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read flow file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse flow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown action type '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[derive(Debug, Deserialize)]
struct FlowDoc {
    name: String,

    #[serde(default)]
    active: Option<bool>,

    #[serde(default)]
    active_at: Option<DateTime<Utc>>,

    #[serde(default)]
    max_concurrent: Option<u32>,

    #[serde(default)]
    max_per_subject: Option<u32>,

    #[serde(default)]
    max_concurrent_per_subject: Option<u32>,

    #[serde(default)]
    actions: Vec<NodeDoc>,
}

#[derive(Debug, Deserialize)]
struct NodeDoc {
    action: String,

    #[serde(default)]
    config: Value,

    #[serde(default)]
    children: Vec<NodeDoc>,
}

/// Loads a flow definition from a YAML file.
pub fn load_flow(path: &str) -> Result<Flow, ParseError> {
    info!("Loading flow definition from: {}", path);

    let content = fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_string(),
        source,
    })?;
    debug!("flow definition loaded ({} bytes)", content.len());

    parse_flow(&content)
}

/// Parses a flow definition from a YAML string.
pub fn parse_flow(content: &str) -> Result<Flow, ParseError> {
    let doc: FlowDoc = serde_yaml::from_str(content)?;

    let mut flow = Flow::new(doc.name);
    flow.active_at = match (doc.active_at, doc.active) {
        (Some(at), _) => Some(at),
        (None, Some(true)) => Some(Utc::now()),
        _ => None,
    };
    flow.max_concurrent = doc.max_concurrent;
    flow.max_per_subject = doc.max_per_subject;
    flow.max_concurrent_per_subject = doc.max_concurrent_per_subject;

    add_nodes(&mut flow, None, &doc.actions)?;

    info!(
        "Flow '{}' loaded: {} nodes, active: {}",
        flow.name,
        flow.len(),
        flow.is_active()
    );
    Ok(flow)
}

fn add_nodes(flow: &mut Flow, parent: Option<NodeId>, docs: &[NodeDoc]) -> Result<(), ParseError> {
    for doc in docs {
        if lookup_action(&doc.action).is_none() {
            return Err(ParseError::UnknownAction(doc.action.clone()));
        }
        let id = match parent {
            Some(parent) => flow.add_child(parent, doc.action.clone(), doc.config.clone())?,
            None => flow.add_root(doc.action.clone(), doc.config.clone())?,
        };
        add_nodes(flow, Some(id), &doc.children)?;
    }
    Ok(())
}
