//! Flow Definition Model
//!
//! A [`Flow`] is an ordered forest of [`ActionNode`]s plus activation
//! and admission configuration. Nodes live in an arena owned by the
//! flow and reference each other by [`NodeId`], so a traversal cursor
//! is a plain index and the whole definition serializes cleanly.
//!
//! Tree edits go through the validated API ([`Flow::insert`],
//! [`Flow::move_node`]): a child must belong to the same flow as its
//! parent, and only action types registered with `has_children = true`
//! may gain children.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::action::registry::lookup_action;

/// Identifier of a flow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub u64);

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a node within its flow's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_FLOW_ID: AtomicU64 = AtomicU64::new(1);

fn next_flow_id() -> FlowId {
    FlowId(NEXT_FLOW_ID.fetch_add(1, Ordering::Relaxed))
}

/// Error raised by tree edits that would violate a structural invariant.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Cannot add child action to {0}")]
    ChildrenNotAllowed(String),

    #[error("Cannot add child action to a different flow")]
    CrossFlow,

    #[error("action name cannot be empty")]
    EmptyAction,

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("insert position {index} is out of range ({len} children)")]
    PositionOutOfRange { index: usize, len: usize },

    #[error("cannot move a node into its own subtree")]
    IntoOwnSubtree,
}

/// One node of a flow's action tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionNode {
    /// Registered name of the action type this node executes.
    pub action: String,

    /// Opaque configuration payload handed to the action on each visit.
    pub config: Value,

    flow: FlowId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ActionNode {
    /// The flow this node belongs to.
    pub fn flow(&self) -> FlowId {
        self.flow
    }

    /// Parent node, or `None` for a root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered child list.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Description of a node to insert, carrying the flow it claims to
/// belong to so cross-flow insertions can be rejected.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub flow: FlowId,
    pub action: String,
    pub config: Value,
}

impl NodeSpec {
    pub fn new(flow: FlowId, action: impl Into<String>, config: Value) -> Self {
        Self {
            flow,
            action: action.into(),
            config,
        }
    }
}

/// Target position for a node insertion or relocation.
#[derive(Debug, Clone, Copy)]
pub enum InsertAt {
    /// First child of `parent` (`None` = first root).
    First { parent: Option<NodeId> },

    /// `index`-th child of `parent` (`None` = `index`-th root).
    Nth {
        parent: Option<NodeId>,
        index: usize,
    },

    /// Immediately before an existing sibling.
    Before { sibling: NodeId },

    /// Immediately after an existing sibling.
    After { sibling: NodeId },
}

/// A flow definition: identity, activation window, admission limits and
/// the owned action-node forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub name: String,

    /// The flow admits runs once this instant has passed; `None` means
    /// the flow is inactive.
    pub active_at: Option<DateTime<Utc>>,

    /// Maximum number of non-Done runs for this flow (`None` = unlimited).
    pub max_concurrent: Option<u32>,

    /// Maximum number of runs ever created per subject (`None` = unlimited).
    pub max_per_subject: Option<u32>,

    /// Maximum number of non-Done runs per subject (`None` = unlimited).
    pub max_concurrent_per_subject: Option<u32>,

    nodes: Vec<ActionNode>,
    roots: Vec<NodeId>,
}

impl Flow {
    /// Creates a new, inactive flow definition with no nodes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: next_flow_id(),
            name: name.into().trim().to_string(),
            active_at: None,
            max_concurrent: None,
            max_per_subject: None,
            max_concurrent_per_subject: None,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Marks the flow active as of now.
    pub fn activate(mut self) -> Self {
        self.active_at = Some(Utc::now());
        self
    }

    /// Sets the activation instant.
    pub fn with_active_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.active_at = at;
        self
    }

    /// Returns true if the flow currently admits new runs.
    pub fn is_active(&self) -> bool {
        self.active_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }

    /// Ordered root nodes of the forest.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Looks up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&ActionNode> {
        self.nodes.get(id.0)
    }

    /// Ordered children of a node.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Parent of a node, `None` for roots.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// The sibling immediately after `id` at its level, if any.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.sibling_list(id);
        let pos = siblings.iter().position(|&s| s == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Number of ancestors above the node (roots have depth 0).
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(p) = current {
            depth += 1;
            current = self.parent(p);
        }
        depth
    }

    /// Ordered position of the node among its siblings.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.sibling_list(id).iter().position(|&s| s == id)
    }

    /// Number of node slots in the arena (removed subtrees leave
    /// tombstones so surviving ids stay stable).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the flow has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn sibling_list(&self, id: NodeId) -> &[NodeId] {
        match self.parent(id) {
            Some(p) => self.children(p),
            None => &self.roots,
        }
    }

    /// Appends a root node at the end of the forest.
    pub fn add_root(
        &mut self,
        action: impl Into<String>,
        config: Value,
    ) -> Result<NodeId, TreeError> {
        let index = self.roots.len();
        self.insert(
            NodeSpec::new(self.id, action, config),
            InsertAt::Nth {
                parent: None,
                index,
            },
        )
    }

    /// Appends a child at the end of `parent`'s child list.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        action: impl Into<String>,
        config: Value,
    ) -> Result<NodeId, TreeError> {
        let index = self.children(parent).len();
        self.insert(
            NodeSpec::new(self.id, action, config),
            InsertAt::Nth {
                parent: Some(parent),
                index,
            },
        )
    }

    /// Inserts a new node at an explicit position.
    ///
    /// Rejects specs claiming a different flow, empty action names,
    /// children under an action type not declared `has_children`, and
    /// out-of-range positions.
    pub fn insert(&mut self, spec: NodeSpec, at: InsertAt) -> Result<NodeId, TreeError> {
        if spec.flow != self.id {
            return Err(TreeError::CrossFlow);
        }
        if spec.action.trim().is_empty() {
            return Err(TreeError::EmptyAction);
        }

        let (parent, index) = self.resolve_position(at)?;
        if let Some(p) = parent {
            self.check_capability(p)?;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(ActionNode {
            action: spec.action,
            config: spec.config,
            flow: self.id,
            parent,
            children: Vec::new(),
        });
        self.attach(id, parent, index);
        Ok(id)
    }

    /// Moves an existing node (with its subtree) to a new position.
    pub fn move_node(&mut self, id: NodeId, at: InsertAt) -> Result<(), TreeError> {
        if self.node(id).is_none() {
            return Err(TreeError::UnknownNode(id));
        }

        let (parent, mut index) = self.resolve_position(at)?;
        if let Some(p) = parent {
            if p == id || self.is_descendant(p, id) {
                return Err(TreeError::IntoOwnSubtree);
            }
            self.check_capability(p)?;
        }

        // Detaching shifts positions at the source level; account for it
        // when the node re-enters the same sibling list.
        let old_parent = self.parent(id);
        if old_parent == parent {
            let old_index = self.position(id).ok_or(TreeError::UnknownNode(id))?;
            if old_index < index {
                index -= 1;
            }
        }

        self.detach(id);
        self.nodes[id.0].parent = parent;
        self.attach(id, parent, index);
        Ok(())
    }

    /// Removes a node and its whole subtree.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), TreeError> {
        if self.node(id).is_none() {
            return Err(TreeError::UnknownNode(id));
        }
        self.detach(id);

        // Mark the subtree unreachable instead of compacting the arena,
        // so surviving NodeIds stay stable for persisted cursors.
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            stack.extend(self.nodes[n.0].children.drain(..));
            self.nodes[n.0].parent = None;
            self.nodes[n.0].action = String::new();
        }
        Ok(())
    }

    fn resolve_position(&self, at: InsertAt) -> Result<(Option<NodeId>, usize), TreeError> {
        match at {
            InsertAt::First { parent } => {
                if let Some(p) = parent {
                    if self.node(p).is_none() {
                        return Err(TreeError::UnknownNode(p));
                    }
                }
                Ok((parent, 0))
            }
            InsertAt::Nth { parent, index } => {
                let len = match parent {
                    Some(p) => {
                        if self.node(p).is_none() {
                            return Err(TreeError::UnknownNode(p));
                        }
                        self.children(p).len()
                    }
                    None => self.roots.len(),
                };
                if index > len {
                    return Err(TreeError::PositionOutOfRange { index, len });
                }
                Ok((parent, index))
            }
            InsertAt::Before { sibling } => {
                let pos = self
                    .position(sibling)
                    .ok_or(TreeError::UnknownNode(sibling))?;
                Ok((self.parent(sibling), pos))
            }
            InsertAt::After { sibling } => {
                let pos = self
                    .position(sibling)
                    .ok_or(TreeError::UnknownNode(sibling))?;
                Ok((self.parent(sibling), pos + 1))
            }
        }
    }

    fn check_capability(&self, parent: NodeId) -> Result<(), TreeError> {
        let action = &self.nodes[parent.0].action;
        let has_children = lookup_action(action)
            .map(|a| a.has_children())
            .unwrap_or(false);
        if !has_children {
            return Err(TreeError::ChildrenNotAllowed(action.clone()));
        }
        Ok(())
    }

    fn attach(&mut self, id: NodeId, parent: Option<NodeId>, index: usize) {
        match parent {
            Some(p) => self.nodes[p.0].children.insert(index, id),
            None => self.roots.insert(index, id),
        }
    }

    fn detach(&mut self, id: NodeId) {
        match self.parent(id) {
            Some(p) => self.nodes[p.0].children.retain(|&c| c != id),
            None => self.roots.retain(|&r| r != id),
        }
    }

    fn is_descendant(&self, candidate: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(candidate);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }
}
