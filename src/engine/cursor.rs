//! Tree Cursor & Traversal Table
//!
//! The cursor is a node plus a phase: `Entering` means the executor is
//! about to call the node's `run`, `Returning` means the node's subtree
//! just finished and `return_from_children` is next. The ancestor stack
//! is implicit in the arena's parent links, which keeps the persisted
//! cursor down to a single node id.
//!
//! [`advance`] maps the directive an action returned to the next step.
//! Of note: `Break` unwinds to the *outermost* ancestor being
//! traversed — not the nearest enclosing loop — and no ancestor sees a
//! `return_from_children` call on the way out. This matches the
//! observed product behavior and is relied upon by flows in the field.

use crate::action::Directive;
use crate::flow::{Flow, NodeId, Outcome};

/// Which call the executor makes next on the cursor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// About to call `run`.
    Entering,

    /// About to call `return_from_children`.
    Returning,
}

/// Position of the traversal within a flow's forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub node: NodeId,
    pub phase: Phase,
}

impl Cursor {
    pub fn entering(node: NodeId) -> Self {
        Self {
            node,
            phase: Phase::Entering,
        }
    }

    pub fn returning(node: NodeId) -> Self {
        Self {
            node,
            phase: Phase::Returning,
        }
    }
}

/// Outcome of one application of the traversal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Keep walking at the given cursor.
    Step(Cursor),

    /// The run is finished with this outcome.
    Finished(Outcome),

    /// Persist the cursor and return control to the caller.
    Suspend { repeat: bool },
}

/// Starting cursor for a fresh run: the first root, entering.
/// `None` for an empty flow (which completes immediately).
pub fn start(flow: &Flow) -> Option<Cursor> {
    flow.roots().first().map(|&root| Cursor::entering(root))
}

/// The cursor to resume at after a non-repeat suspension: the
/// suspended node is treated as having just returned `Continue`.
pub fn resume_after(flow: &Flow, node: NodeId) -> Next {
    advance_continue(flow, node)
}

/// Applies the traversal table to the directive produced at `node`.
pub fn advance(flow: &Flow, node: NodeId, directive: Directive) -> Next {
    match directive {
        Directive::Continue => advance_continue(flow, node),

        Directive::Enter => {
            // A childless node cannot be descended into; Enter then
            // behaves exactly like Continue.
            match flow.children(node).first() {
                Some(&child) => Next::Step(Cursor::entering(child)),
                None => advance_continue(flow, node),
            }
        }

        Directive::Leave => match flow.parent(node) {
            Some(parent) => Next::Step(Cursor::returning(parent)),
            None => Next::Finished(Outcome::Complete),
        },

        Directive::Break => {
            let outermost = outermost_ancestor(flow, node);
            match flow.next_sibling(outermost) {
                Some(sibling) => Next::Step(Cursor::entering(sibling)),
                None => Next::Finished(Outcome::Complete),
            }
        }

        Directive::Abort => Next::Finished(Outcome::Aborted),

        Directive::Suspend => Next::Suspend { repeat: false },

        Directive::SuspendAndRepeat => Next::Suspend { repeat: true },
    }
}

fn advance_continue(flow: &Flow, node: NodeId) -> Next {
    if let Some(sibling) = flow.next_sibling(node) {
        return Next::Step(Cursor::entering(sibling));
    }
    match flow.parent(node) {
        Some(parent) => Next::Step(Cursor::returning(parent)),
        None => Next::Finished(Outcome::Complete),
    }
}

/// The root-level ancestor of `node` (the node itself if it is a root).
fn outermost_ancestor(flow: &Flow, node: NodeId) -> NodeId {
    let mut current = node;
    while let Some(parent) = flow.parent(current) {
        current = parent;
    }
    current
}
