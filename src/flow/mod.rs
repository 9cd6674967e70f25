//! Flow Definitions and Run Records
//!
//! Data structures for the persisted side of the interpreter:
//!
//! - [`model`]: flow definitions and their action-node trees
//! - [`run`]: one execution instance of a flow
//! - [`trigger`]: named event bindings that start runs
//! - [`parser`]: YAML front end for flow definitions

pub mod model;
pub mod parser;
pub mod run;
pub mod trigger;

pub use model::{ActionNode, Flow, FlowId, InsertAt, NodeId, NodeSpec, TreeError};
pub use parser::{load_flow, ParseError};
pub use run::{Outcome, Run, RunId, RunStatus, SubjectRef};
pub use trigger::{Trigger, TriggerId};
