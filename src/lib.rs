//! Flowrunner - Durable Workflow Interpreter
//!
//! Executes trees of configurable actions against subject entities,
//! persisting enough state to suspend mid-execution and resume later,
//! with admission control on run creation and hot-loop protection on
//! execution.
//!
//! # Architecture
//!
//! The library is organized into five main modules:
//!
//! - [`flow`]: flow definitions, action-node trees, run and trigger records
//! - [`action`]: the action contract, the registries and the built-in actions
//! - [`engine`]: the run executor, admission control and trigger evaluation
//! - [`store`]: the storage seam and its in-memory reference implementation
//! - [`eval`]: the expression-evaluation seam and a small default evaluator
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use flowrunner::action::registry::register_builtin_actions;
//! use flowrunner::engine::Engine;
//! use flowrunner::flow::parser::parse_flow;
//! use flowrunner::store::FlowStore;
//! use flowrunner::{MemoryStore, Outcome};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     register_builtin_actions();
//!
//!     let flow = parse_flow(
//!         "name: demo\nactive: true\nactions:\n  - action: SetState\n    config:\n      state: {greeted: true}\n",
//!     )?;
//!     let engine = Engine::new(Arc::new(MemoryStore::new()));
//!     engine.store().insert_flow(flow.clone());
//!
//!     let run = engine.start_run(&flow, None)?.expect("admitted");
//!     assert_eq!(run.outcome, Some(Outcome::Complete));
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod engine;
pub mod eval;
pub mod flow;
pub mod store;

// Re-export commonly used types
pub use action::{Action, ActionCtx, Directive};
pub use engine::Engine;
pub use flow::{load_flow, Flow, Outcome, Run, RunStatus, SubjectRef};
pub use store::MemoryStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Flowrunner";
