//! *weft* — a concurrent hierarchical dataflow framework for event
//! processing.
//!
//! Computational nodes (transforms, reductions, filters, splitters,
//! monitors, outputs) are declared over named *products*; the framework
//! wires them into a directed graph along product-name dependencies and
//! runs them in parallel, handling hierarchical data (runs, events,
//! sub-events created dynamically by splitters) and the end-of-scope flush
//! tokens that drain reductions at the right boundaries.
//!
//! ```
//! use weft::{Graph, Inputs, Products, ProductStore, Registry};
//!
//! let mut registry = Registry::new();
//! registry.expect_from_source (["number"]);
//! registry.declare_transform ("double", |inputs : &Inputs| {
//!   let number : &i64 = inputs.get ("number")?;
//!   Ok (Products::new().with ("doubled", number * 2))
//! }).unwrap()
//!   .input (["number"])
//!   .output (["doubled"]);
//! registry.declare_monitor ("check", |inputs : &Inputs| {
//!   assert_eq!(*inputs.get::<i64> ("doubled")?, 6);
//!   Ok (())
//! }).unwrap()
//!   .input (["doubled"]);
//!
//! let store  = ProductStore::base (Products::new().with ("number", 3i64));
//! let report = Graph::run_once (registry, store).execute().unwrap();
//! assert_eq!(report.calls_for ("check"), 1);
//! ```

////////////////////////////////////////////////////////////////////////////////
//  modules
////////////////////////////////////////////////////////////////////////////////

pub mod graph;
pub mod level;
pub mod message;
pub mod node;
pub mod store;

////////////////////////////////////////////////////////////////////////////////
//  reexports
////////////////////////////////////////////////////////////////////////////////

pub use graph::{
  DeclarationError, FinalizeError, Graph, GraphError, Registry, Report
};
pub use level::{FlushCounts, LevelId};
pub use message::{FilterResult, FlushToken, Message, Payload};
pub use node::{Concurrency, Generator, Inputs, NodeError, NodeKind};
pub use store::{Product, ProductStore, Products};
