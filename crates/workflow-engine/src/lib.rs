//! Workflow Engine - wave-synchronous execution of workflow graphs
//!
//! This crate runs directed graphs of named nodes that share one mutable
//! context. It supports:
//!
//! - Variable assignment with dotted-path resolution
//! - Conditional branching through a pluggable condition evaluator
//! - Loops over collections, with loop-local `item`/`index` bindings
//! - Concurrent execution of independent branches within a wave
//! - Progress reporting through an [`EventSink`]
//!
//! # Architecture
//!
//! - [`GraphBuilder`]: Assembles and validates a [`Graph`] from code or a
//!   [`WorkflowDocument`]
//! - [`GraphExecutor`]: Runs the graph wave by wave; a wave fully completes
//!   before the next one is scheduled
//! - [`ExecutionContext`]: Shared `state`, read-only `config`, and per-node
//!   private scopes
//!
//! # Example
//!
//! ```ignore
//! use workflow_engine::{ExecutionContext, GraphBuilder};
//! use serde_json::json;
//!
//! let graph = GraphBuilder::new("check")
//!     .add_set("init", "x", json!(1))
//!     .add_condition("is_one", json!({"==": [{"var": "x"}, 1]}))
//!     .add_set("yes", "result", json!("yes"))
//!     .connect("init", "main", "is_one")
//!     .connect("is_one", "true", "yes")
//!     .build()?;
//!
//! let ctx = graph.execute(ExecutionContext::new()).await?;
//! assert_eq!(ctx.get("result", json!(null)), json!("yes"));
//! ```

pub mod builder;
pub mod connection;
pub mod context;
pub mod document;
pub mod error;
pub mod events;
pub mod executor;
pub mod expression;
pub mod graph;
pub mod nodes;
pub mod path;
pub mod validation;

// Re-export key types
pub use builder::GraphBuilder;
pub use connection::{Connection, ConnectionLabel, NodeIndex};
pub use context::{ContextSnapshot, ExecutionContext, NodeScope, ScopedContext};
pub use document::{RawConnection, RawNode, WorkflowDocument};
pub use error::{Result, WorkflowError};
pub use events::{EventError, EventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use executor::{ExecutorOptions, GraphExecutor, RunSummary};
pub use expression::{ConditionEvaluator, JsonLogic};
pub use graph::Graph;
pub use nodes::{Node, NodeBehavior, NodeDescription, NodeKind, NodeType, ScopeTransition};
pub use validation::ValidationError;
