//! Execution context shared by every node in a run.
//!
//! The context holds three stores:
//!
//! - **state**: global, mutable, visible to all nodes; the output of the run
//! - **config**: read-only values supplied once at start
//! - **node context**: private per-node-name maps used for loop bookkeeping
//!   and loop-local bindings (`item`, `index`)
//!
//! `ExecutionContext` is a cheap handle; clones share the same stores. Nodes
//! of one wave access it concurrently with no isolation beyond the short
//! critical section of each accessor.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::path::{get_var, lookup, lookup_in, set_var, split_head};

/// A private per-node store
pub type NodeScope = Map<String, Value>;

#[derive(Debug, Default)]
struct ContextData {
    state: Map<String, Value>,
    node_context: HashMap<String, NodeScope>,
}

/// Shared state, config and node-scoped storage for one workflow run
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    data: Arc<RwLock<ContextData>>,
    config: Arc<Map<String, Value>>,
}

/// Serializable copy of a context, for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub state: Map<String, Value>,
    pub config: Map<String, Value>,
    pub node_context: HashMap<String, NodeScope>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with initial state and config
    pub fn with_data(state: Map<String, Value>, config: Map<String, Value>) -> Self {
        Self {
            data: Arc::new(RwLock::new(ContextData {
                state,
                node_context: HashMap::new(),
            })),
            config: Arc::new(config),
        }
    }

    /// Resolve a dotted path against global state, or return `default`.
    pub fn get(&self, path: &str, default: Value) -> Value {
        let data = self.data.read();
        lookup_in(&data.state, path).cloned().unwrap_or(default)
    }

    /// Write a value into global state.
    pub fn set(&self, path: &str, value: Value) {
        set_var(&mut self.data.write().state, path, value);
    }

    /// Remove a top-level key from global state.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().state.remove(key)
    }

    /// Check whether global state has a top-level key.
    pub fn contains(&self, key: &str) -> bool {
        self.data.read().state.contains_key(key)
    }

    /// Resolve a dotted path against the read-only config.
    pub fn config(&self, path: &str, default: Value) -> Value {
        lookup_in(&self.config, path).cloned().unwrap_or(default)
    }

    /// Copy of a node's private scope, if it has one.
    pub fn node_context(&self, name: &str) -> Option<NodeScope> {
        self.data.read().node_context.get(name).cloned()
    }

    /// Replace a node's private scope.
    pub fn set_node_context(&self, name: &str, scope: NodeScope) {
        self.data
            .write()
            .node_context
            .insert(name.to_string(), scope);
    }

    /// Set one key in a node's private scope, creating the scope if needed.
    pub fn update_node_context(&self, name: &str, key: &str, value: Value) {
        self.data
            .write()
            .node_context
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Mutate an existing node scope in place.
    ///
    /// Returns `None` without calling `f` if the node has no scope.
    pub fn modify_node_context<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut NodeScope) -> R,
    ) -> Option<R> {
        self.data.write().node_context.get_mut(name).map(f)
    }

    /// Drop a node's private scope.
    pub fn clear_node_context(&self, name: &str) -> Option<NodeScope> {
        self.data.write().node_context.remove(name)
    }

    /// Copy of the global state.
    pub fn state(&self) -> Map<String, Value> {
        self.data.read().state.clone()
    }

    /// Copy of every node scope currently alive.
    pub fn node_contexts(&self) -> HashMap<String, NodeScope> {
        self.data.read().node_context.clone()
    }

    /// Copy of the whole context.
    pub fn snapshot(&self) -> ContextSnapshot {
        let data = self.data.read();
        ContextSnapshot {
            state: data.state.clone(),
            config: (*self.config).clone(),
            node_context: data.node_context.clone(),
        }
    }

    /// View of this context through a chain of active loop scopes.
    pub fn scoped<'a>(&'a self, scopes: &'a [String]) -> ScopedContext<'a> {
        ScopedContext {
            context: self,
            scopes,
        }
    }
}

/// A context as seen by one frontier entry.
///
/// `scopes` lists the node scopes that are visible, outermost first. For a
/// top-level key, the innermost scope that defines it wins; global state is
/// consulted last. A node outside a loop's body never sees that loop's
/// bindings.
#[derive(Debug, Clone, Copy)]
pub struct ScopedContext<'a> {
    context: &'a ExecutionContext,
    scopes: &'a [String],
}

impl<'a> ScopedContext<'a> {
    /// The underlying shared context
    pub fn context(&self) -> &'a ExecutionContext {
        self.context
    }

    /// Visible scopes, outermost first
    pub fn scopes(&self) -> &'a [String] {
        self.scopes
    }

    /// Resolve a dotted path, preferring the innermost scope that defines
    /// the path's first segment.
    pub fn get(&self, path: &str, default: Value) -> Value {
        let (head, rest) = split_head(path);
        let data = self.context.data.read();

        for scope in self.scopes.iter().rev() {
            if let Some(root) = data.node_context.get(scope).and_then(|s| s.get(head)) {
                let found = match rest {
                    Some(rest) => lookup(root, rest),
                    None => Some(root),
                };
                return found.cloned().unwrap_or(default);
            }
        }

        lookup_in(&data.state, path).cloned().unwrap_or(default)
    }

    /// Merged view of state and visible scopes, for expression evaluation.
    pub fn bindings(&self) -> Value {
        let data = self.context.data.read();
        let mut merged = data.state.clone();
        for scope in self.scopes {
            if let Some(values) = data.node_context.get(scope) {
                for (key, value) in values {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        Value::Object(merged)
    }

    /// Resolve a path against the merged bindings.
    pub fn resolve(&self, path: &str, default: Value) -> Value {
        get_var(&self.bindings(), path, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_get_and_set_state() {
        let ctx = ExecutionContext::new();
        ctx.set("a", json!({"b": 5}));

        assert_eq!(ctx.get("a.b", Value::Null), json!(5));
        assert_eq!(ctx.get("missing", json!("fallback")), json!("fallback"));
        assert!(ctx.contains("a"));

        ctx.remove("a");
        assert!(!ctx.contains("a"));
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = ExecutionContext::new();
        let other = ctx.clone();
        other.set("x", json!(1));
        assert_eq!(ctx.get("x", Value::Null), json!(1));
    }

    #[test]
    fn test_config_is_read_only_lookup() {
        let ctx = ExecutionContext::with_data(Map::new(), object(json!({"api": {"retries": 3}})));
        assert_eq!(ctx.config("api.retries", Value::Null), json!(3));
        assert_eq!(ctx.config("api.timeout", json!(30)), json!(30));
    }

    #[test]
    fn test_node_context_lifecycle() {
        let ctx = ExecutionContext::new();
        assert!(ctx.node_context("loop").is_none());

        ctx.update_node_context("loop", "index", json!(0));
        assert_eq!(ctx.node_context("loop").unwrap().get("index"), Some(&json!(0)));

        let bumped = ctx.modify_node_context("loop", |scope| {
            scope.insert("index".to_string(), json!(1));
            1
        });
        assert_eq!(bumped, Some(1));
        assert_eq!(ctx.modify_node_context("other", |_| ()), None);

        ctx.clear_node_context("loop");
        assert!(ctx.node_contexts().is_empty());
    }

    #[test]
    fn test_scoped_lookup_shadows_state() {
        let ctx = ExecutionContext::new();
        ctx.set("item", json!("global"));
        ctx.set("total", json!(10));
        ctx.set_node_context("loop", object(json!({"item": {"id": 4}, "index": 2})));

        let scopes = vec!["loop".to_string()];
        let scoped = ctx.scoped(&scopes);
        assert_eq!(scoped.get("item.id", Value::Null), json!(4));
        assert_eq!(scoped.get("item.name", json!("none")), json!("none"));
        assert_eq!(scoped.get("total", Value::Null), json!(10));

        // Outside the loop the global value is visible again
        let unscoped = ctx.scoped(&[]);
        assert_eq!(unscoped.get("item", Value::Null), json!("global"));
    }

    #[test]
    fn test_inner_scope_wins_over_outer() {
        let ctx = ExecutionContext::new();
        ctx.set_node_context("outer", object(json!({"item": "o", "index": 0})));
        ctx.set_node_context("inner", object(json!({"item": "i"})));

        let scopes = vec!["outer".to_string(), "inner".to_string()];
        let scoped = ctx.scoped(&scopes);
        assert_eq!(scoped.get("item", Value::Null), json!("i"));
        assert_eq!(scoped.get("index", Value::Null), json!(0));

        let bindings = scoped.bindings();
        assert_eq!(bindings["item"], json!("i"));
        assert_eq!(scoped.resolve("index", Value::Null), json!(0));
    }

    #[test]
    fn test_repeated_get_is_stable() {
        let ctx = ExecutionContext::new();
        ctx.set("user", json!({"name": "ada", "tags": ["x"]}));
        ctx.set_node_context("loop", object(json!({"item": {"id": 7}})));

        let first = ctx.get("user.name", Value::Null);
        assert_eq!(ctx.get("user.name", Value::Null), first);
        assert_eq!(ctx.get("user", Value::Null), ctx.get("user", Value::Null));
        assert_eq!(ctx.get("nope", json!(1)), ctx.get("nope", json!(1)));

        let scopes = vec!["loop".to_string()];
        let scoped = ctx.scoped(&scopes);
        let item = scoped.get("item.id", Value::Null);
        assert_eq!(item, json!(7));
        assert_eq!(scoped.get("item.id", Value::Null), item);
        assert_eq!(scoped.get("user.tags", Value::Null), json!(["x"]));
        assert_eq!(scoped.get("user.tags", Value::Null), json!(["x"]));
    }

    #[test]
    fn test_snapshot_serializes() {
        let ctx = ExecutionContext::new();
        ctx.set("x", json!(1));
        let json = serde_json::to_value(ctx.snapshot()).unwrap();
        assert_eq!(json["state"], json!({"x": 1}));
        assert_eq!(json["nodeContext"], json!({}));
    }
}
