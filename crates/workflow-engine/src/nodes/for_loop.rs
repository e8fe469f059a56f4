//! Loop nodes.
//!
//! A loop is a `for` node whose `body` edge leads to a chain of nodes that
//! ends in an `end_loop` node wired back to the `for` node. Progress lives in
//! the `for` node's private scope:
//!
//! | Key | Contents |
//! |-----|----------|
//! | `__collection` | The collection, materialized on the first visit |
//! | `index` | Current position; only `end_loop` advances it |
//! | `item` | Element at `index`, while in bounds |
//!
//! When `index` runs past the collection the scope is dropped and the `exit`
//! edge is followed, so a later visit starts a fresh iteration.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{string_parameter, NodeBehavior, NodeType, ScopeTransition};
use crate::connection::{target_with_label, Connection, ConnectionLabel, NodeIndex};
use crate::context::{NodeScope, ScopedContext};
use crate::error::Result;

/// Scope key holding the materialized collection
pub const COLLECTION_KEY: &str = "__collection";
/// Scope key holding the current index
pub const INDEX_KEY: &str = "index";
/// Scope key holding the current element
pub const ITEM_KEY: &str = "item";

/// Iterates over a collection resolved from the context.
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoopNode {
    collection: Value,
    iterator_var: Option<String>,
    index_var: Option<String>,
    body_node: Option<NodeIndex>,
    exit_node: Option<NodeIndex>,
}

impl ForLoopNode {
    /// Parameter holding the collection path (or a literal array)
    pub const PARAM_COLLECTION: &'static str = "collection";
    /// Parameter naming a state variable mirroring `item`
    pub const PARAM_ITERATOR_VAR: &'static str = "iterator_var";
    /// Parameter naming a state variable mirroring `index`
    pub const PARAM_INDEX_VAR: &'static str = "index_var";

    /// Create a loop over `collection`
    pub fn new(collection: Value) -> Self {
        Self {
            collection,
            iterator_var: None,
            index_var: None,
            body_node: None,
            exit_node: None,
        }
    }

    /// Also publish the current element into state under `name`
    pub fn with_iterator_var(mut self, name: impl Into<String>) -> Self {
        self.iterator_var = Some(name.into());
        self
    }

    /// Also publish the current index into state under `name`
    pub fn with_index_var(mut self, name: impl Into<String>) -> Self {
        self.index_var = Some(name.into());
        self
    }

    pub(crate) fn from_parameters(parameters: &Value) -> Option<Self> {
        let mut node = Self::new(parameters.get(Self::PARAM_COLLECTION)?.clone());
        node.iterator_var = string_parameter(parameters, Self::PARAM_ITERATOR_VAR);
        node.index_var = string_parameter(parameters, Self::PARAM_INDEX_VAR);
        Some(node)
    }

    pub(crate) fn bind(&mut self, connections: &[Connection]) {
        self.body_node = target_with_label(connections, &ConnectionLabel::Body);
        self.exit_node = target_with_label(connections, &ConnectionLabel::Exit);
    }

    /// Successor for each iteration
    pub fn body_node(&self) -> Option<NodeIndex> {
        self.body_node
    }

    /// Successor once the collection is exhausted
    pub fn exit_node(&self) -> Option<NodeIndex> {
        self.exit_node
    }

    fn materialize(&self, ctx: ScopedContext<'_>) -> Vec<Value> {
        let resolved = match &self.collection {
            Value::String(path) => ctx.get(path, Value::Null),
            literal => literal.clone(),
        };
        match resolved {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    /// Publish `item` for the current index; returns `(index, item)` if in bounds.
    fn publish(scope: &mut NodeScope) -> Option<(usize, Value)> {
        let index = current_index(scope);
        let item = scope
            .get(COLLECTION_KEY)
            .and_then(Value::as_array)
            .and_then(|items| items.get(index))
            .cloned();

        match item {
            Some(item) => {
                scope.insert(ITEM_KEY.to_string(), item.clone());
                Some((index, item))
            }
            None => {
                scope.remove(ITEM_KEY);
                None
            }
        }
    }
}

fn current_index(scope: &NodeScope) -> usize {
    scope
        .get(INDEX_KEY)
        .and_then(Value::as_u64)
        .map(|i| i as usize)
        .unwrap_or(0)
}

fn in_bounds(scope: &NodeScope) -> bool {
    let len = scope
        .get(COLLECTION_KEY)
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    current_index(scope) < len
}

#[async_trait]
impl NodeBehavior for ForLoopNode {
    fn node_type(&self) -> NodeType {
        NodeType::ForLoop
    }

    async fn execute(&self, name: &str, ctx: ScopedContext<'_>) -> Result<()> {
        let context = ctx.context();

        let started = context
            .node_context(name)
            .is_some_and(|scope| scope.contains_key(INDEX_KEY));
        if !started {
            let items = self.materialize(ctx);
            log::debug!("ForLoopNode {}: starting over {} items", name, items.len());

            let mut scope = NodeScope::new();
            scope.insert(COLLECTION_KEY.to_string(), Value::Array(items));
            scope.insert(INDEX_KEY.to_string(), Value::from(0));
            context.set_node_context(name, scope);
        }

        let current = context.modify_node_context(name, Self::publish).flatten();
        if let Some((index, item)) = current {
            log::debug!("ForLoopNode {}: iteration {}", name, index);
            if let Some(var) = &self.iterator_var {
                context.set(var, item);
            }
            if let Some(var) = &self.index_var {
                context.set(var, Value::from(index));
            }
        }
        Ok(())
    }

    fn determine_next(
        &self,
        name: &str,
        _connections: &[Connection],
        ctx: ScopedContext<'_>,
    ) -> Result<Vec<NodeIndex>> {
        let context = ctx.context();
        let scope = context.node_context(name);

        if scope.as_ref().is_some_and(in_bounds) {
            return Ok(self.body_node.into_iter().collect());
        }

        if scope.is_some() {
            log::debug!("ForLoopNode {}: complete", name);
            context.clear_node_context(name);
            if let Some(var) = &self.iterator_var {
                context.remove(var);
            }
            if let Some(var) = &self.index_var {
                context.remove(var);
            }
        }
        Ok(self.exit_node.into_iter().collect())
    }

    fn scope_transition(&self, name: &str, target: NodeIndex) -> ScopeTransition {
        if self.body_node == Some(target) {
            ScopeTransition::Enter(name.to_string())
        } else {
            ScopeTransition::Leave(name.to_string())
        }
    }

    fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert(Self::PARAM_COLLECTION.to_string(), self.collection.clone());
        details.insert(
            Self::PARAM_ITERATOR_VAR.to_string(),
            self.iterator_var.clone().map_or(Value::Null, Value::String),
        );
        details.insert(
            Self::PARAM_INDEX_VAR.to_string(),
            self.index_var.clone().map_or(Value::Null, Value::String),
        );
        details
    }
}

/// The `for` node an `end_loop` node closes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopTarget {
    pub index: NodeIndex,
    pub name: String,
}

/// Advances the loop it is wired back to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndLoopNode {
    loop_node: Option<LoopTarget>,
}

impl EndLoopNode {
    /// Create an end-loop node; the loop target is resolved when the graph is assembled
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind_loop(&mut self, target: Option<LoopTarget>) {
        self.loop_node = target;
    }

    /// The loop this node closes, if wired
    pub fn loop_node(&self) -> Option<&LoopTarget> {
        self.loop_node.as_ref()
    }
}

#[async_trait]
impl NodeBehavior for EndLoopNode {
    fn node_type(&self) -> NodeType {
        NodeType::EndLoop
    }

    async fn execute(&self, name: &str, ctx: ScopedContext<'_>) -> Result<()> {
        let Some(target) = &self.loop_node else {
            log::warn!("EndLoopNode {}: not connected to a for node", name);
            return Ok(());
        };

        ctx.context().modify_node_context(&target.name, |scope| {
            let next = current_index(scope) + 1;
            scope.insert(INDEX_KEY.to_string(), Value::from(next));
        });
        Ok(())
    }

    fn determine_next(
        &self,
        _name: &str,
        connections: &[Connection],
        _ctx: ScopedContext<'_>,
    ) -> Result<Vec<NodeIndex>> {
        Ok(connections.iter().map(|c| c.to).collect())
    }
}
