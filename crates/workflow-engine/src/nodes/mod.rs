//! Workflow node types.
//!
//! A [`Node`] is a named vertex in a [`Graph`](crate::Graph). Its behaviour is
//! one of a closed set of variants:
//!
//! - **set**: assign a resolved value to a state variable
//! - **if**: pick the `true` or `false` successor by evaluating a condition
//! - **for**: iterate over a collection, driving a `body` edge until the
//!   collection is exhausted, then following `exit`
//! - **end_loop**: advance the loop it points back to
//!
//! Hosts may add their own behaviour through [`NodeKind::Extension`].
//!
//! Nodes hold no run state of their own. Anything that must survive between
//! visits (loop counters, the materialized collection) lives in the node's
//! private scope inside the [`ExecutionContext`](crate::ExecutionContext), so
//! one node instance can be revisited any number of times.

mod condition;
mod for_loop;
mod set;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::connection::{Connection, ConnectionLabel, NodeIndex};
use crate::context::ScopedContext;
use crate::error::Result;
use crate::expression::ConditionEvaluator;

pub use condition::ConditionNode;
pub use for_loop::{EndLoopNode, ForLoopNode, LoopTarget, COLLECTION_KEY, INDEX_KEY, ITEM_KEY};
pub use set::SetNode;

/// Built-in node type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "if")]
    Condition,
    #[serde(rename = "for")]
    ForLoop,
    #[serde(rename = "end_loop")]
    EndLoop,
    #[serde(rename = "extension")]
    Extension,
}

impl NodeType {
    /// Parse a document type tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "set" => Some(Self::Set),
            "if" => Some(Self::Condition),
            "for" => Some(Self::ForLoop),
            "end_loop" => Some(Self::EndLoop),
            _ => None,
        }
    }

    /// The document type tag
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Condition => "if",
            Self::ForLoop => "for",
            Self::EndLoop => "end_loop",
            Self::Extension => "extension",
        }
    }

    /// Whether an outgoing edge of this node may carry `label`.
    ///
    /// Custom labels are allowed everywhere; no built-in node follows them.
    pub fn allows_label(&self, label: &ConnectionLabel) -> bool {
        match label {
            ConnectionLabel::Custom(_) => true,
            ConnectionLabel::Main => matches!(self, Self::Set | Self::EndLoop | Self::Extension),
            ConnectionLabel::True | ConnectionLabel::False => matches!(self, Self::Condition),
            ConnectionLabel::Body | ConnectionLabel::Exit => matches!(self, Self::ForLoop),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How a successor's visible scopes relate to its predecessor's
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeTransition {
    /// Same scopes as the predecessor
    Inherit,
    /// Open the named node's scope for the successor
    Enter(String),
    /// Close the named node's scope (and anything opened inside it)
    Leave(String),
}

/// Shared capability set of every node variant
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// The node's type tag
    fn node_type(&self) -> NodeType;

    /// Mutate the context for one visit.
    async fn execute(&self, name: &str, ctx: ScopedContext<'_>) -> Result<()>;

    /// Choose successors after the visit's wave has completed.
    ///
    /// Defaults to every `main` edge in declaration order.
    fn determine_next(
        &self,
        _name: &str,
        connections: &[Connection],
        _ctx: ScopedContext<'_>,
    ) -> Result<Vec<NodeIndex>> {
        Ok(connections
            .iter()
            .filter(|c| c.label == ConnectionLabel::Main)
            .map(|c| c.to)
            .collect())
    }

    /// Scope change applied when moving to `target`.
    fn scope_transition(&self, _name: &str, _target: NodeIndex) -> ScopeTransition {
        ScopeTransition::Inherit
    }

    /// Type-specific fields for [`Node::describe`]
    fn details(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Closed set of node behaviours
#[derive(Clone)]
pub enum NodeKind {
    Set(SetNode),
    Condition(ConditionNode),
    ForLoop(ForLoopNode),
    EndLoop(EndLoopNode),
    /// Host-provided behaviour
    Extension(Arc<dyn NodeBehavior>),
}

impl NodeKind {
    /// Create a built-in node kind from its document parameters.
    pub fn from_parameters(
        node_type: NodeType,
        parameters: &Value,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Option<Self> {
        match node_type {
            NodeType::Set => SetNode::from_parameters(parameters).map(Self::Set),
            NodeType::Condition => {
                ConditionNode::from_parameters(parameters, evaluator).map(Self::Condition)
            }
            NodeType::ForLoop => ForLoopNode::from_parameters(parameters).map(Self::ForLoop),
            NodeType::EndLoop => Some(Self::EndLoop(EndLoopNode::new())),
            NodeType::Extension => None,
        }
    }

    /// The node type tag of this behaviour
    pub fn node_type(&self) -> NodeType {
        self.behavior().node_type()
    }

    fn behavior(&self) -> &dyn NodeBehavior {
        match self {
            Self::Set(node) => node,
            Self::Condition(node) => node,
            Self::ForLoop(node) => node,
            Self::EndLoop(node) => node,
            Self::Extension(node) => node.as_ref(),
        }
    }
}

impl From<SetNode> for NodeKind {
    fn from(node: SetNode) -> Self {
        Self::Set(node)
    }
}

impl From<ConditionNode> for NodeKind {
    fn from(node: ConditionNode) -> Self {
        Self::Condition(node)
    }
}

impl From<ForLoopNode> for NodeKind {
    fn from(node: ForLoopNode) -> Self {
        Self::ForLoop(node)
    }
}

impl From<EndLoopNode> for NodeKind {
    fn from(node: EndLoopNode) -> Self {
        Self::EndLoop(node)
    }
}

impl From<Arc<dyn NodeBehavior>> for NodeKind {
    fn from(node: Arc<dyn NodeBehavior>) -> Self {
        Self::Extension(node)
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(node) => f.debug_tuple("Set").field(node).finish(),
            Self::Condition(node) => f.debug_tuple("Condition").field(node).finish(),
            Self::ForLoop(node) => f.debug_tuple("ForLoop").field(node).finish(),
            Self::EndLoop(node) => f.debug_tuple("EndLoop").field(node).finish(),
            Self::Extension(node) => f
                .debug_tuple("Extension")
                .field(&node.node_type())
                .finish(),
        }
    }
}

/// A node instance owned by a graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique name within the graph
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Raw configuration, retained for introspection
    pub parameters: Value,
    /// Outgoing edges in declaration order
    pub connections: Vec<Connection>,
    /// Behaviour
    pub kind: NodeKind,
}

/// Serializable projection of a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDescription {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub parameters: Value,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Node {
    /// Create a node with no connections
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Value::Null,
            connections: Vec::new(),
            kind,
        }
    }

    /// The node's type tag
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Run one visit of this node.
    pub async fn execute(&self, ctx: ScopedContext<'_>) -> Result<()> {
        self.kind.behavior().execute(&self.name, ctx).await
    }

    /// Successors of this visit, in order.
    pub fn determine_next(&self, ctx: ScopedContext<'_>) -> Result<Vec<NodeIndex>> {
        self.kind
            .behavior()
            .determine_next(&self.name, &self.connections, ctx)
    }

    /// Scope change when moving from this node to `target`.
    pub fn scope_transition(&self, target: NodeIndex) -> ScopeTransition {
        self.kind.behavior().scope_transition(&self.name, target)
    }

    /// Structured description of this node.
    pub fn describe(&self) -> NodeDescription {
        NodeDescription {
            name: self.name.clone(),
            description: self.description.clone(),
            node_type: self.node_type(),
            parameters: self.parameters.clone(),
            details: self.kind.behavior().details(),
        }
    }

    /// Attach outgoing edges and resolve labeled targets.
    pub(crate) fn set_connections(&mut self, connections: Vec<Connection>) {
        match &mut self.kind {
            NodeKind::Condition(node) => node.bind(&connections),
            NodeKind::ForLoop(node) => node.bind(&connections),
            _ => {}
        }
        self.connections = connections;
    }
}

fn string_parameter(parameters: &Value, key: &str) -> Option<String> {
    parameters.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use serde_json::json;

    #[test]
    fn test_type_tags_round_trip() {
        for node_type in [
            NodeType::Set,
            NodeType::Condition,
            NodeType::ForLoop,
            NodeType::EndLoop,
        ] {
            assert_eq!(NodeType::from_tag(node_type.tag()), Some(node_type));
        }
        assert_eq!(NodeType::from_tag("http"), None);
        assert_eq!(serde_json::to_value(NodeType::Condition).unwrap(), json!("if"));
    }

    #[test]
    fn test_allowed_labels() {
        assert!(NodeType::Condition.allows_label(&ConnectionLabel::True));
        assert!(!NodeType::Condition.allows_label(&ConnectionLabel::Main));
        assert!(NodeType::ForLoop.allows_label(&ConnectionLabel::Exit));
        assert!(!NodeType::Set.allows_label(&ConnectionLabel::Body));
        assert!(NodeType::Set.allows_label(&ConnectionLabel::Custom("audit".into())));
    }

    #[test]
    fn test_default_successors_are_main_edges() {
        let mut node = Node::new(
            "assign",
            "",
            NodeKind::Set(SetNode::new("x", json!(1))),
        );
        node.set_connections(vec![
            Connection::new(2, "main"),
            Connection::new(4, "audit"),
            Connection::new(3, "main"),
        ]);

        let ctx = ExecutionContext::new();
        let next = node.determine_next(ctx.scoped(&[])).unwrap();
        assert_eq!(next, vec![2, 3]);
    }

    #[test]
    fn test_describe_flattens_details() {
        let mut node = Node::new(
            "assign",
            "sets x",
            NodeKind::Set(SetNode::new("x", json!("y.z"))),
        );
        node.parameters = json!({"variable_name": "x", "value": "y.z"});

        let json = serde_json::to_value(node.describe()).unwrap();
        assert_eq!(json["name"], json!("assign"));
        assert_eq!(json["type"], json!("set"));
        assert_eq!(json["variable_name"], json!("x"));
        assert_eq!(json["value"], json!("y.z"));
    }
}
