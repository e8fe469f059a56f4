//! Fluent builder for workflow graphs
//!
//! Collects nodes and labeled connections by name, validates the whole
//! description at once and produces a wired [`Graph`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::connection::{Connection, ConnectionLabel, NodeIndex};
use crate::document::WorkflowDocument;
use crate::error::{Result, WorkflowError};
use crate::expression::{ConditionEvaluator, JsonLogic};
use crate::graph::Graph;
use crate::nodes::{LoopTarget, Node, NodeBehavior, NodeKind, NodeType};
use crate::validation::{validate_graph, ValidationError};

/// A node as declared, before validation
#[derive(Debug, Clone)]
pub(crate) struct NodeSpec {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) type_tag: String,
    pub(crate) parameters: Value,
    /// Set when the caller supplied a ready-made behaviour
    pub(crate) kind: Option<NodeKind>,
}

impl NodeSpec {
    pub(crate) fn node_type(&self) -> Option<NodeType> {
        match &self.kind {
            Some(kind) => Some(kind.node_type()),
            None => NodeType::from_tag(&self.type_tag),
        }
    }
}

/// A connection as declared, by node name
#[derive(Debug, Clone)]
pub(crate) struct EdgeSpec {
    pub(crate) from: String,
    pub(crate) label: ConnectionLabel,
    pub(crate) to: String,
}

/// Fluent builder for constructing workflow graphs
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new("greeting")
///     .add_set("init", "x", json!(1))
///     .add_condition("check", json!({"==": [{"var": "x"}, 1]}))
///     .add_set("yes", "result", json!("yes"))
///     .connect("init", "main", "check")
///     .connect("check", "true", "yes")
///     .build()?;
/// ```
pub struct GraphBuilder {
    name: String,
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
    evaluator: Arc<dyn ConditionEvaluator>,
}

impl GraphBuilder {
    /// Create a new builder using the [`JsonLogic`] evaluator
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            evaluator: Arc::new(JsonLogic),
        }
    }

    /// Create a builder from a parsed workflow document
    pub fn from_document(document: WorkflowDocument) -> Self {
        let mut builder = Self::new(document.name);
        for node in document.nodes {
            builder = builder.add_raw(node.name, node.description, node.node_type, node.parameters);
        }
        for (source, connections) in document.connections {
            for connection in connections {
                builder = builder.connect(source.clone(), connection.label, connection.to);
            }
        }
        builder
    }

    /// Use a custom evaluator for every `if` node
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Add a node from its type tag and raw parameters
    pub fn add_raw(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        type_tag: impl Into<String>,
        parameters: Value,
    ) -> Self {
        self.nodes.push(NodeSpec {
            name: name.into(),
            description: description.into(),
            type_tag: type_tag.into(),
            parameters,
            kind: None,
        });
        self
    }

    /// Add a node that assigns `value` to `variable`
    pub fn add_set(
        self,
        name: impl Into<String>,
        variable: impl Into<String>,
        value: Value,
    ) -> Self {
        let parameters = json!({
            "variable_name": variable.into(),
            "value": value,
        });
        self.add_raw(name, "", NodeType::Set.tag(), parameters)
    }

    /// Add a conditional branch node
    pub fn add_condition(self, name: impl Into<String>, condition: Value) -> Self {
        let parameters = json!({ "condition": condition });
        self.add_raw(name, "", NodeType::Condition.tag(), parameters)
    }

    /// Add a loop over `collection` (a context path or a literal array)
    pub fn add_for_loop(self, name: impl Into<String>, collection: Value) -> Self {
        let parameters = json!({ "collection": collection });
        self.add_raw(name, "", NodeType::ForLoop.tag(), parameters)
    }

    /// Add a node closing the loop it is connected back to
    pub fn add_end_loop(self, name: impl Into<String>) -> Self {
        self.add_raw(name, "", NodeType::EndLoop.tag(), json!({}))
    }

    /// Add a node with a ready-made behaviour
    pub fn add_node(mut self, name: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        let kind = kind.into();
        self.nodes.push(NodeSpec {
            name: name.into(),
            description: String::new(),
            type_tag: kind.node_type().tag().to_string(),
            parameters: Value::Null,
            kind: Some(kind),
        });
        self
    }

    /// Add a node with host-provided behaviour
    pub fn add_extension(self, name: impl Into<String>, behavior: Arc<dyn NodeBehavior>) -> Self {
        self.add_node(name, NodeKind::Extension(behavior))
    }

    /// Set the description of the most recently added node
    ///
    /// Must be called immediately after one of the `add_*` methods.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.description = description.into();
        }
        self
    }

    /// Connect two nodes by name
    pub fn connect(
        mut self,
        from: impl Into<String>,
        label: impl Into<ConnectionLabel>,
        to: impl Into<String>,
    ) -> Self {
        self.edges.push(EdgeSpec {
            from: from.into(),
            label: label.into(),
            to: to.into(),
        });
        self
    }

    /// Check the graph without building it
    ///
    /// Returns all validation errors found (not just the first).
    pub fn validate(&self) -> Vec<ValidationError> {
        validate_graph(&self.nodes, &self.edges)
    }

    /// Validate and build the graph
    pub fn build(self) -> Result<Graph> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(WorkflowError::Validation(errors));
        }

        let index: HashMap<String, NodeIndex> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect();

        let mut outgoing: Vec<Vec<Connection>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
                outgoing[from].push(Connection::new(to, edge.label.clone()));
            }
        }

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for spec in self.nodes {
            let kind = match &spec.kind {
                Some(kind) => kind.clone(),
                None => resolve_kind(&spec, &self.evaluator)?,
            };
            let mut node = Node::new(spec.name, spec.description, kind);
            node.parameters = spec.parameters;
            if node.parameters.is_null() {
                node.parameters = Value::Object(node.describe().details);
            }
            nodes.push(node);
        }

        for (node, connections) in nodes.iter_mut().zip(outgoing) {
            node.set_connections(connections);
        }
        bind_end_loops(&mut nodes);

        log::debug!("Built workflow '{}' with {} nodes", self.name, nodes.len());
        Ok(Graph::new(self.name, nodes))
    }
}

fn resolve_kind(spec: &NodeSpec, evaluator: &Arc<dyn ConditionEvaluator>) -> Result<NodeKind> {
    spec.node_type()
        .and_then(|node_type| {
            NodeKind::from_parameters(node_type, &spec.parameters, evaluator.clone())
        })
        .ok_or_else(|| {
            WorkflowError::Validation(vec![ValidationError::UnknownNodeType {
                node: spec.name.clone(),
                node_type: spec.type_tag.clone(),
            }])
        })
}

/// Point every end_loop node at the first for node among its targets
fn bind_end_loops(nodes: &mut [Node]) {
    let targets: Vec<Option<LoopTarget>> = nodes
        .iter()
        .map(|node| {
            node.connections
                .iter()
                .find(|c| matches!(nodes[c.to].kind, NodeKind::ForLoop(_)))
                .map(|c| LoopTarget {
                    index: c.to,
                    name: nodes[c.to].name.clone(),
                })
        })
        .collect();

    for (node, target) in nodes.iter_mut().zip(targets) {
        if let NodeKind::EndLoop(end) = &mut node.kind {
            end.bind_loop(target);
        }
    }
}
