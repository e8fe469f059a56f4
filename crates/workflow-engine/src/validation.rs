//! Construction-time validation of workflow graphs
//!
//! Checks node names, node parameters, connection endpoints and labels,
//! the presence of a start node, and loop wiring. A `for` node must have a
//! `body` connection, otherwise its first iteration would end the run. The executor assumes
//! a graph that passed these checks.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::builder::{EdgeSpec, NodeSpec};
use crate::connection::ConnectionLabel;
use crate::nodes::{ConditionNode, ForLoopNode, NodeType, SetNode};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two nodes share a name
    DuplicateNode { name: String },
    /// A node's type tag is not a known node type
    UnknownNodeType { node: String, node_type: String },
    /// A required parameter is absent
    MissingParameter { node: String, parameter: String },
    /// A parameter is present but has the wrong shape
    InvalidParameter {
        node: String,
        parameter: String,
        reason: String,
    },
    /// A connection starts at a node that does not exist
    UnknownConnectionSource { node: String },
    /// A connection points at a node that does not exist
    UnknownConnectionTarget { from: String, to: String },
    /// The source node's type never follows this label
    LabelNotAllowed {
        node: String,
        node_type: NodeType,
        label: String,
    },
    /// A single-valued label (`true`, `false`, `body`, `exit`) is used twice
    DuplicateLabel { node: String, label: String },
    /// Every node is the target of some connection
    NoStartNode,
    /// A node type that always follows this label has no such connection
    MissingLabel { node: String, label: String },
    /// An end_loop node has no connection to a for node
    EndLoopWithoutLoop { node: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNode { name } => write!(f, "Duplicate node name '{}'", name),
            Self::UnknownNodeType { node, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node)
            }
            Self::MissingParameter { node, parameter } => {
                write!(
                    f,
                    "Node '{}' is missing required parameter '{}'",
                    node, parameter
                )
            }
            Self::InvalidParameter {
                node,
                parameter,
                reason,
            } => {
                write!(
                    f,
                    "Node '{}' has invalid parameter '{}': {}",
                    node, parameter, reason
                )
            }
            Self::UnknownConnectionSource { node } => {
                write!(f, "Connection from unknown node '{}'", node)
            }
            Self::UnknownConnectionTarget { from, to } => {
                write!(f, "Connection from '{}' references unknown node '{}'", from, to)
            }
            Self::LabelNotAllowed {
                node,
                node_type,
                label,
            } => {
                write!(
                    f,
                    "Node '{}' of type '{}' cannot have a '{}' connection",
                    node, node_type, label
                )
            }
            Self::DuplicateLabel { node, label } => {
                write!(f, "Node '{}' has more than one '{}' connection", node, label)
            }
            Self::NoStartNode => {
                write!(f, "Workflow has no start node (every node is a connection target)")
            }
            Self::MissingLabel { node, label } => {
                write!(f, "Node '{}' has no '{}' connection", node, label)
            }
            Self::EndLoopWithoutLoop { node } => {
                write!(f, "End loop node '{}' is not connected to a for node", node)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a graph under construction
///
/// Returns all validation errors found (not just the first).
pub(crate) fn validate_graph(nodes: &[NodeSpec], edges: &[EdgeSpec]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_names(nodes, &mut errors);
    let types = validate_node_types(nodes, &mut errors);
    validate_edges(&types, edges, &mut errors);
    validate_start_presence(nodes, edges, &mut errors);
    validate_loop_wiring(&types, edges, &mut errors);

    errors
}

/// Check that node names are unique
fn validate_names(nodes: &[NodeSpec], errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for node in nodes {
        if !seen.insert(node.name.as_str()) && reported.insert(node.name.as_str()) {
            errors.push(ValidationError::DuplicateNode {
                name: node.name.clone(),
            });
        }
    }
}

/// Resolve each node's type and check its parameters
fn validate_node_types<'a>(
    nodes: &'a [NodeSpec],
    errors: &mut Vec<ValidationError>,
) -> HashMap<&'a str, NodeType> {
    let mut types = HashMap::new();
    for node in nodes {
        match node.node_type() {
            Some(node_type) => {
                if node.kind.is_none() {
                    check_parameters(&node.name, node_type, &node.parameters, errors);
                }
                types.entry(node.name.as_str()).or_insert(node_type);
            }
            None => errors.push(ValidationError::UnknownNodeType {
                node: node.name.clone(),
                node_type: node.type_tag.clone(),
            }),
        }
    }
    types
}

/// Check the parameters a built-in node type needs
pub(crate) fn check_parameters(
    node: &str,
    node_type: NodeType,
    parameters: &Value,
    errors: &mut Vec<ValidationError>,
) {
    let mut require = |parameter: &str| {
        let present = parameters.get(parameter).is_some();
        if !present {
            errors.push(ValidationError::MissingParameter {
                node: node.to_string(),
                parameter: parameter.to_string(),
            });
        }
        present
    };

    match node_type {
        NodeType::Set => {
            let has_variable = require(SetNode::PARAM_VARIABLE);
            require(SetNode::PARAM_VALUE);
            if has_variable {
                check_name_parameter(node, parameters, SetNode::PARAM_VARIABLE, errors);
            }
        }
        NodeType::Condition => {
            require(ConditionNode::PARAM_CONDITION);
        }
        NodeType::ForLoop => {
            require(ForLoopNode::PARAM_COLLECTION);
            for optional in [ForLoopNode::PARAM_ITERATOR_VAR, ForLoopNode::PARAM_INDEX_VAR] {
                if parameters.get(optional).is_some_and(|v| !v.is_null()) {
                    check_name_parameter(node, parameters, optional, errors);
                }
            }
        }
        NodeType::EndLoop | NodeType::Extension => {}
    }
}

fn check_name_parameter(
    node: &str,
    parameters: &Value,
    parameter: &str,
    errors: &mut Vec<ValidationError>,
) {
    let valid = parameters
        .get(parameter)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    if !valid {
        errors.push(ValidationError::InvalidParameter {
            node: node.to_string(),
            parameter: parameter.to_string(),
            reason: "expected a non-empty string".to_string(),
        });
    }
}

/// Check connection endpoints and labels
fn validate_edges(
    types: &HashMap<&str, NodeType>,
    edges: &[EdgeSpec],
    errors: &mut Vec<ValidationError>,
) {
    let mut single_labels: HashSet<(&str, &ConnectionLabel)> = HashSet::new();
    let mut unknown_sources: HashSet<&str> = HashSet::new();

    for edge in edges {
        match types.get(edge.from.as_str()) {
            Some(node_type) => {
                if !node_type.allows_label(&edge.label) {
                    errors.push(ValidationError::LabelNotAllowed {
                        node: edge.from.clone(),
                        node_type: *node_type,
                        label: edge.label.to_string(),
                    });
                } else if edge.label.is_single_valued()
                    && !single_labels.insert((edge.from.as_str(), &edge.label))
                {
                    errors.push(ValidationError::DuplicateLabel {
                        node: edge.from.clone(),
                        label: edge.label.to_string(),
                    });
                }
            }
            None => {
                if unknown_sources.insert(edge.from.as_str()) {
                    errors.push(ValidationError::UnknownConnectionSource {
                        node: edge.from.clone(),
                    });
                }
            }
        }

        if !types.contains_key(edge.to.as_str()) {
            errors.push(ValidationError::UnknownConnectionTarget {
                from: edge.from.clone(),
                to: edge.to.clone(),
            });
        }
    }
}

/// Check that at least one node is not the target of a connection
fn validate_start_presence(
    nodes: &[NodeSpec],
    edges: &[EdgeSpec],
    errors: &mut Vec<ValidationError>,
) {
    if nodes.is_empty() {
        return;
    }
    let targets: HashSet<&str> = edges.iter().map(|e| e.to.as_str()).collect();
    if nodes.iter().all(|n| targets.contains(n.name.as_str())) {
        errors.push(ValidationError::NoStartNode);
    }
}

fn nodes_of_type<'a>(types: &HashMap<&'a str, NodeType>, node_type: NodeType) -> Vec<&'a str> {
    let mut names: Vec<&str> = types
        .iter()
        .filter(|(_, t)| **t == node_type)
        .map(|(name, _)| *name)
        .collect();
    names.sort_unstable();
    names
}

/// Check that every for node has a body and every end_loop node points back
/// at a for node
fn validate_loop_wiring(
    types: &HashMap<&str, NodeType>,
    edges: &[EdgeSpec],
    errors: &mut Vec<ValidationError>,
) {
    for name in nodes_of_type(types, NodeType::ForLoop) {
        let has_body = edges
            .iter()
            .any(|e| e.from == name && e.label == ConnectionLabel::Body);
        if !has_body {
            errors.push(ValidationError::MissingLabel {
                node: name.to_string(),
                label: ConnectionLabel::Body.to_string(),
            });
        }
    }

    for name in nodes_of_type(types, NodeType::EndLoop) {
        let closes_loop = edges.iter().any(|e| {
            e.from == name && types.get(e.to.as_str()) == Some(&NodeType::ForLoop)
        });
        if !closes_loop {
            errors.push(ValidationError::EndLoopWithoutLoop {
                node: name.to_string(),
            });
        }
    }
}
