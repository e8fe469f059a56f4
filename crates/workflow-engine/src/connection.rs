//! Labeled edges between nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a node inside its graph's node arena
pub type NodeIndex = usize;

/// Label on an outgoing edge, disambiguating a node's successors
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionLabel {
    /// Ordinary sequential successor
    #[default]
    Main,
    /// Condition held
    True,
    /// Condition did not hold
    False,
    /// Loop body entry
    Body,
    /// Loop completion
    Exit,
    /// Any other label; carried but never selected by built-in nodes
    Custom(String),
}

impl ConnectionLabel {
    /// The label's wire name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Main => "main",
            Self::True => "true",
            Self::False => "false",
            Self::Body => "body",
            Self::Exit => "exit",
            Self::Custom(label) => label,
        }
    }

    /// Whether a node may have at most one edge with this label
    pub fn is_single_valued(&self) -> bool {
        matches!(self, Self::True | Self::False | Self::Body | Self::Exit)
    }
}

impl From<&str> for ConnectionLabel {
    fn from(label: &str) -> Self {
        match label {
            "main" | "" => Self::Main,
            "true" => Self::True,
            "false" => Self::False,
            "body" => Self::Body,
            "exit" => Self::Exit,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for ConnectionLabel {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<ConnectionLabel> for String {
    fn from(label: ConnectionLabel) -> Self {
        label.as_str().to_string()
    }
}

impl fmt::Display for ConnectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge to another node in the same graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Target node
    pub to: NodeIndex,
    /// Edge label
    pub label: ConnectionLabel,
}

impl Connection {
    /// Create a new connection
    pub fn new(to: NodeIndex, label: impl Into<ConnectionLabel>) -> Self {
        Self {
            to,
            label: label.into(),
        }
    }
}

/// First target reached through `label`, if any.
pub fn target_with_label(connections: &[Connection], label: &ConnectionLabel) -> Option<NodeIndex> {
    connections.iter().find(|c| &c.label == label).map(|c| c.to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parsing() {
        assert_eq!(ConnectionLabel::from("true"), ConnectionLabel::True);
        assert_eq!(ConnectionLabel::from(""), ConnectionLabel::Main);
        assert_eq!(
            ConnectionLabel::from("retry"),
            ConnectionLabel::Custom("retry".to_string())
        );
        assert_eq!(ConnectionLabel::Body.to_string(), "body");
    }

    #[test]
    fn test_label_serde_uses_plain_strings() {
        let json = serde_json::to_string(&ConnectionLabel::Exit).unwrap();
        assert_eq!(json, "\"exit\"");
        let label: ConnectionLabel = serde_json::from_str("\"false\"").unwrap();
        assert_eq!(label, ConnectionLabel::False);
    }

    #[test]
    fn test_target_with_label() {
        let connections = vec![
            Connection::new(3, "false"),
            Connection::new(1, "true"),
            Connection::new(2, "true"),
        ];
        assert_eq!(target_with_label(&connections, &ConnectionLabel::True), Some(1));
        assert_eq!(target_with_label(&connections, &ConnectionLabel::Body), None);
    }
}
