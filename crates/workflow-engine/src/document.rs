//! Serialized workflow documents
//!
//! A document lists nodes by name and keys connections by source node:
//!
//! ```json
//! {
//!   "name": "Greeting",
//!   "nodes": [
//!     {"name": "init", "type": "set", "parameters": {"variable_name": "x", "value": 1}},
//!     {"name": "check", "type": "if", "parameters": {"condition": {"==": [{"var": "x"}, 1]}}}
//!   ],
//!   "connections": {
//!     "init": [{"to": "check"}]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::builder::GraphBuilder;
use crate::connection::ConnectionLabel;
use crate::error::Result;
use crate::graph::Graph;

fn default_workflow_name() -> String {
    "Unnamed Workflow".to_string()
}

fn default_node_name() -> String {
    "Unnamed Node".to_string()
}

fn default_node_type() -> String {
    "unknown".to_string()
}

fn default_parameters() -> Value {
    Value::Object(Default::default())
}

/// A workflow as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(default = "default_workflow_name")]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    /// Outgoing connections keyed by source node name
    #[serde(default)]
    pub connections: BTreeMap<String, Vec<RawConnection>>,
}

/// A node entry in a [`WorkflowDocument`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(default = "default_node_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    /// Editor position; ignored by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(f64, f64)>,
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

/// A connection entry in a [`WorkflowDocument`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConnection {
    pub to: String,
    #[serde(default)]
    pub label: ConnectionLabel,
}

impl WorkflowDocument {
    /// Parse a document from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a document file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading workflow document from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// A builder preloaded with this document's nodes and connections
    pub fn into_builder(self) -> GraphBuilder {
        GraphBuilder::from_document(self)
    }

    /// Validate and build the graph
    pub fn into_graph(self) -> Result<Graph> {
        self.into_builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::error::WorkflowError;
    use crate::nodes::NodeType;
    use serde_json::json;
    use std::io::Write;

    const LOOP_DOCUMENT: &str = r#"{
        "name": "Sum",
        "nodes": [
            {"name": "init", "type": "set", "position": [0, 0],
             "parameters": {"variable_name": "numbers", "value": [1, 2, 3]}},
            {"name": "loop", "type": "for", "description": "walk numbers",
             "parameters": {"collection": "numbers", "iterator_var": "n"}},
            {"name": "last", "type": "set", "parameters": {"variable_name": "last", "value": "n"}},
            {"name": "end", "type": "end_loop"},
            {"name": "done", "type": "set", "parameters": {"variable_name": "done", "value": true}}
        ],
        "connections": {
            "init": [{"to": "loop"}],
            "loop": [{"to": "last", "label": "body"}, {"to": "done", "label": "exit"}],
            "last": [{"to": "end", "label": "main"}],
            "end": [{"to": "loop"}]
        }
    }"#;

    #[test]
    fn test_defaults_applied() {
        let doc = WorkflowDocument::from_json_str(r#"{"nodes": [{"name": "a"}]}"#).unwrap();
        assert_eq!(doc.name, "Unnamed Workflow");
        assert_eq!(doc.nodes[0].node_type, "unknown");
        assert_eq!(doc.nodes[0].parameters, json!({}));
        assert!(doc.connections.is_empty());
    }

    #[test]
    fn test_connection_label_defaults_to_main() {
        let doc = WorkflowDocument::from_json_str(LOOP_DOCUMENT).unwrap();
        assert_eq!(doc.connections["init"][0].label, ConnectionLabel::Main);
        assert_eq!(doc.connections["loop"][1].label, ConnectionLabel::Exit);
        assert_eq!(doc.nodes[0].position, Some((0.0, 0.0)));
    }

    #[tokio::test]
    async fn test_document_runs_end_to_end() {
        let graph = WorkflowDocument::from_json_str(LOOP_DOCUMENT)
            .unwrap()
            .into_graph()
            .unwrap();
        assert_eq!(graph.name(), "Sum");
        assert_eq!(graph.find_node("loop").unwrap().description, "walk numbers");

        let ctx = graph.execute(ExecutionContext::new()).await.unwrap();
        assert_eq!(ctx.get("last", Value::Null), json!(3));
        assert_eq!(ctx.get("done", Value::Null), json!(true));
        assert!(!ctx.contains("n"));
    }

    #[test]
    fn test_unknown_type_rejected_at_build() {
        let doc = WorkflowDocument::from_json_str(
            r#"{"nodes": [{"name": "a", "type": "http"}]}"#,
        )
        .unwrap();
        let err = doc.into_graph().unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(err.to_string().contains("Unknown node type 'http'"));
    }

    #[test]
    fn test_malformed_json() {
        let err = WorkflowDocument::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, WorkflowError::Serialization(_)));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LOOP_DOCUMENT.as_bytes()).unwrap();

        let doc = WorkflowDocument::from_path(file.path()).unwrap();
        assert_eq!(doc.nodes.len(), 5);

        let graph = doc.into_graph().unwrap();
        assert_eq!(graph.find_node("end").unwrap().node_type(), NodeType::EndLoop);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkflowDocument::from_path(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, WorkflowError::Io(_)));
    }

    #[test]
    fn test_serializes_back_to_json() {
        let doc = WorkflowDocument::from_json_str(LOOP_DOCUMENT).unwrap();
        let text = doc.to_json_pretty().unwrap();
        let reparsed = WorkflowDocument::from_json_str(&text).unwrap();
        assert_eq!(reparsed, doc);
    }
}
