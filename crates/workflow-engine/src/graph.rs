//! The executable workflow graph

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::connection::{Connection, NodeIndex};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::events::NullEventSink;
use crate::executor::GraphExecutor;
use crate::nodes::{Node, NodeDescription};

/// An immutable set of wired nodes
///
/// Graphs are produced by [`GraphBuilder`](crate::GraphBuilder), which
/// guarantees unique names and in-range connection targets.
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<String, NodeIndex>,
}

impl Graph {
    pub(crate) fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect();
        Self {
            name: name.into(),
            nodes,
            index,
        }
    }

    /// Workflow name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All nodes, in declaration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node at `index`
    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Find a node by name
    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.index_of(name).and_then(|i| self.node(i))
    }

    /// Arena index of the named node
    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    /// Every edge as `(source, connection)`
    pub fn connections(&self) -> impl Iterator<Item = (NodeIndex, &Connection)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .flat_map(|(i, node)| node.connections.iter().map(move |c| (i, c)))
    }

    /// Get edges going out of a node
    pub fn outgoing_edges(&self, index: NodeIndex) -> &[Connection] {
        self.node(index)
            .map(|n| n.connections.as_slice())
            .unwrap_or_default()
    }

    /// Get the sources of edges coming into a node
    pub fn incoming_edges(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.connections()
            .filter(|(_, c)| c.to == index)
            .map(|(source, _)| source)
            .collect()
    }

    /// Nodes that are the target of no connection, in declaration order.
    pub fn start_nodes(&self) -> Vec<NodeIndex> {
        let targets: HashSet<NodeIndex> = self.connections().map(|(_, c)| c.to).collect();
        (0..self.nodes.len())
            .filter(|i| !targets.contains(i))
            .collect()
    }

    /// Structured description of every node
    pub fn describe(&self) -> Vec<NodeDescription> {
        self.nodes.iter().map(Node::describe).collect()
    }

    /// Run the graph to completion against `ctx` with default options.
    ///
    /// `ctx` is a shared handle: keep a clone to inspect partial state if the
    /// run fails.
    pub async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionContext> {
        GraphExecutor::new().run(self, &ctx, &NullEventSink).await?;
        Ok(ctx)
    }

    /// Run the graph against a fresh context built from `state` and `config`.
    pub async fn execute_with(
        &self,
        state: Map<String, Value>,
        config: Map<String, Value>,
    ) -> Result<ExecutionContext> {
        self.execute(ExecutionContext::with_data(state, config)).await
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::GraphBuilder;
    use serde_json::json;

    #[test]
    fn test_start_nodes_have_no_incoming_edges() {
        let graph = GraphBuilder::new("wf")
            .add_set("a", "x", json!(1))
            .add_set("b", "y", json!(2))
            .add_set("c", "z", json!(3))
            .connect("a", "main", "c")
            .build()
            .unwrap();

        let starts: Vec<&str> = graph
            .start_nodes()
            .into_iter()
            .map(|i| graph.nodes()[i].name.as_str())
            .collect();
        assert_eq!(starts, vec!["a", "b"]);
    }

    #[test]
    fn test_lookup_and_edges() {
        let graph = GraphBuilder::new("wf")
            .add_set("a", "x", json!(1))
            .add_set("b", "y", json!(2))
            .connect("a", "main", "b")
            .build()
            .unwrap();

        let a = graph.index_of("a").unwrap();
        let b = graph.index_of("b").unwrap();
        assert_eq!(graph.outgoing_edges(a).len(), 1);
        assert_eq!(graph.incoming_edges(b), vec![a]);
        assert_eq!(graph.connections().count(), 1);
        assert!(graph.find_node("missing").is_none());
        assert_eq!(graph.name(), "wf");
    }

    #[test]
    fn test_loop_back_edge_does_not_hide_entry_node() {
        let graph = GraphBuilder::new("wf")
            .add_set("init", "items", json!([1]))
            .add_for_loop("loop", json!("items"))
            .add_end_loop("end")
            .connect("init", "main", "loop")
            .connect("loop", "body", "end")
            .connect("end", "main", "loop")
            .build()
            .unwrap();

        assert_eq!(graph.start_nodes(), vec![graph.index_of("init").unwrap()]);
    }

    #[test]
    fn test_execute_returns_shared_context() {
        let graph = GraphBuilder::new("wf")
            .add_set("a", "x", json!(1))
            .build()
            .unwrap();

        let ctx = crate::ExecutionContext::new();
        let returned = tokio_test::block_on(graph.execute(ctx.clone())).unwrap();

        // Both handles observe the same state
        assert_eq!(ctx.get("x", json!(null)), json!(1));
        assert_eq!(returned.get("x", json!(null)), json!(1));
    }

    #[test]
    fn test_describe_all_nodes() {
        let graph = GraphBuilder::new("wf")
            .add_set("a", "x", json!(1))
            .add_condition("c", json!({"==": [{"var": "x"}, 1]}))
            .connect("a", "main", "c")
            .build()
            .unwrap();

        let described = serde_json::to_value(graph.describe()).unwrap();
        assert_eq!(described[0]["type"], "set");
        assert_eq!(described[1]["type"], "if");
        assert_eq!(described[1]["condition"], json!({"==": [{"var": "x"}, 1]}));
    }
}
