//! Conditional branching node

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{NodeBehavior, NodeType};
use crate::connection::{target_with_label, Connection, ConnectionLabel, NodeIndex};
use crate::context::ScopedContext;
use crate::error::Result;
use crate::expression::ConditionEvaluator;

/// Branches to its `true` or `false` successor.
///
/// Execution itself does nothing; the decision happens in
/// `determine_next`, which evaluates the condition against state merged
/// with the visible loop scopes. A missing target for the chosen branch
/// ends that path of the graph.
#[derive(Clone)]
pub struct ConditionNode {
    condition: Value,
    evaluator: Arc<dyn ConditionEvaluator>,
    true_node: Option<NodeIndex>,
    false_node: Option<NodeIndex>,
}

impl ConditionNode {
    /// Parameter holding the condition expression
    pub const PARAM_CONDITION: &'static str = "condition";

    /// Create a condition node
    pub fn new(condition: Value, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self {
            condition,
            evaluator,
            true_node: None,
            false_node: None,
        }
    }

    pub(crate) fn from_parameters(
        parameters: &Value,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Option<Self> {
        let condition = parameters.get(Self::PARAM_CONDITION)?.clone();
        Some(Self::new(condition, evaluator))
    }

    pub(crate) fn bind(&mut self, connections: &[Connection]) {
        self.true_node = target_with_label(connections, &ConnectionLabel::True);
        self.false_node = target_with_label(connections, &ConnectionLabel::False);
    }

    /// The condition expression
    pub fn condition(&self) -> &Value {
        &self.condition
    }

    /// Successor taken when the condition holds
    pub fn true_node(&self) -> Option<NodeIndex> {
        self.true_node
    }

    /// Successor taken when the condition fails
    pub fn false_node(&self) -> Option<NodeIndex> {
        self.false_node
    }
}

impl fmt::Debug for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionNode")
            .field("condition", &self.condition)
            .field("true_node", &self.true_node)
            .field("false_node", &self.false_node)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NodeBehavior for ConditionNode {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    async fn execute(&self, _name: &str, _ctx: ScopedContext<'_>) -> Result<()> {
        Ok(())
    }

    fn determine_next(
        &self,
        name: &str,
        _connections: &[Connection],
        ctx: ScopedContext<'_>,
    ) -> Result<Vec<NodeIndex>> {
        let holds = self.evaluator.evaluate(&self.condition, &ctx.bindings())?;
        log::debug!("ConditionNode {}: condition evaluated to {}", name, holds);

        let branch = if holds { self.true_node } else { self.false_node };
        Ok(branch.into_iter().collect())
    }

    fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert(Self::PARAM_CONDITION.to_string(), self.condition.clone());
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::error::WorkflowError;
    use crate::expression::JsonLogic;
    use serde_json::json;

    fn make_node(condition: Value, connections: &[Connection]) -> ConditionNode {
        let mut node = ConditionNode::new(condition, Arc::new(JsonLogic));
        node.bind(connections);
        node
    }

    #[test]
    fn test_true_branch() {
        let node = make_node(
            json!({"==": [{"var": "x"}, 1]}),
            &[Connection::new(1, "true"), Connection::new(2, "false")],
        );
        let ctx = ExecutionContext::new();
        ctx.set("x", json!(1));

        assert_eq!(node.determine_next("c", &[], ctx.scoped(&[])).unwrap(), vec![1]);
    }

    #[test]
    fn test_false_branch() {
        let node = make_node(
            json!({"==": [{"var": "x"}, 1]}),
            &[Connection::new(1, "true"), Connection::new(2, "false")],
        );
        let ctx = ExecutionContext::new();
        ctx.set("x", json!(2));

        assert_eq!(node.determine_next("c", &[], ctx.scoped(&[])).unwrap(), vec![2]);
    }

    #[test]
    fn test_missing_branch_terminates_path() {
        let node = make_node(json!(false), &[Connection::new(1, "true")]);
        let ctx = ExecutionContext::new();

        assert!(node.determine_next("c", &[], ctx.scoped(&[])).unwrap().is_empty());
        assert_eq!(node.false_node(), None);
    }

    #[test]
    fn test_sees_loop_bindings() {
        let node = make_node(
            json!({">": [{"var": "item"}, 15]}),
            &[Connection::new(1, "true"), Connection::new(2, "false")],
        );
        let ctx = ExecutionContext::new();
        ctx.update_node_context("loop", "item", json!(20));
        let scopes = vec!["loop".to_string()];

        assert_eq!(node.determine_next("c", &[], ctx.scoped(&scopes)).unwrap(), vec![1]);
        // Without the loop scope `item` is unbound
        assert_eq!(node.determine_next("c", &[], ctx.scoped(&[])).unwrap(), vec![2]);
    }

    #[test]
    fn test_evaluator_error_propagates() {
        let node = make_node(json!({"nope": []}), &[]);
        let ctx = ExecutionContext::new();

        let err = node.determine_next("c", &[], ctx.scoped(&[])).unwrap_err();
        assert!(matches!(err, WorkflowError::Expression(_)));
    }
}
