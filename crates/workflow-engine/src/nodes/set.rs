//! Variable assignment node

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{string_parameter, NodeBehavior, NodeType};
use crate::context::ScopedContext;
use crate::error::Result;

/// Assigns a value to a global state variable.
///
/// A string `value` is first tried as a context path; if the path does not
/// resolve, the string itself is stored. Non-string values are stored as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct SetNode {
    variable_name: String,
    value: Value,
}

impl SetNode {
    /// Parameter holding the target variable
    pub const PARAM_VARIABLE: &'static str = "variable_name";
    /// Parameter holding the value expression
    pub const PARAM_VALUE: &'static str = "value";

    /// Create a set node
    pub fn new(variable_name: impl Into<String>, value: Value) -> Self {
        Self {
            variable_name: variable_name.into(),
            value,
        }
    }

    pub(crate) fn from_parameters(parameters: &Value) -> Option<Self> {
        Some(Self::new(
            string_parameter(parameters, Self::PARAM_VARIABLE)?,
            parameters.get(Self::PARAM_VALUE)?.clone(),
        ))
    }

    /// Name of the variable written
    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }

    /// The value expression
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Resolve the value expression against the context.
    pub fn resolve(&self, ctx: ScopedContext<'_>) -> Value {
        match &self.value {
            Value::String(expression) => ctx.get(expression, self.value.clone()),
            literal => literal.clone(),
        }
    }
}

#[async_trait]
impl NodeBehavior for SetNode {
    fn node_type(&self) -> NodeType {
        NodeType::Set
    }

    async fn execute(&self, name: &str, ctx: ScopedContext<'_>) -> Result<()> {
        let value = self.resolve(ctx);
        log::debug!("SetNode {}: {} = {}", name, self.variable_name, value);
        ctx.context().set(&self.variable_name, value);
        Ok(())
    }

    fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert(
            Self::PARAM_VARIABLE.to_string(),
            Value::String(self.variable_name.clone()),
        );
        details.insert(Self::PARAM_VALUE.to_string(), self.value.clone());
        details
    }
}
