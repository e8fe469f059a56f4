//! Condition evaluation for `if` nodes.
//!
//! The engine treats conditions as opaque: a [`ConditionEvaluator`] turns an
//! expression tree plus a bindings object into a boolean. [`JsonLogic`] is
//! the default evaluator. It runs expressions through `jsonlogic-rs`, so
//! `==`, `<` and friends coerce operands the way JavaScript does, and a
//! result counts as true unless it is `false`, `null`, `0`, `""` or `[]`.

use serde_json::{json, Value};

use crate::error::{Result, WorkflowError};

/// Operators defined by JSON-Logic
const OPERATORS: &[&str] = &[
    "var", "missing", "missing_some", "if", "?:", "==", "===", "!=", "!==", "!", "!!", "or",
    "and", ">", ">=", "<", "<=", "max", "min", "+", "-", "*", "/", "%", "map", "reduce",
    "filter", "all", "none", "some", "merge", "in", "cat", "substr", "log",
];

/// Evaluates a condition expression against a bindings object
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate `expression` and report whether it holds.
    fn evaluate(&self, expression: &Value, bindings: &Value) -> Result<bool>;
}

/// JSON-Logic evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLogic;

impl ConditionEvaluator for JsonLogic {
    fn evaluate(&self, expression: &Value, bindings: &Value) -> Result<bool> {
        apply(expression, bindings).map(|v| truthy(&v))
    }
}

/// Evaluate a JSON-Logic expression to a value.
///
/// A single-key object whose key is not a JSON-Logic operator is an error
/// rather than a literal.
pub fn apply(expression: &Value, data: &Value) -> Result<Value> {
    if let Some(op) = unknown_operator(expression) {
        return Err(WorkflowError::expression(format!(
            "Unsupported operator '{}'",
            op
        )));
    }
    jsonlogic_rs::apply(expression, data).map_err(|e| {
        log::debug!("JSON-Logic evaluation of {} failed: {}", expression, e);
        WorkflowError::expression(e.to_string())
    })
}

fn unknown_operator(expression: &Value) -> Option<&str> {
    match expression {
        Value::Array(items) => items.iter().find_map(unknown_operator),
        Value::Object(map) if map.len() == 1 => {
            let (op, args) = map.iter().next()?;
            if OPERATORS.contains(&op.as_str()) {
                unknown_operator(args)
            } else {
                Some(op.as_str())
            }
        }
        _ => None,
    }
}

/// JSON-Logic truthiness
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

/// Build an equality expression `{"==": [{"var": path}, value]}`.
pub fn var_equals(path: &str, value: Value) -> Value {
    json!({ "==": [{ "var": path }, value] })
}
