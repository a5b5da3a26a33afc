//! Expression Node model
//!
//! Expressions are JSON trees. An object carrying an `operator` key is an
//! operator node, an object carrying a `fragment` key is a reference to a
//! named fragment, and anything else is a literal value.
//!
//! ```text
//! {"operator": "AND", "children": [true, {"fragment": "isAdult"}]}
//!  └─ Operator          └─ Literal  └─ Fragment
//! ```
//!
//! The tree is only a description: operator semantics live in the external
//! evaluator (see [`crate::eval::ExpressionEvaluator`]). This module owns the
//! parts the orchestrator needs before handing a tree over: the operator
//! catalogue, fragment resolution and dependency extraction.

pub mod dependency;
pub mod fragment;
pub mod operator;
pub mod value;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use dependency::{Dependencies, Dependency};
pub use fragment::FragmentTable;
pub use operator::Operator;
pub use value::{is_empty_value, is_truthy};

/// Problems in template configuration, detected before any evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    #[error("Operator excluded from evaluation: {0}")]
    ExcludedOperator(String),
    #[error("Unknown fragment: {0}")]
    UnknownFragment(String),
    #[error("Fragment cycle detected: {}", .0.join(" -> "))]
    FragmentCycle(Vec<String>),
    #[error("Custom function not registered: {0}")]
    UnregisteredFunction(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Expression {
    Literal(Value),
    Operator(OperatorNode),
    Fragment(FragmentNode),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperatorNode {
    pub operator: String,
    pub children: Vec<Expression>,
    /// Named parameters such as `property`, `fallback` or `type`.
    pub named: BTreeMap<String, Expression>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FragmentNode {
    pub fragment: String,
    pub parameters: BTreeMap<String, Expression>,
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn operator(operator: &str, children: Vec<Expression>) -> Self {
        Expression::Operator(OperatorNode {
            operator: operator.to_string(),
            children,
            named: BTreeMap::new(),
        })
    }

    pub fn fragment(name: &str) -> Self {
        Expression::Fragment(FragmentNode {
            fragment: name.to_string(),
            parameters: BTreeMap::new(),
        })
    }

    /// `objectProperties` lookup of a dotted path in the evaluation data.
    pub fn property(path: &str) -> Self {
        Expression::operator("objectProperties", vec![Expression::literal(path)])
    }

    /// Adds a named parameter to an operator or fragment node. Literals are
    /// returned unchanged.
    pub fn with_named(mut self, name: &str, value: Expression) -> Self {
        match &mut self {
            Expression::Operator(node) => {
                node.named.insert(name.to_string(), value);
            }
            Expression::Fragment(node) => {
                node.parameters.insert(name.to_string(), value);
            }
            Expression::Literal(_) => {}
        }
        self
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expression::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Stable textual form, used as a cache key component.
    pub fn canonical(&self) -> String {
        Value::from(self.clone()).to_string()
    }

    fn from_object(mut map: Map<String, Value>) -> Self {
        if let Some(Value::String(operator)) = map.get("operator").cloned() {
            map.remove("operator");
            let children = match map.remove("children") {
                Some(Value::Array(items)) => items.into_iter().map(Expression::from).collect(),
                Some(other) => vec![Expression::from(other)],
                None => Vec::new(),
            };
            let named = map
                .into_iter()
                .map(|(key, value)| (key, Expression::from(value)))
                .collect();
            return Expression::Operator(OperatorNode {
                operator,
                children,
                named,
            });
        }

        if let Some(Value::String(fragment)) = map.get("fragment").cloned() {
            let parameters = match map.remove("parameters") {
                Some(Value::Object(params)) => params
                    .into_iter()
                    .map(|(key, value)| (key, Expression::from(value)))
                    .collect(),
                _ => BTreeMap::new(),
            };
            return Expression::Fragment(FragmentNode {
                fragment,
                parameters,
            });
        }

        Expression::Literal(Value::Object(map))
    }
}

impl Default for Expression {
    fn default() -> Self {
        Expression::Literal(Value::Null)
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Expression::from_object(map),
            other => Expression::Literal(other),
        }
    }
}

impl From<Expression> for Value {
    fn from(expression: Expression) -> Self {
        match expression {
            Expression::Literal(value) => value,
            Expression::Operator(node) => {
                let mut map = Map::new();
                map.insert("operator".to_string(), Value::String(node.operator));
                if !node.children.is_empty() {
                    map.insert(
                        "children".to_string(),
                        Value::Array(node.children.into_iter().map(Value::from).collect()),
                    );
                }
                for (key, value) in node.named {
                    map.insert(key, Value::from(value));
                }
                Value::Object(map)
            }
            Expression::Fragment(node) => {
                let mut map = Map::new();
                map.insert("fragment".to_string(), Value::String(node.fragment));
                if !node.parameters.is_empty() {
                    let parameters = node
                        .parameters
                        .into_iter()
                        .map(|(key, value)| (key, Value::from(value)))
                        .collect();
                    map.insert("parameters".to_string(), Value::Object(parameters));
                }
                Value::Object(map)
            }
        }
    }
}
