use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::expression::{ConfigurationError, Expression};
use crate::functions::FunctionError;

use super::context::EvaluationContext;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    #[error("Malformed expression: {0}")]
    Malformed(String),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Function error: {0}")]
    Function(#[from] FunctionError),
    #[error("Evaluation failed: {0}")]
    Other(String),
}

impl EvalError {
    /// Errors caused by the template rather than by the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EvalError::Configuration(_)
                | EvalError::UnknownOperator(_)
                | EvalError::Function(FunctionError::NotFound(_))
        )
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

/// The external expression evaluator.
///
/// Implementations may suspend on network lookups. A successful result is
/// any JSON value; callers decide truthiness themselves.
#[mockall::automock]
#[async_trait]
pub trait ExpressionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        expression: &Expression,
        context: &EvaluationContext,
    ) -> EvalResult<Value>;
}
