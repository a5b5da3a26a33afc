use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::config::EvaluatorConfig;
use crate::expression::{ConfigurationError, Expression, FragmentTable, Operator};
use crate::form::FieldDefinition;
use crate::functions::FunctionRegistry;

/// Checks an expression against the loaded configuration before it is
/// handed to the evaluator, and returns it with fragments expanded.
#[derive(Debug, Clone)]
pub struct Preflight {
    fragments: Arc<FragmentTable>,
    functions: Arc<FunctionRegistry>,
    excluded: HashSet<Operator>,
}

impl Preflight {
    pub fn new(
        fragments: Arc<FragmentTable>,
        functions: Arc<FunctionRegistry>,
        excluded: HashSet<Operator>,
    ) -> Self {
        Self {
            fragments,
            functions,
            excluded,
        }
    }

    pub fn from_config(
        fragments: Arc<FragmentTable>,
        functions: Arc<FunctionRegistry>,
        config: &EvaluatorConfig,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self::new(fragments, functions, config.excluded()?))
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub fn fragments(&self) -> &Arc<FragmentTable> {
        &self.fragments
    }

    pub fn check(&self, expression: &Expression) -> Result<Expression, ConfigurationError> {
        let resolved = self.fragments.resolve(expression)?;
        self.verify(&resolved)?;
        Ok(resolved)
    }

    /// Checks every expression slot of a field, collecting all failures.
    pub fn check_field(&self, field: &FieldDefinition) -> Vec<(String, ConfigurationError)> {
        field
            .expressions()
            .into_iter()
            .filter_map(|(slot, expression)| self.check(expression).err().map(|e| (slot, e)))
            .collect()
    }

    fn verify(&self, expression: &Expression) -> Result<(), ConfigurationError> {
        let Expression::Operator(node) = expression else {
            return Ok(());
        };
        let operator = Operator::from_name(&node.operator)
            .ok_or_else(|| ConfigurationError::UnknownOperator(node.operator.clone()))?;
        if self.excluded.contains(&operator) {
            return Err(ConfigurationError::ExcludedOperator(node.operator.clone()));
        }
        if operator == Operator::CustomFunctions {
            let path = node
                .named
                .get("functionPath")
                .or_else(|| node.children.first());
            if let Some(Expression::Literal(Value::String(name))) = path {
                if !self.functions.contains(name) {
                    return Err(ConfigurationError::UnregisteredFunction(name.clone()));
                }
            }
        }
        for child in &node.children {
            self.verify(child)?;
        }
        for value in node.named.values() {
            self.verify(value)?;
        }
        Ok(())
    }
}
