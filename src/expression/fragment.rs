use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ConfigurationError, Expression, FragmentNode, OperatorNode};

/// Named, reusable sub-expressions.
///
/// A fragment body may refer to the parameters of the node that uses it
/// with `"$name"` string literals; those are substituted during resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentTable {
    fragments: HashMap<String, Expression>,
}

impl FragmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, expression: Expression) -> Option<Expression> {
        self.fragments.insert(name.to_string(), expression)
    }

    pub fn get(&self, name: &str) -> Option<&Expression> {
        self.fragments.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Replaces every fragment node in `expression` by its definition.
    pub fn resolve(&self, expression: &Expression) -> Result<Expression, ConfigurationError> {
        let mut stack = Vec::new();
        self.resolve_inner(expression, &mut stack)
    }

    fn resolve_inner(
        &self,
        expression: &Expression,
        stack: &mut Vec<String>,
    ) -> Result<Expression, ConfigurationError> {
        match expression {
            Expression::Literal(_) => Ok(expression.clone()),
            Expression::Operator(node) => Ok(Expression::Operator(OperatorNode {
                operator: node.operator.clone(),
                children: node
                    .children
                    .iter()
                    .map(|child| self.resolve_inner(child, stack))
                    .collect::<Result<_, _>>()?,
                named: self.resolve_map(&node.named, stack)?,
            })),
            Expression::Fragment(node) => self.expand(node, stack),
        }
    }

    fn resolve_map(
        &self,
        map: &BTreeMap<String, Expression>,
        stack: &mut Vec<String>,
    ) -> Result<BTreeMap<String, Expression>, ConfigurationError> {
        map.iter()
            .map(|(key, value)| Ok((key.clone(), self.resolve_inner(value, stack)?)))
            .collect()
    }

    fn expand(
        &self,
        node: &FragmentNode,
        stack: &mut Vec<String>,
    ) -> Result<Expression, ConfigurationError> {
        if stack.contains(&node.fragment) {
            let mut cycle = stack.clone();
            cycle.push(node.fragment.clone());
            return Err(ConfigurationError::FragmentCycle(cycle));
        }
        let body = self
            .fragments
            .get(&node.fragment)
            .ok_or_else(|| ConfigurationError::UnknownFragment(node.fragment.clone()))?;

        // parameters are resolved in the caller's scope
        let parameters = self.resolve_map(&node.parameters, stack)?;

        stack.push(node.fragment.clone());
        let expanded = self.resolve_inner(body, stack);
        stack.pop();

        Ok(substitute(expanded?, &parameters))
    }
}

fn substitute(expression: Expression, parameters: &BTreeMap<String, Expression>) -> Expression {
    if parameters.is_empty() {
        return expression;
    }
    match expression {
        Expression::Literal(Value::String(s)) => {
            if let Some(replacement) = s.strip_prefix('$').and_then(|name| parameters.get(name)) {
                return replacement.clone();
            }
            Expression::Literal(Value::String(s))
        }
        Expression::Operator(node) => Expression::Operator(OperatorNode {
            operator: node.operator,
            children: node
                .children
                .into_iter()
                .map(|child| substitute(child, parameters))
                .collect(),
            named: node
                .named
                .into_iter()
                .map(|(key, value)| (key, substitute(value, parameters)))
                .collect(),
        }),
        other => other,
    }
}
