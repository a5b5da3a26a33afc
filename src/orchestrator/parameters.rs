use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::eval::EvaluationContext;
use crate::expression::{Dependencies, Expression};
use crate::form::FieldDefinition;
use crate::InternalResult;

use super::{FieldOrchestrator, SlotKey};

/// Current value of one plugin parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum ParameterValue {
    Ready(Value),
    /// No evaluation has resolved yet; holds the placeholder to display.
    Pending(Value),
    Error(String),
}

impl ParameterValue {
    /// Value to render. Errors render as nothing.
    pub fn value(&self) -> Option<&Value> {
        match self {
            ParameterValue::Ready(value) | ParameterValue::Pending(value) => Some(value),
            ParameterValue::Error(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ParameterValue::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ParameterValue::Pending(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ParameterValue::Error(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedParameters(BTreeMap<String, ParameterValue>);

impl ResolvedParameters {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).and_then(ParameterValue::value)
    }

    pub fn status(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.0.values().filter(|v| v.is_pending()).count()
    }

    /// Plain parameter map for the plugin, errors rendered as null.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.0
            .iter()
            .map(|(name, v)| (name.clone(), v.value().cloned().unwrap_or(Value::Null)))
            .collect()
    }

    pub(crate) fn insert(&mut self, name: String, value: ParameterValue) {
        self.0.insert(name, value);
    }
}

impl FieldOrchestrator {
    /// Returns every parameter of `field` with literals passed through and
    /// dynamic ones either at their latest resolved value or at the
    /// placeholder. Dynamic parameters are dispatched in the background;
    /// resolved values arrive as [`crate::event_bus::FieldEvent::ParameterResolved`].
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(level = "debug", skip_all, fields(field = %field.code))]
    pub fn resolve_parameters(
        &self,
        field: &FieldDefinition,
        context: &EvaluationContext,
    ) -> InternalResult<ResolvedParameters> {
        let bound = context.with_this_response(&field.code);
        let mut resolved = ResolvedParameters::default();
        for (name, expression) in &field.parameters {
            let value = match expression {
                Expression::Literal(value) => ParameterValue::Ready(value.clone()),
                _ => self.dispatch_parameter(&field.code, name, expression, &bound, false)?,
            };
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }

    /// Current value of a parameter slot without dispatching anything.
    pub fn parameter(&self, field: &str, name: &str) -> Option<ParameterValue> {
        self.slots
            .get(&SlotKey::parameter(field, name))
            .map(|slot| slot.value.clone())
    }

    pub(super) fn dispatch_parameter(
        &self,
        field: &str,
        name: &str,
        expression: &Expression,
        context: &EvaluationContext,
        force: bool,
    ) -> InternalResult<ParameterValue> {
        let key = SlotKey::parameter(field, name);
        match self.preflight.check(expression) {
            Ok(resolved) => {
                self.dependencies
                    .insert(key.clone(), Dependencies::of(&resolved));
                Ok(self.issue(key, resolved, context.clone(), force))
            }
            Err(error) => {
                let slot = key.slot.to_string();
                let value = ParameterValue::Error(error.to_string());
                self.mark_failed(key, value.clone());
                self.configuration_failure(field, &slot, error)?;
                Ok(value)
            }
        }
    }
}
