use serde_json::Value;
use tracing::{debug, instrument};

use crate::eval::EvaluationContext;
use crate::event_bus::FieldEvent;
use crate::expression::Expression;
use crate::form::{FieldDefinition, Response, ResponseStore};
use crate::InternalResult;

use super::FieldOrchestrator;

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultOutcome {
    Applied(Value),
    /// A response already exists, or the default produced nothing.
    Skipped,
    Failed { message: String },
}

impl DefaultOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DefaultOutcome::Applied(_))
    }
}

impl FieldOrchestrator {
    /// Computes the default for an empty response and hands it to
    /// `on_apply`. Existing responses are never touched.
    #[instrument(level = "debug", skip(self, default, current, context, on_apply))]
    pub async fn apply_default<F>(
        &self,
        field: &str,
        default: &Expression,
        current: Option<&Response>,
        context: &EvaluationContext,
        on_apply: F,
    ) -> InternalResult<DefaultOutcome>
    where
        F: FnOnce(Value) + Send,
    {
        if current.is_some_and(|response| !response.is_empty()) {
            return Ok(DefaultOutcome::Skipped);
        }

        let value = match default {
            Expression::Literal(value) => value.clone(),
            _ => match self.evaluate_default(field, default, context).await? {
                Ok(value) => value,
                Err(message) => return Ok(DefaultOutcome::Failed { message }),
            },
        };
        if value.is_null() {
            return Ok(DefaultOutcome::Skipped);
        }

        debug!("applying default to {}", field);
        on_apply(value.clone());
        self.publish(FieldEvent::DefaultApplied {
            field: field.to_string(),
            value: value.clone(),
        });
        Ok(DefaultOutcome::Applied(value))
    }

    async fn evaluate_default(
        &self,
        field: &str,
        default: &Expression,
        context: &EvaluationContext,
    ) -> InternalResult<Result<Value, String>> {
        let resolved = match self.preflight.check(default) {
            Ok(resolved) => resolved,
            Err(error) => {
                let message = error.to_string();
                self.configuration_failure(field, "default", error)?;
                return Ok(Err(message));
            }
        };
        match self.evaluator.evaluate(&resolved, context).await {
            Ok(value) => Ok(Ok(value)),
            Err(error) => {
                self.evaluation_failure(field, "default", &error)?;
                Ok(Err(error.to_string()))
            }
        }
    }

    /// Applies the field's default straight into the store.
    ///
    /// The store is checked again before saving, so a response entered
    /// while the default was being evaluated is kept.
    pub async fn apply_default_to_store(
        &self,
        field: &FieldDefinition,
        store: &ResponseStore,
        context: &EvaluationContext,
    ) -> InternalResult<DefaultOutcome> {
        let Some(default) = &field.default_value else {
            return Ok(DefaultOutcome::Skipped);
        };
        let current = store.get(&field.code).await;
        let bound = context.with_this_response(&field.code);

        let mut computed = None;
        let outcome = self
            .apply_default(&field.code, default, current.as_ref(), &bound, |value| {
                computed = Some(value)
            })
            .await?;

        let Some(value) = computed else {
            return Ok(outcome);
        };
        if store
            .get(&field.code)
            .await
            .is_some_and(|response| !response.is_empty())
        {
            debug!("{} was answered while its default was evaluated", field.code);
            return Ok(DefaultOutcome::Skipped);
        }
        store.save(&field.code, Response::from_value(value)).await?;
        Ok(outcome)
    }
}
