use futures::future::join_all;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::eval::EvaluationContext;
use crate::expression::{is_truthy, Expression};
use crate::form::{ElementIndex, FieldDefinition};
use crate::InternalResult;

use super::{FieldOrchestrator, ResolvedParameters, ValidationState};

/// Per-render projection of a field definition over the current responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedFieldState {
    pub code: String,
    pub index: ElementIndex,
    pub is_visible: bool,
    pub is_editable: bool,
    pub is_required: bool,
    pub is_answered: bool,
    pub validation: ValidationState,
    pub parameters: ResolvedParameters,
}

impl EvaluatedFieldState {
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid()
    }

    /// Conservative state for a field whose evaluation failed outright:
    /// shown (so the error is visible), locked and required.
    pub fn fallback(field: &FieldDefinition, message: impl Into<String>) -> Self {
        Self {
            code: field.code.clone(),
            index: field.index,
            is_visible: true,
            is_editable: false,
            is_required: true,
            is_answered: false,
            validation: ValidationState::EvaluationError {
                message: message.into(),
            },
            parameters: ResolvedParameters::default(),
        }
    }
}

impl FieldOrchestrator {
    /// Evaluates a boolean slot. Failures fall back to `on_error`.
    pub(super) async fn evaluate_flag(
        &self,
        field: &str,
        slot: &str,
        expression: &Expression,
        on_error: bool,
        context: &EvaluationContext,
    ) -> InternalResult<bool> {
        if let Expression::Literal(value) = expression {
            return Ok(is_truthy(value));
        }
        let resolved = match self.preflight.check(expression) {
            Ok(resolved) => resolved,
            Err(error) => {
                self.configuration_failure(field, slot, error)?;
                return Ok(on_error);
            }
        };
        match self.evaluator.evaluate(&resolved, context).await {
            Ok(value) => Ok(is_truthy(&value)),
            Err(error) => {
                self.evaluation_failure(field, slot, &error)?;
                Ok(on_error)
            }
        }
    }

    /// Evaluates every dynamic property of `field`.
    ///
    /// The three flags are evaluated concurrently. Parameters are dispatched
    /// and come back as placeholders when not resolved yet. A hidden field is
    /// always valid.
    #[instrument(level = "debug", skip_all, fields(field = %field.code, strict = strict))]
    pub async fn evaluate_field(
        &self,
        field: &FieldDefinition,
        context: &EvaluationContext,
        strict: bool,
    ) -> InternalResult<EvaluatedFieldState> {
        let token = self.issue_validation(&field.code);
        let bound = context.with_this_response(&field.code);
        let (is_visible, is_editable, is_required) = tokio::try_join!(
            self.evaluate_flag(&field.code, "isVisible", &field.is_visible, true, &bound),
            self.evaluate_flag(&field.code, "isEditable", &field.is_editable, false, &bound),
            self.evaluate_flag(&field.code, "isRequired", &field.is_required, true, &bound),
        )?;

        let parameters = self.resolve_parameters(field, context)?;

        let validation = if is_visible {
            self.run_validation(field, token, is_required, strict, &bound).await?
        } else {
            self.record_hidden(field, token);
            ValidationState::Valid
        };

        Ok(EvaluatedFieldState {
            code: field.code.clone(),
            index: field.index,
            is_visible,
            is_editable,
            is_required,
            is_answered: bound.this_response().is_some_and(|r| !r.is_empty()),
            validation,
            parameters,
        })
    }

    /// Evaluates many fields concurrently. A failure in one field never
    /// affects the others; results come back in input order.
    pub async fn evaluate_fields(
        &self,
        fields: &[FieldDefinition],
        context: &EvaluationContext,
        strict: bool,
    ) -> Vec<(String, InternalResult<EvaluatedFieldState>)> {
        let results = join_all(
            fields
                .iter()
                .map(|field| self.evaluate_field(field, context, strict)),
        )
        .await;
        fields
            .iter()
            .zip(results)
            .map(|(field, result)| {
                if let Err(e) = &result {
                    warn!("failed to evaluate field {}: {}", field.code, e);
                }
                (field.code.clone(), result)
            })
            .collect()
    }
}
