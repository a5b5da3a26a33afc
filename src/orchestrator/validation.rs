use serde::Serialize;
use tracing::{debug, instrument};

use crate::eval::EvaluationContext;
use crate::event_bus::FieldEvent;
use crate::expression::{is_truthy, Dependencies, Dependency, Expression};
use crate::form::{FieldDefinition, Response};
use crate::InternalResult;

use super::{FieldOrchestrator, SlotKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ValidationState {
    Valid,
    Invalid { message: String },
    /// The validation expression could not be evaluated. Not valid, but
    /// not a user error either.
    EvaluationError { message: String },
}

impl ValidationState {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationState::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationState::Invalid { .. })
    }

    pub fn is_evaluation_error(&self) -> bool {
        matches!(self, ValidationState::EvaluationError { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ValidationState::Valid => None,
            ValidationState::Invalid { message } | ValidationState::EvaluationError { message } => {
                Some(message)
            }
        }
    }
}

impl FieldOrchestrator {
    /// Validates the response bound as `thisResponse` in `context`.
    ///
    /// A failing validation expression wins over the required check, and
    /// the required check only applies in strict mode.
    #[instrument(level = "debug", skip_all, fields(field = context.this_code().unwrap_or_default()))]
    pub async fn evaluate_validation(
        &self,
        validation: Option<&Expression>,
        validation_message: Option<&str>,
        required: bool,
        strict: bool,
        context: &EvaluationContext,
    ) -> InternalResult<ValidationState> {
        let field = context.this_code().unwrap_or_default().to_string();

        if let Some(expression) = validation {
            let passed = match expression {
                Expression::Literal(value) => Ok(is_truthy(value)),
                _ => self.check_validation(&field, expression, context).await?,
            };
            match passed {
                Ok(true) => {}
                Ok(false) => {
                    let message = validation_message
                        .map(str::to_string)
                        .unwrap_or_else(|| self.config.invalid_message.clone());
                    return Ok(ValidationState::Invalid { message });
                }
                Err(message) => return Ok(ValidationState::EvaluationError { message }),
            }
        }

        let empty = context.this_response().map_or(true, Response::is_empty);
        if required && strict && empty {
            return Ok(ValidationState::Invalid {
                message: self.config.required_message.clone(),
            });
        }
        Ok(ValidationState::Valid)
    }

    /// Outer result carries development-mode configuration failures, the
    /// inner one the outcome for this field.
    async fn check_validation(
        &self,
        field: &str,
        expression: &Expression,
        context: &EvaluationContext,
    ) -> InternalResult<Result<bool, String>> {
        let slot = SlotKey::validation(field).slot.to_string();
        let resolved = match self.preflight.check(expression) {
            Ok(resolved) => resolved,
            Err(error) => {
                let message = error.to_string();
                self.configuration_failure(field, &slot, error)?;
                return Ok(Err(message));
            }
        };

        match self.evaluator.evaluate(&resolved, context).await {
            Ok(value) => Ok(Ok(is_truthy(&value))),
            Err(error) => {
                self.evaluation_failure(field, &slot, &error)?;
                Ok(Err(error.to_string()))
            }
        }
    }

    /// Validates the stored response of `field`, remembering the outcome
    /// and publishing a change event when it differs from the last one.
    ///
    /// When several validations of one field overlap, only the one issued
    /// last is remembered.
    pub async fn validate_field(
        &self,
        field: &FieldDefinition,
        required: bool,
        strict: bool,
        context: &EvaluationContext,
    ) -> InternalResult<ValidationState> {
        let token = self.issue_validation(&field.code);
        self.run_validation(field, token, required, strict, context).await
    }

    /// Validates a value the user has entered but not saved yet.
    pub async fn validate_candidate(
        &self,
        field: &FieldDefinition,
        candidate: Response,
        strict: bool,
        context: &EvaluationContext,
    ) -> InternalResult<ValidationState> {
        let token = self.issue_validation(&field.code);
        let bound = context.with_candidate(&field.code, candidate);
        let required = self
            .evaluate_flag(&field.code, "isRequired", &field.is_required, true, &bound)
            .await?;
        self.run_validation(field, token, required, strict, &bound).await
    }

    /// Re-validates the stored response of `field` from scratch: a hidden
    /// field is valid, otherwise required-ness is evaluated again first.
    pub(super) async fn revalidate(
        &self,
        field: &FieldDefinition,
        strict: bool,
        context: &EvaluationContext,
    ) -> InternalResult<ValidationState> {
        let token = self.issue_validation(&field.code);
        let bound = context.with_this_response(&field.code);
        let visible = self
            .evaluate_flag(&field.code, "isVisible", &field.is_visible, true, &bound)
            .await?;
        if !visible {
            self.record_hidden(field, token);
            return Ok(ValidationState::Valid);
        }
        let required = self
            .evaluate_flag(&field.code, "isRequired", &field.is_required, true, &bound)
            .await?;
        self.run_validation(field, token, required, strict, &bound).await
    }

    pub(super) async fn run_validation(
        &self,
        field: &FieldDefinition,
        token: u64,
        required: bool,
        strict: bool,
        context: &EvaluationContext,
    ) -> InternalResult<ValidationState> {
        let bound = if context.this_code() == Some(field.code.as_str()) {
            context.clone()
        } else {
            context.with_this_response(&field.code)
        };
        self.track_validation(field);
        let state = self
            .evaluate_validation(
                field.validation.as_ref(),
                field.validation_message.as_deref(),
                required,
                strict,
                &bound,
            )
            .await?;
        self.record_validation(&field.code, token, state.clone());
        Ok(state)
    }

    /// Records `Valid` for a field that is not shown.
    pub(super) fn record_hidden(&self, field: &FieldDefinition, token: u64) {
        self.track_validation(field);
        self.record_validation(&field.code, token, ValidationState::Valid);
    }

    /// Indexes what the recorded validation of `field` depends on: its own
    /// response and everything its visibility, required-ness and validation
    /// expressions read.
    fn track_validation(&self, field: &FieldDefinition) {
        let mut dependencies = Dependencies::default();
        dependencies.insert(Dependency::ThisResponse);
        let expressions = [
            Some(&field.is_visible),
            Some(&field.is_required),
            field.validation.as_ref(),
        ];
        for expression in expressions.into_iter().flatten() {
            match self.preflight.check(expression) {
                Ok(resolved) => dependencies.merge(Dependencies::of(&resolved)),
                // 解決できない式は常に無効化
                Err(_) => dependencies.merge(Dependencies::Unknown),
            }
        }
        self.dependencies.insert(SlotKey::validation(&field.code), dependencies);
    }

    /// Takes a token for a new validation of `field`, superseding any
    /// validation of it still running.
    pub(super) fn issue_validation(&self, field: &str) -> u64 {
        let mut latest = self.validation_tokens.entry(field.to_string()).or_insert(0);
        let token = self.issue_token();
        *latest = token;
        token
    }

    /// Last recorded validation outcome of a field.
    pub fn validation_state(&self, field: &str) -> Option<ValidationState> {
        self.validations.get(field).map(|state| state.clone())
    }

    pub(super) fn record_validation(&self, field: &str, token: u64, state: ValidationState) {
        // トークンのガードを保持したまま記録する
        let latest = self.validation_tokens.get(field);
        if latest.as_deref().is_some_and(|latest| *latest != token) {
            debug!("discarding stale validation {} of {}", token, field);
            return;
        }
        let previous = self.validations.insert(field.to_string(), state.clone());
        if previous.as_ref() != Some(&state) {
            debug!("validation of {} is now {:?}", field, state);
            self.publish(FieldEvent::ValidationChanged {
                field: field.to_string(),
                state,
            });
        }
    }
}
