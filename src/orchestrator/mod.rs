//! Field Expression Orchestrator
//!
//! Resolves the dynamic properties of form fields (visibility, editability,
//! required-ness, validation, default value and plugin parameters) by
//! evaluating their expressions against the current responses.
//!
//! ## Request tokens
//!
//! Every dispatched parameter evaluation and every validation gets a token
//! from a monotonically increasing counter, and the slot remembers the latest
//! token issued for it.
//! When an evaluation completes, its result is applied only if its token is
//! still the latest one; anything older is discarded. The last issued
//! request therefore wins regardless of completion order.
//!
//! ```text
//! issue #1 ──────────────────────────▶ resolves (stale, dropped)
//! issue #2 ─────────▶ resolves (applied)
//! ```
//!
//! ## Dependency index
//!
//! The resolved expression of each slot is scanned for the responses it
//! reads. A response change re-issues only the slots whose dependencies
//! intersect the changed codes. See [`crate::expression::Dependencies`].

mod defaults;
mod invalidation;
mod parameters;
mod state;
mod validation;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

pub use defaults::DefaultOutcome;
pub use parameters::{ParameterValue, ResolvedParameters};
pub use state::EvaluatedFieldState;
pub use validation::ValidationState;

use crate::config::{OrchestratorConfig, RunMode};
use crate::eval::{EvalError, EvaluationContext, ExpressionEvaluator, Preflight};
use crate::event_bus::{ErrorEvent, ErrorKind, ErrorReceiver, EventBus, EventReceiver, FieldEvent};
use crate::expression::{ConfigurationError, Dependencies, Expression, FragmentTable};
use crate::functions::FunctionRegistry;
use crate::{Error, InternalResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Parameter(String),
    Validation,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Parameter(name) => write!(f, "parameters.{}", name),
            Slot::Validation => write!(f, "validation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub field: String,
    pub slot: Slot,
}

impl SlotKey {
    pub fn parameter(field: &str, name: &str) -> Self {
        Self {
            field: field.to_string(),
            slot: Slot::Parameter(name.to_string()),
        }
    }

    pub fn validation(field: &str) -> Self {
        Self {
            field: field.to_string(),
            slot: Slot::Validation,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.field, self.slot)
    }
}

#[derive(Debug, Clone)]
struct ParameterSlot {
    /// Token of the most recently issued evaluation.
    latest: u64,
    /// Expression and context fingerprint of that evaluation.
    fingerprint: u64,
    value: ParameterValue,
}

pub struct FieldOrchestrator {
    evaluator: Arc<dyn ExpressionEvaluator>,
    preflight: Preflight,
    config: OrchestratorConfig,
    event_bus: Arc<EventBus>,
    slots: Arc<DashMap<SlotKey, ParameterSlot>>,
    validations: DashMap<String, ValidationState>,
    /// Token of the most recently issued validation per field.
    validation_tokens: DashMap<String, u64>,
    dependencies: DashMap<SlotKey, Dependencies>,
    next_token: AtomicU64,
    in_flight: DashMap<u64, JoinHandle<()>>,
}

impl FieldOrchestrator {
    pub fn new(
        evaluator: Arc<dyn ExpressionEvaluator>,
        fragments: Arc<FragmentTable>,
        functions: Arc<FunctionRegistry>,
        config: OrchestratorConfig,
    ) -> InternalResult<Self> {
        let preflight = Preflight::from_config(fragments, functions, &config.evaluator)?;
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Ok(Self {
            evaluator,
            preflight,
            config,
            event_bus,
            slots: Arc::new(DashMap::new()),
            validations: DashMap::new(),
            validation_tokens: DashMap::new(),
            dependencies: DashMap::new(),
            next_token: AtomicU64::new(0),
            in_flight: DashMap::new(),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        self.preflight.functions()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn subscribe(&self) -> (EventReceiver, ErrorReceiver) {
        self.event_bus.subscribe()
    }

    /// Number of evaluation tasks that have not been awaited yet.
    pub fn pending_evaluations(&self) -> usize {
        self.in_flight.iter().filter(|h| !h.is_finished()).count()
    }

    /// Dependencies recorded for a slot when it was last dispatched.
    pub fn dependencies_of(&self, key: &SlotKey) -> Option<Dependencies> {
        self.dependencies.get(key).map(|d| d.clone())
    }

    /// Waits until every dispatched evaluation has completed.
    pub async fn settled(&self) {
        loop {
            let tokens: Vec<u64> = self.in_flight.iter().map(|entry| *entry.key()).collect();
            if tokens.is_empty() {
                return;
            }
            let handles: Vec<JoinHandle<()>> = tokens
                .into_iter()
                .filter_map(|token| self.in_flight.remove(&token).map(|(_, handle)| handle))
                .collect();
            for result in join_all(handles).await {
                if let Err(e) = result {
                    warn!("evaluation task failed: {}", e);
                }
            }
        }
    }

    fn placeholder(&self) -> ParameterValue {
        ParameterValue::Pending(Value::String(self.config.placeholder.clone()))
    }

    fn issue_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Dispatches an evaluation for `key` and returns the value to show
    /// until it resolves. An identical request (same expression, same
    /// context data) is not dispatched twice unless `force` is set.
    fn issue(
        &self,
        key: SlotKey,
        expression: Expression,
        context: EvaluationContext,
        force: bool,
    ) -> ParameterValue {
        let fingerprint = crate::eval::cache::evaluation_key(&expression, &context);
        let token = self.issue_token();
        let current = {
            let mut slot = self.slots.entry(key.clone()).or_insert_with(|| ParameterSlot {
                latest: 0,
                fingerprint: 0,
                value: self.placeholder(),
            });
            if !force && slot.latest != 0 && slot.fingerprint == fingerprint {
                return slot.value.clone();
            }
            slot.latest = token;
            slot.fingerprint = fingerprint;
            slot.value.clone()
        };
        debug!("issued evaluation {} for {}", token, key);

        let task = EvaluationTask {
            evaluator: self.evaluator.clone(),
            slots: self.slots.clone(),
            event_bus: self.event_bus.clone(),
            key,
            token,
            expression,
            context,
        };
        self.in_flight.retain(|_, handle| !handle.is_finished());
        self.in_flight.insert(token, tokio::spawn(task.run()));
        current
    }

    /// Records a slot whose expression cannot be dispatched, superseding
    /// any evaluation still in flight for it.
    fn mark_failed(&self, key: SlotKey, value: ParameterValue) {
        let token = self.issue_token();
        self.slots.insert(
            key,
            ParameterSlot {
                latest: token,
                fingerprint: 0,
                value,
            },
        );
    }

    fn report(&self, field: &str, slot: &str, kind: ErrorKind, message: String) {
        warn!("{} error in {}.{}: {}", kind, field, slot, message);
        self.event_bus.publish_error(ErrorEvent {
            field: field.to_string(),
            slot: slot.to_string(),
            kind,
            message,
        });
    }

    /// Configuration errors fail loudly in development and degrade to a
    /// per-field marker in production.
    fn configuration_failure(
        &self,
        field: &str,
        slot: &str,
        error: ConfigurationError,
    ) -> InternalResult<()> {
        self.report(field, slot, ErrorKind::Configuration, error.to_string());
        match self.config.run_mode {
            RunMode::Development => Err(Error::Configuration(error)),
            RunMode::Production => Ok(()),
        }
    }

    fn evaluation_failure(&self, field: &str, slot: &str, error: &EvalError) -> InternalResult<()> {
        if error.is_configuration() {
            self.report(field, slot, ErrorKind::Configuration, error.to_string());
            if self.config.run_mode == RunMode::Development {
                return Err(Error::Eval(error.clone()));
            }
            return Ok(());
        }
        self.report(field, slot, ErrorKind::Evaluation, error.to_string());
        Ok(())
    }

    fn publish(&self, event: FieldEvent) {
        self.event_bus.publish(event);
    }
}

struct EvaluationTask {
    evaluator: Arc<dyn ExpressionEvaluator>,
    slots: Arc<DashMap<SlotKey, ParameterSlot>>,
    event_bus: Arc<EventBus>,
    key: SlotKey,
    token: u64,
    expression: Expression,
    context: EvaluationContext,
}

impl EvaluationTask {
    async fn run(self) {
        let trace_id = Uuid::new_v4();
        debug!(%trace_id, "evaluating {} (token {})", self.key, self.token);
        let result = self.evaluator.evaluate(&self.expression, &self.context).await;

        let (value, error) = match result {
            Ok(value) => (ParameterValue::Ready(value), None),
            Err(e) => (ParameterValue::Error(e.to_string()), Some(e)),
        };

        let token = self.token;
        let accepted = self.slots.get_mut(&self.key).and_then(|mut slot| {
            if slot.latest != token {
                return None;
            }
            slot.value = value;
            Some(slot.value.clone())
        });

        let Some(value) = accepted else {
            debug!(%trace_id, "discarding stale result for {} (token {})", self.key, token);
            return;
        };

        if let Some(error) = error {
            let kind = if error.is_configuration() {
                ErrorKind::Configuration
            } else {
                ErrorKind::Evaluation
            };
            warn!(%trace_id, "{} error in {}: {}", kind, self.key, error);
            self.event_bus.publish_error(ErrorEvent {
                field: self.key.field.clone(),
                slot: self.key.slot.to_string(),
                kind,
                message: error.to_string(),
            });
        }

        if let Slot::Parameter(parameter) = &self.key.slot {
            self.event_bus.publish(FieldEvent::ParameterResolved {
                field: self.key.field.clone(),
                parameter: parameter.clone(),
                value,
            });
        }
    }
}
