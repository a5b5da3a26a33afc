//! # figform
//!
//! Dynamic field evaluation for configurable forms.
//!
//! Templates describe form fields whose visibility, editability,
//! required-ness, validation, default value and plugin parameters are
//! expression trees. [`orchestrator::FieldOrchestrator`] evaluates them
//! against the current responses through an injected
//! [`eval::ExpressionEvaluator`] and keeps the results in step as
//! responses change.
//!
//! ```text
//! ResponseStore ──snapshot──▶ EvaluationContext ──▶ FieldOrchestrator ──▶ EvaluatedFieldState
//!       │                                                │
//!       └──── ResponseChange ──▶ invalidation ───────────┘──▶ EventBus
//! ```

pub mod config;
pub mod error;
pub mod eval;
pub mod event_bus;
pub mod expression;
pub mod form;
pub mod functions;
pub mod orchestrator;
pub mod progress;

// Re-exports
pub use error::*;
pub use eval::{EvaluationContext, ExpressionEvaluator};
pub use expression::Expression;
pub use form::{FieldDefinition, Response, ResponseStore};
pub use orchestrator::FieldOrchestrator;

#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    // テスト用のtracing_subscriber初期化
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
