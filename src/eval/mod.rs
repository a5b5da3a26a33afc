//! Evaluation seam
//!
//! The expression evaluator itself is an external collaborator. This module
//! defines the contract the orchestrator relies on and the pieces that sit
//! in front of it.
//!
//! # Core Components
//!
//! ## ExpressionEvaluator
//! Async trait implemented by the external tree-walking interpreter (and by
//! test doubles). Failures come back as [`EvalError`], never as a falsy
//! value.
//!
//! ## EvaluationContext
//! Immutable snapshot of the data exposed to expressions: all responses,
//! `thisResponse`, the current user and application metadata.
//!
//! ## Preflight
//! Resolves fragments and rejects unknown or excluded operators and
//! unregistered custom functions before anything is dispatched.
//!
//! ## CachedEvaluator
//! Bounded result cache (size and age) wrapped around any evaluator.

pub mod cache;
pub mod context;
pub mod evaluator;
pub mod preflight;

pub use cache::CachedEvaluator;
pub use context::EvaluationContext;
pub use evaluator::{EvalError, EvalResult, ExpressionEvaluator, MockExpressionEvaluator};
pub use preflight::Preflight;
