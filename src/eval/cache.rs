use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

use crate::config::EvaluatorConfig;
use crate::expression::Expression;

use super::{context::EvaluationContext, evaluator::EvalResult, ExpressionEvaluator};

/// Identifies one evaluation request: the expression plus the context data.
pub(crate) fn evaluation_key(expression: &Expression, context: &EvaluationContext) -> u64 {
    let mut hasher = DefaultHasher::new();
    expression.canonical().hash(&mut hasher);
    context.fingerprint().hash(&mut hasher);
    hasher.finish()
}

struct CacheEntry {
    value: Value,
    inserted: Instant,
}

/// Result cache in front of an evaluator.
///
/// Keys cover both the expression and the full context data, so a fresh
/// context is a fresh key. Failed evaluations are never cached.
pub struct CachedEvaluator<E> {
    inner: E,
    entries: DashMap<u64, CacheEntry>,
    max_size: usize,
    max_age: Duration,
}

impl<E: ExpressionEvaluator> CachedEvaluator<E> {
    pub fn new(inner: E, config: &EvaluatorConfig) -> Self {
        Self::with_limits(inner, config.max_cache_size, config.max_cache_time)
    }

    pub fn with_limits(inner: E, max_size: usize, max_age: Duration) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            max_size,
            max_age,
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn lookup(&self, key: u64) -> Option<Value> {
        // ガードを保持したままremoveしない
        let hit = self
            .entries
            .get(&key)
            .map(|entry| (entry.inserted.elapsed() < self.max_age, entry.value.clone()));
        match hit {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: u64, value: Value) {
        if self.max_size == 0 {
            return;
        }
        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.inserted)
                .map(|entry| *entry.key());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted: Instant::now(),
            },
        );
    }
}

#[async_trait]
impl<E: ExpressionEvaluator> ExpressionEvaluator for CachedEvaluator<E> {
    async fn evaluate(
        &self,
        expression: &Expression,
        context: &EvaluationContext,
    ) -> EvalResult<Value> {
        let key = evaluation_key(expression, context);
        if let Some(value) = self.lookup(key) {
            trace!("evaluation cache hit");
            return Ok(value);
        }
        let value = self.inner.evaluate(expression, context).await?;
        self.store(key, value.clone());
        Ok(value)
    }
}
