use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::eval::EvaluationContext;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Assigned by the store on first save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    /// Plugin-specific structured value (date, number, list, files...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// `None` until validation has run.
    #[serde(default)]
    pub is_valid: Option<bool>,
}

impl Response {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Builds a response from a computed value, e.g. an evaluated default.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self {
                text: Some(text),
                ..Default::default()
            },
            Value::Null => Self::default(),
            other => Self {
                text: Some(match &other {
                    Value::Object(map) => map
                        .get("text")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| other.to_string()),
                    _ => other.to_string(),
                }),
                payload: other,
                ..Default::default()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, str::is_empty) && self.payload.is_null()
    }

    /// Shape exposed to expressions: `{text, id, isValid, ...payload}`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Value::Object(payload) = &self.payload {
            map.extend(payload.clone());
        } else if !self.payload.is_null() {
            map.insert("payload".to_string(), self.payload.clone());
        }
        map.insert("text".to_string(), json!(self.text));
        map.insert("id".to_string(), json!(self.id));
        map.insert("isValid".to_string(), json!(self.is_valid));
        Value::Object(map)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Response code must not be empty")]
    EmptyCode,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseChange {
    pub code: String,
    pub revision: u64,
}

/// Current responses keyed by field code.
pub struct ResponseStore {
    responses: RwLock<HashMap<String, Response>>,
    revision: AtomicU64,
    next_id: AtomicI64,
    sender: broadcast::Sender<ResponseChange>,
}

impl Default for ResponseStore {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ResponseStore {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            responses: RwLock::new(HashMap::new()),
            revision: AtomicU64::new(0),
            next_id: AtomicI64::new(1),
            sender,
        }
    }

    pub async fn get(&self, code: &str) -> Option<Response> {
        self.responses.read().await.get(code).cloned()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// The only way to mutate a response.
    pub async fn save(&self, code: &str, mut response: Response) -> StoreResult<ResponseChange> {
        if code.is_empty() {
            return Err(StoreError::EmptyCode);
        }
        let mut responses = self.responses.write().await;
        if response.id.is_none() {
            response.id = responses
                .get(code)
                .and_then(|existing| existing.id)
                .or_else(|| Some(self.next_id.fetch_add(1, Ordering::SeqCst)));
        }
        responses.insert(code.to_string(), response);
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        drop(responses);

        let change = ResponseChange {
            code: code.to_string(),
            revision,
        };
        debug!("response saved: {} (revision {})", code, revision);
        // 購読者がいない場合は無視
        let _ = self.sender.send(change.clone());
        Ok(change)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResponseChange> {
        self.sender.subscribe()
    }

    pub async fn responses(&self) -> HashMap<String, Response> {
        self.responses.read().await.clone()
    }

    /// Captures an immutable evaluation context at the current revision.
    pub async fn snapshot(&self, current_user: Value, application_data: Value) -> EvaluationContext {
        let responses = self.responses.read().await;
        EvaluationContext::new(
            Arc::new(responses.clone()),
            current_user,
            application_data,
            self.revision(),
        )
    }
}
