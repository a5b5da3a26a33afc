use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use serde_json::{json, Map, Value};

use crate::form::Response;

/// Data exposed to expressions during one evaluation.
///
/// A context is a snapshot: cloning is cheap and nothing in it changes after
/// construction. Every pending evaluation holds its own copy, so responses
/// saved while it is in flight never leak into it.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    shared: Arc<ContextData>,
    this_response: Option<ThisResponse>,
}

#[derive(Debug, Default)]
struct ContextData {
    responses: Arc<HashMap<String, Response>>,
    current_user: Value,
    application_data: Value,
    revision: u64,
    /// Hash of the shared data, computed on first use.
    fingerprint: OnceLock<u64>,
}

impl ContextData {
    fn fingerprint(&self) -> u64 {
        *self.fingerprint.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            let mut codes: Vec<&String> = self.responses.keys().collect();
            codes.sort();
            for code in codes {
                code.hash(&mut hasher);
                self.responses[code].to_value().to_string().hash(&mut hasher);
            }
            self.current_user.to_string().hash(&mut hasher);
            self.application_data.to_string().hash(&mut hasher);
            hasher.finish()
        })
    }
}

#[derive(Debug, Clone)]
enum ThisResponse {
    Field(String),
    // 未保存の入力値を検証する場合
    Candidate { code: String, response: Response },
}

impl EvaluationContext {
    pub fn new(
        responses: Arc<HashMap<String, Response>>,
        current_user: Value,
        application_data: Value,
        revision: u64,
    ) -> Self {
        Self {
            shared: Arc::new(ContextData {
                responses,
                current_user,
                application_data,
                revision,
                fingerprint: OnceLock::new(),
            }),
            this_response: None,
        }
    }

    pub fn from_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = (S, Response)>,
        S: Into<String>,
    {
        let responses = responses
            .into_iter()
            .map(|(code, response)| (code.into(), response))
            .collect();
        Self::new(Arc::new(responses), Value::Null, Value::Null, 0)
    }

    /// Binds `thisResponse` to the stored response of `code`.
    pub fn with_this_response(&self, code: &str) -> Self {
        Self {
            shared: self.shared.clone(),
            this_response: Some(ThisResponse::Field(code.to_string())),
        }
    }

    /// Binds `thisResponse` to a value that has not been saved yet.
    pub fn with_candidate(&self, code: &str, response: Response) -> Self {
        Self {
            shared: self.shared.clone(),
            this_response: Some(ThisResponse::Candidate {
                code: code.to_string(),
                response,
            }),
        }
    }

    pub fn this_code(&self) -> Option<&str> {
        match &self.this_response {
            Some(ThisResponse::Field(code)) | Some(ThisResponse::Candidate { code, .. }) => {
                Some(code.as_str())
            }
            None => None,
        }
    }

    pub fn this_response(&self) -> Option<&Response> {
        match &self.this_response {
            Some(ThisResponse::Field(code)) => self.shared.responses.get(code),
            Some(ThisResponse::Candidate { response, .. }) => Some(response),
            None => None,
        }
    }

    pub fn response(&self, code: &str) -> Option<&Response> {
        match &self.this_response {
            Some(ThisResponse::Candidate { code: own, response }) if own == code => Some(response),
            _ => self.shared.responses.get(code),
        }
    }

    pub fn responses(&self) -> &HashMap<String, Response> {
        &self.shared.responses
    }

    pub fn current_user(&self) -> &Value {
        &self.shared.current_user
    }

    pub fn application_data(&self) -> &Value {
        &self.shared.application_data
    }

    /// Response store revision this snapshot was taken at.
    pub fn revision(&self) -> u64 {
        self.shared.revision
    }

    /// Hash identifying the data this context exposes.
    ///
    /// Two contexts with equal fingerprints produce the same [`data`](Self::data).
    /// The snapshot part is hashed once and shared by every binding of it.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.shared.fingerprint().hash(&mut hasher);
        match &self.this_response {
            None => 0u8.hash(&mut hasher),
            Some(ThisResponse::Field(code)) => {
                1u8.hash(&mut hasher);
                code.hash(&mut hasher);
            }
            Some(ThisResponse::Candidate { code, response }) => {
                2u8.hash(&mut hasher);
                code.hash(&mut hasher);
                response.to_value().to_string().hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// The JSON object handed to the evaluator.
    pub fn data(&self) -> Value {
        let this_text = self
            .this_response()
            .and_then(|r| r.text.clone())
            .map(Value::String)
            .unwrap_or(Value::Null);

        let mut responses: Map<String, Value> = self
            .shared
            .responses
            .iter()
            .map(|(code, response)| (code.clone(), response.to_value()))
            .collect();
        if let Some(ThisResponse::Candidate { code, response }) = &self.this_response {
            responses.insert(code.clone(), response.to_value());
        }
        responses.insert("thisResponse".to_string(), this_text.clone());

        json!({
            "responses": responses,
            "thisResponse": this_text,
            "currentUser": self.shared.current_user,
            "applicationData": self.shared.application_data,
        })
    }
}
