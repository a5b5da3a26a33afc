use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs::File, io::BufReader, path::Path, time::Duration};

use crate::expression::{ConfigurationError, Operator};
use crate::{Error, InternalResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Shown for a dynamic parameter until its first evaluation resolves.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    /// Fallback message for a required field left empty in strict mode.
    #[serde(default = "default_required_message")]
    pub required_message: String,

    /// Used when a validation expression fails and the field has no message.
    #[serde(default = "default_invalid_message")]
    pub invalid_message: String,

    #[serde(default)]
    pub run_mode: RunMode,

    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

/// How configuration errors surface: loudly while developing a template,
/// as per-field error markers in production.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunMode {
    Development,
    #[default]
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatorConfig {
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    #[serde(default = "default_max_cache_time", with = "duration_secs")]
    pub max_cache_time: Duration,

    /// Operators templates may not use, by canonical name or alias.
    #[serde(default)]
    pub excluded_operators: Vec<String>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            max_cache_time: default_max_cache_time(),
            excluded_operators: Vec::new(),
        }
    }
}

impl EvaluatorConfig {
    pub fn excluded(&self) -> Result<HashSet<Operator>, ConfigurationError> {
        self.excluded_operators
            .iter()
            .map(|name| {
                Operator::from_name(name)
                    .ok_or_else(|| ConfigurationError::UnknownOperator(name.clone()))
            })
            .collect()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
            required_message: default_required_message(),
            invalid_message: default_invalid_message(),
            run_mode: RunMode::default(),
            event_buffer_size: default_event_buffer_size(),
            evaluator: EvaluatorConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }

    pub fn development() -> Self {
        Self {
            run_mode: RunMode::Development,
            ..Default::default()
        }
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", path.display(), e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse json: {}", e)))?;
    Ok(config)
}

// デフォルト値の定義
fn default_placeholder() -> String {
    "Loading...".to_string()
}

fn default_required_message() -> String {
    "Field is required".to_string()
}

fn default_invalid_message() -> String {
    "Invalid input".to_string()
}

fn default_event_buffer_size() -> usize {
    256
}

fn default_max_cache_size() -> usize {
    50
}

fn default_max_cache_time() -> Duration {
    Duration::from_secs(60)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
