//! Custom Functions table
//!
//! Pure helpers made available to expressions under the `functions`
//! namespace. Every entry documents itself with a description and a set of
//! default arguments, which preview tooling uses to show an example call.
//!
//! The registry is built once and shared through an `Arc` by every context
//! that evaluates expressions. Preview and authoritative evaluation must see
//! the same table; [`FunctionRegistry::fingerprint`] makes that checkable.

pub mod date;
pub mod number;
pub mod text;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    #[error("Function not found: {0}")]
    NotFound(String),
    #[error("Invalid argument for {function}: {message}")]
    InvalidArgument { function: String, message: String },
}

impl FunctionError {
    pub fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        FunctionError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

pub type FunctionResult<T> = Result<T, FunctionError>;

pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> FunctionResult<Value> + Send + Sync>;

#[derive(Clone)]
pub struct CustomFunction {
    pub function: FunctionImpl,
    pub description: String,
    pub args_default: Vec<Value>,
}

impl CustomFunction {
    pub fn new<F>(description: &str, args_default: Vec<Value>, function: F) -> Self
    where
        F: Fn(&[Value]) -> FunctionResult<Value> + Send + Sync + 'static,
    {
        Self {
            function: Arc::new(function),
            description: description.to_string(),
            args_default,
        }
    }

    pub fn call(&self, args: &[Value]) -> FunctionResult<Value> {
        (self.function)(args)
    }

    /// Runs the function with its documented default arguments.
    pub fn preview(&self) -> FunctionResult<Value> {
        self.call(&self.args_default)
    }
}

impl fmt::Debug for CustomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFunction")
            .field("description", &self.description)
            .field("args_default", &self.args_default)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, CustomFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The helpers every application template can rely on.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        date::register(&mut registry);
        text::register(&mut registry);
        number::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &str, function: CustomFunction) -> Option<CustomFunction> {
        self.functions.insert(name.to_string(), function)
    }

    /// Accepts both `name` and the namespaced `functions.name`.
    pub fn get(&self, name: &str) -> Option<&CustomFunction> {
        self.functions.get(strip_namespace(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn call(&self, name: &str, args: &[Value]) -> FunctionResult<Value> {
        self.get(name)
            .ok_or_else(|| FunctionError::NotFound(name.to_string()))?
            .call(args)
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CustomFunction)> {
        self.functions.iter().map(|(name, f)| (name.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Names, descriptions and default arguments in a stable order.
    pub fn fingerprint(&self) -> String {
        self.functions
            .iter()
            .map(|(name, f)| {
                format!(
                    "{}|{}|{}",
                    name,
                    f.description,
                    Value::Array(f.args_default.clone())
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn strip_namespace(name: &str) -> &str {
    name.strip_prefix("functions.").unwrap_or(name)
}

// 引数アクセス用のヘルパー
pub(crate) fn arg<'a>(args: &'a [Value], index: usize) -> Option<&'a Value> {
    args.get(index).filter(|v| !v.is_null())
}

pub(crate) fn string_arg(function: &str, args: &[Value], index: usize) -> FunctionResult<String> {
    match arg(args, index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(FunctionError::invalid_argument(
            function,
            format!("expected a string at position {}, got {}", index, other),
        )),
        None => Err(FunctionError::invalid_argument(
            function,
            format!("missing argument at position {}", index),
        )),
    }
}

pub(crate) fn number_arg(function: &str, args: &[Value], index: usize) -> FunctionResult<f64> {
    match arg(args, index) {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            FunctionError::invalid_argument(function, format!("{} is not representable", n))
        }),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            FunctionError::invalid_argument(function, format!("\"{}\" is not a number", s))
        }),
        Some(other) => Err(FunctionError::invalid_argument(
            function,
            format!("expected a number at position {}, got {}", index, other),
        )),
        None => Err(FunctionError::invalid_argument(
            function,
            format!("missing argument at position {}", index),
        )),
    }
}
