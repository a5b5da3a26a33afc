use thiserror::Error;

use crate::eval::EvalError;
use crate::event_bus::EventError;
use crate::expression::ConfigurationError;
use crate::form::StoreError;
use crate::functions::FunctionError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Function error: {0}")]
    Function(#[from] FunctionError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

// エラー作成用のヘルパー関数
impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        match self {
            Error::Configuration(_) => true,
            Error::Eval(e) => e.is_configuration(),
            _ => false,
        }
    }
}
