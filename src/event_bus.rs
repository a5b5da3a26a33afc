//! Field event bus
//!
//! Rendering code subscribes here to learn when evaluated state changes.
//! Evaluation and configuration errors travel on a separate channel so they
//! can be shown as non-blocking notices instead of inline validation
//! messages.

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::trace;

use crate::orchestrator::{ParameterValue, ValidationState};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    ParameterResolved {
        field: String,
        parameter: String,
        value: ParameterValue,
    },
    ValidationChanged {
        field: String,
        state: ValidationState,
    },
    DefaultApplied {
        field: String,
        value: Value,
    },
}

impl FieldEvent {
    pub fn field(&self) -> &str {
        match self {
            FieldEvent::ParameterResolved { field, .. }
            | FieldEvent::ValidationChanged { field, .. }
            | FieldEvent::DefaultApplied { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    Evaluation,
    Configuration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub field: String,
    /// Expression slot that failed, e.g. `validation` or `parameters.label`.
    pub slot: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("Lagged behind by {count} events")]
    Lagged { count: u64 },
    #[error("Failed to receive event: {message}")]
    RecieveFailed { message: String },
}

pub type EventResult<T> = Result<T, EventError>;

pub struct EventBus {
    event_sender: broadcast::Sender<FieldEvent>,
    error_sender: broadcast::Sender<ErrorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(capacity.max(1));
        let (error_sender, _) = broadcast::channel(capacity.max(1));
        Self {
            event_sender,
            error_sender,
        }
    }

    pub fn subscribe(&self) -> (EventReceiver, ErrorReceiver) {
        let event_rx = self.event_sender.subscribe();
        let error_rx = self.error_sender.subscribe();
        (EventReceiver::new(event_rx), ErrorReceiver::new(error_rx))
    }

    /// Returns how many subscribers saw the event. Publishing with nobody
    /// listening is not an error.
    pub fn publish(&self, event: FieldEvent) -> usize {
        self.event_sender.send(event).unwrap_or_else(|_| {
            trace!("field event dropped: no subscribers");
            0
        })
    }

    pub fn publish_error(&self, error: ErrorEvent) -> usize {
        self.error_sender.send(error).unwrap_or_else(|_| {
            trace!("error event dropped: no subscribers");
            0
        })
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<FieldEvent>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<FieldEvent>) -> Self {
        Self { receiver }
    }

    /// イベントを受信する。Laggedエラーが発生した場合はresubscribeを試みて、エラーを返す。
    pub async fn recv(&mut self) -> EventResult<FieldEvent> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count: n })
            }
            Err(e) => Err(EventError::RecieveFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Already-delivered events, without waiting.
    pub fn drain(&mut self) -> Vec<FieldEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stream of events; lagged gaps are skipped.
    pub fn into_stream(self) -> impl Stream<Item = FieldEvent> {
        BroadcastStream::new(self.receiver).filter_map(|event| event.ok())
    }
}

pub struct ErrorReceiver {
    receiver: broadcast::Receiver<ErrorEvent>,
}

impl ErrorReceiver {
    fn new(receiver: broadcast::Receiver<ErrorEvent>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> EventResult<ErrorEvent> {
        self.receiver
            .recv()
            .await
            .map_err(|e| EventError::RecieveFailed {
                message: e.to_string(),
            })
    }

    pub fn drain(&mut self) -> Vec<ErrorEvent> {
        let mut errors = Vec::new();
        while let Ok(error) = self.receiver.try_recv() {
            errors.push(error);
        }
        errors
    }
}
