//! Top-level error taxonomy (spec.md §7). Every failure the daemon produces
//! funnels through here on its way to either a `WireError` (crossing the
//! connection) or a log line (crossing nothing -- connection already gone).

use isolate_protocol::{error_codes, ErrorKind, WireError};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("malformed frame: {0}")]
    Protocol(String),
    #[error("unknown connection id: {0}")]
    UnknownConnection(String),
    #[error("unknown verb '{0}' for target {1}")]
    UnknownVerb(String, String),
    #[error(transparent)]
    Core(#[from] isolate_core::CoreError),
    #[error(transparent)]
    Bridge(#[from] isolate_bridge::BridgeError),
    #[error(transparent)]
    Engine(#[from] isolate_engine::EngineError),
    #[error("the operation timed out")]
    Timeout,
    #[error("the worker thread is no longer accepting commands")]
    WorkerGone,
}

impl DaemonError {
    /// Converts to the wire representation a `Response` frame carries,
    /// preserving the taxonomy from spec.md §7.
    #[must_use]
    pub fn to_wire(&self) -> WireError {
        match self {
            Self::Protocol(message) => WireError::new(ErrorKind::Protocol, "Error", message.clone()),
            Self::UnknownConnection(id) => {
                WireError::new(ErrorKind::Protocol, "Error", format!("unknown connection: {id}"))
            }
            Self::UnknownVerb(verb, target) => WireError::new(
                ErrorKind::Validation,
                error_codes::TYPE_ERROR,
                format!("unknown verb '{verb}' for target {target}"),
            ),
            Self::Core(err) => WireError::new(ErrorKind::Resource, "Error", err.to_string()).retryable(),
            Self::Bridge(err) => err.to_wire(),
            Self::Engine(err) => WireError::new(ErrorKind::Guest, "Error", err.to_string()),
            Self::Timeout => WireError::new(ErrorKind::Timeout, "TimeoutError", self.to_string()),
            Self::WorkerGone => WireError::new(ErrorKind::Resource, "Error", self.to_string()).retryable(),
        }
    }
}
