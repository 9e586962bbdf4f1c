//! Internal fallibility for the data-model crate.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("isolate {0} not found")]
    IsolateNotFound(String),
    #[error("isolate {0} is already disposed")]
    IsolateDisposed(String),
    #[error("memory limit exceeded: requested {requested}, limit {limit}")]
    MemoryLimitExceeded { requested: u64, limit: u64 },
    #[error("callback {0} is not registered")]
    UnknownCallback(u64),
    #[error("stream {0} is not open")]
    StreamNotOpen(u64),
    #[error("credit exceeded: attempted to send {attempted}, available {available}")]
    CreditExceeded { attempted: u64, available: u64 },
}
