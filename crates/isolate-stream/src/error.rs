#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream {0} is closed")]
    Closed(u64),
    #[error("credit exceeded: attempted {attempted}, available {available}")]
    CreditExceeded { attempted: u64, available: u64 },
    #[error("tee sibling exceeded spill budget of {budget} bytes")]
    SpillBudgetExceeded { budget: u64 },
    #[error("source terminated with an error")]
    SourceError,
}
