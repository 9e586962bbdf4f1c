//! Engine-level failures (spec.md §4.5). Distinct from `isolate_core::CoreError`
//! and `isolate_bridge::BridgeError`, which operate below the V8 boundary.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to create isolate under {limit_bytes}-byte memory limit: {message}")]
    CreationFailed { limit_bytes: u64, message: String },
    #[error("module load failed for specifier '{specifier}': {message}")]
    ModuleLoadFailed { specifier: String, message: String },
    #[error("module specifier '{0}' could not be resolved against '{1}'")]
    ResolutionFailed(String, String),
    #[error("script evaluation failed: {0}")]
    EvaluationFailed(String),
    #[error("isolate '{0}' has already been disposed")]
    AlreadyDisposed(String),
    #[error("no isolate available for eviction")]
    NoEvictionCandidate,
}
