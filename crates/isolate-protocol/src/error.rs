//! Wire-level error representation (spec.md §7) and the bracketed-prefix
//! convention the marshaller uses to preserve a guest error's `name` across
//! the membrane (spec.md §4.2 "Errors preserve kind").

use serde::{Deserialize, Serialize};

/// The error taxonomy from spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Protocol,
    Capability,
    Validation,
    Resource,
    Guest,
    Stream,
    Timeout,
}

/// Frozen string codes for the subset of errors that name a specific
/// web-platform/DOM kind, mirroring the teacher's `error_codes` module
/// shape (`crates/rt-protocol`'s frozen v1 codes).
pub mod error_codes {
    pub const TYPE_ERROR: &str = "TypeError";
    pub const RANGE_ERROR: &str = "RangeError";
    pub const NOT_SUPPORTED_ERROR: &str = "NotSupportedError";
    pub const INVALID_ACCESS_ERROR: &str = "InvalidAccessError";
    pub const OPERATION_ERROR: &str = "OperationError";
    pub const DATA_ERROR: &str = "DataError";
    pub const QUOTA_EXCEEDED_ERROR: &str = "QuotaExceededError";
    pub const INVALID_CHARACTER_ERROR: &str = "InvalidCharacterError";
    pub const ABORT_ERROR: &str = "AbortError";
}

/// An error crossing the membrane, carrying enough information for the
/// receiving side to reconstruct the matching constructor (spec.md §4.2,
/// §7 "Propagation policy").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    /// The guest-visible error name, e.g. `"TypeError"`, `"QuotaExceededError"`.
    pub name: String,
    pub message: String,
    /// True when the operation is safe to retry (spec.md §7 Resource/Timeout
    /// errors).
    pub retryable: bool,
}

impl WireError {
    #[must_use]
    pub fn new(kind: ErrorKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            message: message.into(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Encodes as `"[Name]message"`, the bracketed-prefix convention used
    /// when an error must travel through a plain-string channel (e.g. a
    /// sync-callback return value) instead of a typed `WireError`.
    #[must_use]
    pub fn encode_bracketed(&self) -> String {
        format!("[{}]{}", self.name, self.message)
    }

    /// Decodes a bracketed-prefix string back into name/message. Unknown or
    /// malformed input degrades to a generic `Error` per spec.md §4.2
    /// ("Unknown kinds degrade to generic error").
    #[must_use]
    pub fn decode_bracketed(kind: ErrorKind, text: &str) -> Self {
        if let Some(rest) = text.strip_prefix('[') {
            if let Some(close) = rest.find(']') {
                let name = &rest[..close];
                let message = &rest[close + 1..];
                return Self::new(kind, name, message);
            }
        }
        Self::new(kind, "Error", text)
    }
}

/// Codec/transport-level failures -- distinct from `WireError`, which
/// represents a guest/host error carried *inside* a successful frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame exceeds maximum length ({len} > {max})")]
    FrameTooLarge { len: u32, max: u32 },
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_round_trip() {
        let err = WireError::new(ErrorKind::Validation, error_codes::TYPE_ERROR, "bad input");
        let encoded = err.encode_bracketed();
        assert_eq!(encoded, "[TypeError]bad input");
        let decoded = WireError::decode_bracketed(ErrorKind::Validation, &encoded);
        assert_eq!(decoded.name, "TypeError");
        assert_eq!(decoded.message, "bad input");
    }

    #[test]
    fn unknown_shape_degrades_to_generic_error() {
        let decoded = WireError::decode_bracketed(ErrorKind::Guest, "no brackets here");
        assert_eq!(decoded.name, "Error");
        assert_eq!(decoded.message, "no brackets here");
    }
}
