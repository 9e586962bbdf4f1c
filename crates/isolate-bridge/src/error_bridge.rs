//! Bridge-level fallibility and the DOM-exception name mapping (spec.md
//! §4.2 "Errors preserve kind").

use isolate_protocol::{error_codes, ErrorKind, WireError};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("capability not granted: {0}")]
    CapabilityDenied(&'static str),
    #[error("{name}: {message}")]
    Validation { name: &'static str, message: String },
    #[error(transparent)]
    Core(#[from] isolate_core::CoreError),
    #[error(transparent)]
    Stream(#[from] isolate_stream::StreamError),
}

impl BridgeError {
    /// Converts to the wire representation crossing the membrane, preserving
    /// the web-platform error kind so the guest can reconstruct the right
    /// constructor (spec.md §4.2, §7).
    #[must_use]
    pub fn to_wire(&self) -> WireError {
        match self {
            Self::CapabilityDenied(capability) => WireError::new(
                ErrorKind::Capability,
                error_codes::TYPE_ERROR,
                format!("capability not granted: {capability}"),
            ),
            Self::Validation { name, message } => {
                WireError::new(ErrorKind::Validation, *name, message.clone())
            }
            Self::Core(err) => WireError::new(ErrorKind::Resource, "Error", err.to_string()).retryable(),
            Self::Stream(err) => WireError::new(ErrorKind::Stream, "Error", err.to_string()),
        }
    }
}

#[must_use]
pub fn type_error(message: impl Into<String>) -> BridgeError {
    BridgeError::Validation {
        name: error_codes::TYPE_ERROR,
        message: message.into(),
    }
}

#[must_use]
pub fn range_error(message: impl Into<String>) -> BridgeError {
    BridgeError::Validation {
        name: error_codes::RANGE_ERROR,
        message: message.into(),
    }
}

#[must_use]
pub fn quota_exceeded_error(message: impl Into<String>) -> BridgeError {
    BridgeError::Validation {
        name: error_codes::QUOTA_EXCEEDED_ERROR,
        message: message.into(),
    }
}

#[must_use]
pub fn invalid_character_error(message: impl Into<String>) -> BridgeError {
    BridgeError::Validation {
        name: error_codes::INVALID_CHARACTER_ERROR,
        message: message.into(),
    }
}
