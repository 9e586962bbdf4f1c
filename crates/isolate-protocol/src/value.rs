//! The host-native value representation produced by marshalling a guest
//! value (spec.md §4.2). Used both as the in-process representation crossing
//! the V8 membrane and as the wire representation of arguments/results
//! crossing the IPC connection -- the shape discriminator is identical
//! either way, so one type serves both duties.
//!
//! Discriminator order (spec.md §4.2), matched by variant order below:
//! 1. primitive, 2. binary view, 3. recognised class tag, 4. promise-like
//! (resolved before it ever reaches this type -- see isolate-bridge),
//! 5. ordered sequence, 6. plain record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The class tag carried alongside a class-backed object's instance id
/// (spec.md §3 "Class-backed object").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassTag {
    Headers,
    Request,
    Response,
    Blob,
    File,
    FormData,
    Url,
    ReadableStream,
    WritableStream,
    TransformStream,
    WebSocket,
    CryptoKey,
    AbortController,
    AbortSignal,
}

impl ClassTag {
    #[must_use]
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::Headers => "Headers",
            Self::Request => "Request",
            Self::Response => "Response",
            Self::Blob => "Blob",
            Self::File => "File",
            Self::FormData => "FormData",
            Self::Url => "URL",
            Self::ReadableStream => "ReadableStream",
            Self::WritableStream => "WritableStream",
            Self::TransformStream => "TransformStream",
            Self::WebSocket => "WebSocket",
            Self::CryptoKey => "CryptoKey",
            Self::AbortController => "AbortController",
            Self::AbortSignal => "AbortSignal",
        }
    }
}

/// The three internal bridge marker fields that must never surface as
/// user-visible header keys, form fields, or object properties (spec.md
/// §4.2 "Forbidden leaks", tested by §8 property 2).
pub const MARKER_INSTANCE_ID: &str = "__instanceId__";
pub const MARKER_CLASS_NAME: &str = "__className__";
pub const MARKER_IS_DEFINE_CLASS_INSTANCE: &str = "__isDefineClassInstance__";

#[must_use]
pub fn is_internal_marker(key: &str) -> bool {
    matches!(
        key,
        MARKER_INSTANCE_ID | MARKER_CLASS_NAME | MARKER_IS_DEFINE_CLASS_INSTANCE
    )
}

/// A host-native value produced (or consumed) by the marshaller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarshalledValue {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    /// Arbitrary-precision integer, carried as a decimal string since f64
    /// cannot round-trip a guest `BigInt` exactly.
    BigInt(String),
    String(String),
    /// A byte buffer or typed integer array view, preserving offset/length
    /// over a shared backing store the way a guest `TypedArray` does.
    Bytes {
        bytes: Vec<u8>,
        offset: usize,
        length: usize,
    },
    /// A recognised class-backed object: stable numeric instance id plus
    /// class tag. State never travels in this variant -- it is read from
    /// the host-side record keyed by `instance_id` when the value
    /// rematerializes in a guest (spec.md §3, §9).
    ClassRef { instance_id: u64, class_name: ClassTag },
    /// A repeat encounter of an object already seen earlier in the same
    /// marshal pass (spec.md §9 "Cyclic guest graphs").
    BackRef(u64),
    Sequence(Vec<MarshalledValue>),
    /// A plain record. Construction strips the three internal marker keys
    /// before this variant is built -- see `is_internal_marker`.
    Record(BTreeMap<String, MarshalledValue>),
}

impl MarshalledValue {
    #[must_use]
    pub fn bytes(bytes: Vec<u8>) -> Self {
        let length = bytes.len();
        Self::Bytes {
            bytes,
            offset: 0,
            length,
        }
    }

    #[must_use]
    pub fn record(fields: BTreeMap<String, MarshalledValue>) -> Self {
        let stripped = fields
            .into_iter()
            .filter(|(k, _)| !is_internal_marker(k))
            .collect();
        Self::Record(stripped)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}
