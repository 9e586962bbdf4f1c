//! Frame kinds from spec.md §4.1's table, plus the envelope that carries a
//! target (isolate id or connection scope) alongside each body.

use serde::{Deserialize, Serialize};

use crate::value::MarshalledValue;
use crate::{CallbackId, CallbackInvocationId, RequestId, StreamId, WsConnectionId};
use crate::error::WireError;

/// Where a `Request` frame is routed: a specific isolate, or a verb that
/// operates on the connection itself (`createRuntime`, `connection.close`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestTarget {
    Isolate(String),
    Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamDirection {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEndOutcome {
    Normal,
    Error,
}

/// One frame body. The length-prefixed envelope itself is handled by
/// `codec::FrameCodec`; this enum is what gets (de)serialized as the frame
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FrameBody {
    /// A call: either to a named verb on an isolate, or a connection-scoped
    /// verb (`createRuntime`, `connection.close`).
    Request {
        request_id: RequestId,
        target: RequestTarget,
        verb: String,
        arguments: Vec<MarshalledValue>,
    },
    /// The reply to a `Request` with the same `request_id`.
    Response {
        request_id: RequestId,
        result: Result<MarshalledValue, WireError>,
    },
    /// A host-initiated call into a guest function previously registered in
    /// the isolate's callback table.
    CallbackInvoke {
        callback_id: CallbackId,
        invocation_id: CallbackInvocationId,
        arguments: Vec<MarshalledValue>,
    },
    /// The guest's reply to a `CallbackInvoke` with the same
    /// `(callback_id, invocation_id)` pair.
    CallbackResult {
        callback_id: CallbackId,
        invocation_id: CallbackInvocationId,
        result: Result<MarshalledValue, WireError>,
    },
    /// Opens a stream session; the opener announces its initial credit
    /// window (spec §4.4).
    StreamOpen {
        stream_id: StreamId,
        direction: StreamDirection,
        initial_credit: u64,
        content_type_hint: Option<String>,
    },
    /// One chunk of a stream. Never straddles credit exhaustion and is never
    /// coalesced with another chunk by the codec.
    StreamChunk { stream_id: StreamId, bytes: Vec<u8> },
    /// The consumer grants the producer more bytes of credit.
    StreamCredit { stream_id: StreamId, granted_bytes: u64 },
    /// Terminates a stream session, normally or with an error.
    StreamEnd {
        stream_id: StreamId,
        outcome: StreamEndOutcome,
        error: Option<WireError>,
    },
    /// An inbound/outbound WebSocket message proxied for a given connection.
    WsMessage {
        connection_id: WsConnectionId,
        payload: WsPayload,
    },
    /// A WebSocket close, in either direction.
    WsClose {
        connection_id: WsConnectionId,
        code: u16,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WsPayload {
    Text(String),
    Binary(Vec<u8>),
}

/// A frame as it crosses the wire: a tagged body only. Kept as a thin
/// newtype so the codec has a single well-known top-level type to encode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame(pub FrameBody);

impl Frame {
    #[must_use]
    pub fn new(body: FrameBody) -> Self {
        Self(body)
    }

    #[must_use]
    pub fn body(&self) -> &FrameBody {
        &self.0
    }

    #[must_use]
    pub fn into_body(self) -> FrameBody {
        self.0
    }
}
