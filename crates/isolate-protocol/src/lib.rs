//! isolate-protocol: the wire format carried over a single duplex byte
//! stream between a client process and the sandboxing daemon (spec §4.1).
//!
//! A connection carries a sequence of length-prefixed frames. Frames
//! belonging to different request ids or stream ids may interleave; frames
//! on a single stream id are always observed in order. The codec never
//! coalesces chunks -- each guest-emitted chunk crosses as exactly one
//! `FrameBody::StreamChunk`.

pub mod codec;
pub mod error;
pub mod frame;
pub mod value;

pub use codec::FrameCodec;
pub use error::{error_codes, ErrorKind, ProtocolError, WireError};
pub use frame::{Frame, FrameBody, StreamDirection, StreamEndOutcome};
pub use value::MarshalledValue;

/// Opaque request identifier, assigned by whichever side initiates the call.
pub type RequestId = u64;
/// Opaque numeric id of a registered guest callback.
pub type CallbackId = u64;
/// Opaque id of a single invocation of a callback (distinct invocations of
/// the same callback id may be outstanding concurrently).
pub type CallbackInvocationId = u64;
/// Opaque id of a stream session (upload or download).
pub type StreamId = u64;
/// Opaque id of a proxied WebSocket connection.
pub type WsConnectionId = u64;
