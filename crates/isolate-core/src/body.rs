//! Body payload: absent, in-memory bytes, or a reference to a stream session
//! (spec.md §3 "Body payload").

use isolate_protocol::StreamId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPayload {
    Absent,
    Bytes(Vec<u8>),
    Stream(StreamId),
}

impl BodyPayload {
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// A stream-backed body is consumable exactly once unless the consumer
    /// explicitly tees it first (spec.md §3).
    #[must_use]
    pub const fn is_single_shot(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}
