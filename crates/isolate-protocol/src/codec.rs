//! Length-prefixed (u32 big-endian) frame codec (spec.md §4.1).
//!
//! One `encode()` call writes exactly one frame; the codec never merges two
//! logical chunks into a single wire frame and never splits one in two --
//! this is load-bearing for SSE-style chunk timing (spec.md §4.1, §4.4,
//! tested by the `Stream one-to-one` property in spec.md §8).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::Frame;

/// Defends against a peer claiming an absurd frame length and exhausting
/// memory before the real payload arrives.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Encoder<&Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: &Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(frame)?;
        let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
            len: u32::MAX,
            max: MAX_FRAME_LEN,
        })?;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        dst.reserve(4 + payload.len());
        dst.put_u32(len);
        dst.put_slice(&payload);
        Ok(())
    }
}

// Owned-value convenience so callers don't have to juggle a reference at
// every call site.
impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&Frame>::encode(self, &frame, dst)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        let total = 4 + len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(4);
        let payload = src.split_to(len as usize);
        let frame: Frame = serde_json::from_slice(&payload)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(Some(frame))
    }
}
