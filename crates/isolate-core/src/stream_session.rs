//! Stream session bookkeeping (spec.md §3 "Stream session"). This module
//! owns the state machine and credit ledger; `isolate-stream` owns the
//! actual byte-pumping engine built on top of it.

use isolate_protocol::{RequestId, StreamDirection, StreamId};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone)]
pub struct StreamSession {
    pub stream_id: StreamId,
    pub owning_request_id: RequestId,
    pub direction: StreamDirection,
    state: StreamState,
    bytes_transferred: u64,
    credit: u64,
}

impl StreamSession {
    #[must_use]
    pub fn new(
        stream_id: StreamId,
        owning_request_id: RequestId,
        direction: StreamDirection,
        initial_credit: u64,
    ) -> Self {
        Self {
            stream_id,
            owning_request_id,
            direction,
            state: StreamState::Active,
            bytes_transferred: 0,
            credit: initial_credit,
        }
    }

    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub const fn available_credit(&self) -> u64 {
        self.credit
    }

    #[must_use]
    pub const fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Spends credit for an outgoing chunk. Never lets credit go negative
    /// (spec.md §3 invariant, §8 property 7 "Credit safety").
    pub fn spend(&mut self, len: u64) -> Result<(), CoreError> {
        if self.state == StreamState::Closed {
            return Err(CoreError::StreamNotOpen(self.stream_id));
        }
        if len > self.credit {
            return Err(CoreError::CreditExceeded {
                attempted: len,
                available: self.credit,
            });
        }
        self.credit -= len;
        self.bytes_transferred += len;
        Ok(())
    }

    pub fn grant_credit(&mut self, granted: u64) {
        self.credit = self.credit.saturating_add(granted);
    }

    pub fn begin_closing(&mut self) {
        if self.state == StreamState::Active {
            self.state = StreamState::Closing;
        }
    }

    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, StreamState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StreamSession {
        StreamSession::new(1, 10, StreamDirection::Download, 100)
    }

    #[test]
    fn spend_decrements_credit_and_tracks_bytes() {
        let mut s = session();
        s.spend(40).unwrap();
        assert_eq!(s.available_credit(), 60);
        assert_eq!(s.bytes_transferred(), 40);
    }

    #[test]
    fn spend_beyond_credit_is_rejected() {
        let mut s = session();
        let err = s.spend(200).unwrap_err();
        assert!(matches!(err, CoreError::CreditExceeded { .. }));
        assert_eq!(s.available_credit(), 100);
    }

    #[test]
    fn grant_credit_accumulates() {
        let mut s = session();
        s.spend(100).unwrap();
        assert_eq!(s.available_credit(), 0);
        s.grant_credit(50);
        assert_eq!(s.available_credit(), 50);
    }

    #[test]
    fn closed_session_rejects_further_spend() {
        let mut s = session();
        s.close();
        assert!(s.spend(1).is_err());
    }
}
