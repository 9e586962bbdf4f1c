//! The single-producer/single-consumer half of the stream engine (spec.md
//! §4.4): one item crosses per guest-emitted chunk, never coalesced, with
//! the producer suspending on `CreditWindow::spend` whenever it runs ahead
//! of the consumer's granted credit.

use bytes::Bytes;
use isolate_protocol::{StreamId, WireError};
use tokio::sync::mpsc;

use crate::credit::CreditWindow;
use crate::error::StreamError;

#[derive(Debug, Clone)]
pub enum StreamItem {
    Chunk(Bytes),
    /// Terminal item. `Ok(())` is a normal end; `Err` carries the guest- or
    /// host-side error that aborted the session (spec.md §3 "Stream-end").
    End(Result<(), WireError>),
}

pub struct StreamProducer {
    stream_id: StreamId,
    tx: mpsc::UnboundedSender<StreamItem>,
    credit: CreditWindow,
}

impl StreamProducer {
    /// Spends credit for `chunk`'s length (suspending until enough credit
    /// is granted) and then emits it as exactly one transport chunk.
    pub async fn send_chunk(&self, chunk: Bytes) -> Result<(), StreamError> {
        self.credit.spend(chunk.len() as u64, self.stream_id).await?;
        self.tx
            .send(StreamItem::Chunk(chunk))
            .map_err(|_| StreamError::Closed(self.stream_id))
    }

    pub fn end(self, result: Result<(), WireError>) {
        let _ = self.tx.send(StreamItem::End(result));
    }

    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

pub struct StreamConsumer {
    stream_id: StreamId,
    rx: mpsc::UnboundedReceiver<StreamItem>,
    credit: CreditWindow,
}

impl StreamConsumer {
    pub async fn recv(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Grants more credit to the paired producer (`Stream-credit` frame).
    pub fn grant_credit(&self, bytes: u64) {
        self.credit.grant(bytes);
    }

    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

#[must_use]
pub fn channel(stream_id: StreamId, initial_credit: u64) -> (StreamProducer, StreamConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let credit = CreditWindow::new(initial_credit);
    (
        StreamProducer {
            stream_id,
            tx,
            credit: credit.clone(),
        },
        StreamConsumer { stream_id, rx, credit },
    )
}
