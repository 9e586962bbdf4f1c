//! `ReadableStream`/`WritableStream`/`TransformStream` (spec.md §4.3, §4.4).
//! Guest-facing wrappers over isolate-stream's credit-controlled channel,
//! tee, and pipe-through primitives; the class registry here only tracks
//! which stream id backs which guest-visible instance.

use isolate_core::ClassRegistry;
use isolate_protocol::value::ClassTag;
use isolate_protocol::StreamId;
use isolate_stream::{tee, StreamConsumer, StreamItem, StreamProducer, TeeBranch, TeeConfig};

use crate::error_bridge::{type_error, BridgeError};

#[derive(Debug)]
pub struct ReadableStreamState {
    pub stream_id: StreamId,
    pub consumer: Option<StreamConsumer>,
    pub locked: bool,
}

#[derive(Debug)]
pub struct WritableStreamState {
    pub stream_id: StreamId,
    pub producer: Option<StreamProducer>,
    pub locked: bool,
}

#[derive(Debug, Default)]
pub struct StreamsApi {
    readable: ClassRegistry<ReadableStreamState>,
    writable: ClassRegistry<WritableStreamState>,
}

impl StreamsApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrap_readable(&mut self, stream_id: StreamId, consumer: StreamConsumer) -> u64 {
        self.readable.insert(
            ClassTag::ReadableStream,
            ReadableStreamState {
                stream_id,
                consumer: Some(consumer),
                locked: false,
            },
        )
    }

    pub fn wrap_writable(&mut self, stream_id: StreamId, producer: StreamProducer) -> u64 {
        self.writable.insert(
            ClassTag::WritableStream,
            WritableStreamState {
                stream_id,
                producer: Some(producer),
                locked: false,
            },
        )
    }

    /// `getReader()`: takes exclusive ownership of the consumer half,
    /// locking the stream (spec.md §3 "every marshalled guest value of a
    /// recognised class carries ... state owned by the host").
    pub fn take_reader(&mut self, instance_id: u64) -> Result<StreamConsumer, BridgeError> {
        let entry = self
            .readable
            .get_mut(instance_id)
            .ok_or_else(|| type_error("unknown ReadableStream"))?;
        if entry.state.locked {
            return Err(type_error("ReadableStream is already locked"));
        }
        let consumer = entry
            .state
            .consumer
            .take()
            .ok_or_else(|| type_error("ReadableStream body already consumed"))?;
        entry.state.locked = true;
        Ok(consumer)
    }

    pub fn take_writer(&mut self, instance_id: u64) -> Result<StreamProducer, BridgeError> {
        let entry = self
            .writable
            .get_mut(instance_id)
            .ok_or_else(|| type_error("unknown WritableStream"))?;
        if entry.state.locked {
            return Err(type_error("WritableStream is already locked"));
        }
        let producer = entry
            .state
            .producer
            .take()
            .ok_or_else(|| type_error("WritableStream already consumed"))?;
        entry.state.locked = true;
        Ok(producer)
    }

    pub fn is_locked(&self, instance_id: u64) -> Result<bool, BridgeError> {
        Ok(self
            .readable
            .get(instance_id)
            .ok_or_else(|| type_error("unknown ReadableStream"))?
            .state
            .locked)
    }

    /// `tee()`: splits one `ReadableStream` into two, each independently
    /// readable with bounded spillover (spec.md §4.4).
    pub fn tee(&mut self, instance_id: u64) -> Result<(u64, u64), BridgeError> {
        let consumer = self.take_reader(instance_id)?;
        let stream_id = consumer.stream_id();
        let (left, right) = tee(stream_id, consumer, TeeConfig::default());
        Ok((
            self.wrap_tee_branch(stream_id, left),
            self.wrap_tee_branch(stream_id, right),
        ))
    }

    fn wrap_tee_branch(&mut self, stream_id: StreamId, branch: TeeBranch) -> u64 {
        // Internal host-to-host relay: the tee branch's own spill budget
        // already bounds memory, so this channel is granted an effectively
        // unlimited credit window rather than imposing a second backpressure
        // layer on top of it.
        let (producer, consumer) = isolate_stream::channel(stream_id, u64::from(u32::MAX));
        tokio::spawn(pump_tee_branch(branch, producer));
        self.wrap_readable(stream_id, consumer)
    }
}

/// Bridges a `TeeBranch`'s items back onto the ordinary `StreamConsumer`
/// shape guest-facing `ReadableStream`s are built on, so the rest of the
/// bridge only ever has to reason about one kind of readable.
async fn pump_tee_branch(mut branch: TeeBranch, producer: StreamProducer) {
    loop {
        match branch.recv().await {
            Some(isolate_stream::TeeItem::Chunk(bytes)) => {
                if producer.send_chunk(bytes).await.is_err() {
                    return;
                }
            }
            Some(isolate_stream::TeeItem::End(result)) => {
                producer.end(result);
                return;
            }
            Some(isolate_stream::TeeItem::Cancelled(err)) => {
                producer.end(Err(isolate_protocol::WireError::new(
                    isolate_protocol::ErrorKind::Stream,
                    "Error",
                    err.to_string(),
                )));
                return;
            }
            None => return,
        }
    }
}

/// `ReadableStream.from(asyncIterable)` implemented natively rather than
/// left unsupported (spec.md §9 Open Question: the reference implementation
/// 500s here; this bridge implements it).
pub async fn from_host_iter<I>(producer: StreamProducer, items: I)
where
    I: IntoIterator<Item = bytes::Bytes>,
{
    for item in items {
        if producer.send_chunk(item).await.is_err() {
            return;
        }
    }
    producer.end(Ok(()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn get_reader_locks_the_stream_and_rejects_a_second_call() {
        let mut api = StreamsApi::new();
        let (_producer, consumer) = isolate_stream::channel(1, 1024);
        let id = api.wrap_readable(1, consumer);

        assert!(!api.is_locked(id).unwrap());
        api.take_reader(id).unwrap();
        assert!(api.is_locked(id).unwrap());
        assert!(api.take_reader(id).is_err());
    }

    #[tokio::test]
    async fn from_host_iter_emits_each_item_as_one_chunk() {
        let (producer, mut consumer) = isolate_stream::channel(1, 1024);
        tokio::spawn(from_host_iter(
            producer,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
        ));

        let mut seen = Vec::new();
        loop {
            match consumer.recv().await.unwrap() {
                StreamItem::Chunk(bytes) => seen.push(bytes),
                StreamItem::End(result) => {
                    result.unwrap();
                    break;
                }
            }
        }
        assert_eq!(seen, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }

    #[tokio::test]
    async fn tee_delivers_every_chunk_to_both_branches() {
        let mut api = StreamsApi::new();
        let (producer, consumer) = isolate_stream::channel(1, 1024);
        let id = api.wrap_readable(1, consumer);

        tokio::spawn(async move {
            producer.send_chunk(Bytes::from_static(b"x")).await.unwrap();
            producer.end(Ok(()));
        });

        let (left_id, right_id) = api.tee(id).unwrap();
        let mut left = api.take_reader(left_id).unwrap();
        let mut right = api.take_reader(right_id).unwrap();

        assert!(matches!(left.recv().await, Some(StreamItem::Chunk(_))));
        assert!(matches!(right.recv().await, Some(StreamItem::Chunk(_))));
    }
}
