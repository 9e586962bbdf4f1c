//! `pipeThrough`/`TransformStream` plumbing (spec.md §4.4 "Transform /
//! pipeThrough"): ties a source to a transform function chunk-by-chunk.
//! Each discrete enqueue from the transformer becomes exactly one transport
//! chunk -- the bridge MUST NOT coalesce, so this loop never batches.

use bytes::Bytes;
use isolate_protocol::WireError;
use std::future::Future;

use crate::error::StreamError;
use crate::session::{StreamConsumer, StreamItem, StreamProducer};

/// Drives `input` through `transform`, writing whatever it enqueues to
/// `output`, one call of `transform` per inbound chunk. `transform`
/// returning `Ok(None)` enqueues nothing for that inbound chunk (a filter);
/// returning `Err` aborts the pipe with that error surfacing on `output`.
pub async fn pipe_through<F, Fut>(
    mut input: StreamConsumer,
    output: StreamProducer,
    mut transform: F,
) -> Result<(), StreamError>
where
    F: FnMut(Bytes) -> Fut,
    Fut: Future<Output = Result<Option<Bytes>, WireError>>,
{
    loop {
        match input.recv().await {
            Some(StreamItem::Chunk(bytes)) => match transform(bytes).await {
                Ok(Some(out)) => output.send_chunk(out).await?,
                Ok(None) => {}
                Err(err) => {
                    output.end(Err(err));
                    return Ok(());
                }
            },
            Some(StreamItem::End(result)) => {
                output.end(result);
                return Ok(());
            }
            None => {
                // Source dropped without an explicit end; treat as abrupt
                // closure so the downstream reader observes an error-end
                // rather than hanging forever.
                return Err(StreamError::SourceError);
            }
        }
    }
}

/// The identity transform used by the `TransformStream` default
/// constructor and by the S4 tee+transform testable scenario.
pub async fn identity(chunk: Bytes) -> Result<Option<Bytes>, WireError> {
    Ok(Some(chunk))
}
