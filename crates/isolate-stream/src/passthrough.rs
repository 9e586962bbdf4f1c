//! External-fetch passthrough (spec.md §4.4): wires an external byte stream
//! directly into a response `StreamProducer` without buffering, so `tee`,
//! `TransformStream`, and `pipeThrough` downstream of it preserve
//! chunk-level timing end to end. Generic over any `futures_util::Stream`
//! of byte chunks so it has no dependency on a specific HTTP client --
//! `isolate-bridge`'s fetch driver supplies the concrete stream.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use isolate_protocol::{error_codes, ErrorKind, WireError};

use crate::error::StreamError;
use crate::session::StreamProducer;

/// Drains `external` into `output`, one upstream item per transport chunk.
/// `E` is whatever error type the external source's stream produces (e.g. a
/// client library's transport error); it is reported to the guest as an
/// `OperationError` since the fetch happened entirely on the host side.
pub async fn passthrough<S, E>(mut external: S, output: StreamProducer) -> Result<(), StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(item) = external.next().await {
        match item {
            Ok(chunk) => output.send_chunk(chunk).await?,
            Err(err) => {
                output.end(Err(WireError::new(
                    ErrorKind::Resource,
                    error_codes::OPERATION_ERROR,
                    err.to_string(),
                )));
                return Ok(());
            }
        }
    }
    output.end(Ok(()));
    Ok(())
}
