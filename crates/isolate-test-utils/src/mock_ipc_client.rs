//! A bare framed-protocol client for integration tests: connects over any
//! `AsyncRead + AsyncWrite` transport (a real socket, or one half of
//! `tokio::io::duplex`) and exposes request/response and raw frame
//! send/recv, the way the teacher's `MockWsClient` exposed `send_message`/
//! `recv_message` over a WebSocket rather than the daemon's own raw frame
//! codec.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use isolate_protocol::{FrameBody, FrameCodec, MarshalledValue, RequestId, RequestTarget, WireError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

pub struct MockIpcClient<S> {
    framed: Framed<S, FrameCodec>,
    next_request_id: AtomicU64,
}

impl<S> MockIpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    #[must_use]
    pub fn new(transport: S) -> Self {
        Self {
            framed: Framed::new(transport, FrameCodec),
            next_request_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send_frame(&mut self, body: FrameBody) -> Result<(), std::io::Error> {
        self.framed.send(isolate_protocol::Frame::new(body)).await
    }

    pub async fn recv_frame(&mut self) -> Option<Result<FrameBody, std::io::Error>> {
        self.framed.next().await.map(|result| result.map(isolate_protocol::Frame::into_body))
    }

    /// Sends a `Request` frame and awaits its matching `Response`, skipping
    /// over any out-of-band frames (callbacks, stream traffic) the server
    /// emits while the call is in flight.
    pub async fn call(
        &mut self,
        target: RequestTarget,
        verb: &str,
        arguments: Vec<MarshalledValue>,
    ) -> Result<MarshalledValue, WireError> {
        let request_id = self.next_id();
        self.send_frame(FrameBody::Request {
            request_id,
            target,
            verb: verb.to_owned(),
            arguments,
        })
        .await
        .expect("failed to send request frame");

        loop {
            match self.recv_frame().await {
                Some(Ok(FrameBody::Response { request_id: received_id, result })) if received_id == request_id => {
                    return result;
                }
                Some(Ok(_other)) => continue,
                Some(Err(err)) => panic!("transport error waiting for response: {err}"),
                None => panic!("connection closed before a response arrived"),
            }
        }
    }
}
