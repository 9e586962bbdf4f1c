//! Forwards a host-initiated callback invocation (module loader, fetch
//! collaborator, filesystem directory provider, test-event callback --
//! spec.md §6 "Runtime options ... supply callbacks") from the isolate
//! worker thread out to the owning connection's writer task as a
//! `CallbackInvoke` frame, and awaits the matching `CallbackResult`
//! (spec.md §4.7 "Assign and route ... callback-invocation ids").

use std::sync::Arc;

use isolate_core::Connection;
use isolate_protocol::{CallbackId, FrameBody, MarshalledValue, WireError};
use tokio::sync::{mpsc, oneshot};

#[derive(Clone)]
pub struct CallbackBridge {
    connection: Arc<Connection>,
    outbound: mpsc::UnboundedSender<FrameBody>,
}

impl CallbackBridge {
    #[must_use]
    pub fn new(connection: Arc<Connection>, outbound: mpsc::UnboundedSender<FrameBody>) -> Self {
        Self { connection, outbound }
    }

    /// Invokes a previously registered guest callback with `arguments` and
    /// awaits its result. The per-verb timeout is applied by the caller
    /// (`crate::worker`), not here, so the same bridge also serves verbs
    /// with no timeout of their own.
    pub async fn invoke(
        &self,
        callback_id: CallbackId,
        arguments: Vec<MarshalledValue>,
    ) -> Result<MarshalledValue, WireError> {
        let invocation_id = self.connection.next_callback_invocation_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.connection
            .register_pending_callback_invocation(invocation_id, reply_tx)
            .await;

        if self
            .outbound
            .send(FrameBody::CallbackInvoke {
                callback_id,
                invocation_id,
                arguments,
            })
            .is_err()
        {
            self.connection.take_pending_callback_invocation(invocation_id).await;
            return Err(WireError::new(
                isolate_protocol::ErrorKind::Resource,
                "Error",
                "connection writer is gone",
            ));
        }

        reply_rx.await.unwrap_or_else(|_| {
            Err(WireError::new(
                isolate_protocol::ErrorKind::Resource,
                "Error",
                "connection closed before the callback replied",
            ))
        })
    }
}
