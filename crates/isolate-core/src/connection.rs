//! Per-client connection state (spec.md §3 "Connection state"), the
//! registry-of-registries the multiplexer drives. Shaped directly after the
//! teacher's `AppState` (`Arc<RwLock<HashMap<..>>>` fields plus typed
//! `register_*`/`unregister_*` methods).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use isolate_protocol::{CallbackInvocationId, RequestId, StreamId};
use tokio::sync::{oneshot, RwLock};

use crate::error::CoreError;
use crate::isolate::Isolate;
use crate::stream_session::StreamSession;

pub type PendingReply = oneshot::Sender<Result<isolate_protocol::MarshalledValue, isolate_protocol::WireError>>;
pub type PendingCallbackReply = oneshot::Sender<Result<isolate_protocol::MarshalledValue, isolate_protocol::WireError>>;

/// Per-client transport state. One instance per accepted socket.
pub struct Connection {
    pub connection_id: String,
    isolates: RwLock<HashMap<String, Isolate>>,
    owned_isolate_ids: RwLock<HashSet<String>>,
    next_request_id: std::sync::atomic::AtomicU64,
    next_callback_invocation_id: std::sync::atomic::AtomicU64,
    next_stream_id: std::sync::atomic::AtomicU64,
    pending_requests: RwLock<HashMap<RequestId, PendingReply>>,
    pending_callback_invocations: RwLock<HashMap<CallbackInvocationId, PendingCallbackReply>>,
    active_stream_sessions: RwLock<HashMap<StreamId, StreamSession>>,
}

impl Connection {
    #[must_use]
    pub fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            isolates: RwLock::new(HashMap::new()),
            owned_isolate_ids: RwLock::new(HashSet::new()),
            next_request_id: std::sync::atomic::AtomicU64::new(1),
            next_callback_invocation_id: std::sync::atomic::AtomicU64::new(1),
            next_stream_id: std::sync::atomic::AtomicU64::new(1),
            pending_requests: RwLock::new(HashMap::new()),
            pending_callback_invocations: RwLock::new(HashMap::new()),
            active_stream_sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn next_request_id(&self) -> RequestId {
        self.next_request_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    #[must_use]
    pub fn next_callback_invocation_id(&self) -> CallbackInvocationId {
        self.next_callback_invocation_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    #[must_use]
    pub fn next_stream_id(&self) -> StreamId {
        self.next_stream_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Registers a freshly created isolate as owned by this connection
    /// (spec.md §3: "an isolate is owned by at most one connection").
    pub async fn adopt_isolate(&self, isolate: Isolate) {
        let id = isolate.id.clone();
        self.isolates.write().await.insert(id.clone(), isolate);
        self.owned_isolate_ids.write().await.insert(id);
    }

    pub async fn isolate_ids(&self) -> Vec<String> {
        self.owned_isolate_ids.read().await.iter().cloned().collect()
    }

    /// Removes a single owned isolate (`runtime.close()`), distinct from
    /// `teardown_all_isolates`, which tears down every isolate at once on
    /// disconnect.
    pub async fn remove_isolate(&self, id: &str) -> Option<Isolate> {
        self.owned_isolate_ids.write().await.remove(id);
        self.isolates.write().await.remove(id)
    }

    pub async fn with_isolate_mut<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Isolate) -> R,
    ) -> Result<R, CoreError> {
        let mut isolates = self.isolates.write().await;
        let isolate = isolates
            .get_mut(id)
            .ok_or_else(|| CoreError::IsolateNotFound(id.to_owned()))?;
        Ok(f(isolate))
    }

    /// Tears down every isolate this connection owns (spec.md §3: "closing a
    /// connection tears down all its isolates"). Returns the cancelled
    /// stream ids across all torn-down isolates for the caller to reject
    /// downstream.
    pub async fn teardown_all_isolates(&self) -> Vec<StreamId> {
        let mut isolates = self.isolates.write().await;
        let mut cancelled = Vec::new();
        for isolate in isolates.values_mut() {
            cancelled.extend(isolate.begin_disposal());
        }
        isolates.clear();
        self.owned_isolate_ids.write().await.clear();
        cancelled
    }

    pub async fn register_pending_request(&self, request_id: RequestId, reply: PendingReply) {
        self.pending_requests.write().await.insert(request_id, reply);
    }

    pub async fn take_pending_request(&self, request_id: RequestId) -> Option<PendingReply> {
        self.pending_requests.write().await.remove(&request_id)
    }

    /// Rejects and drains every outstanding request awaiter (connection-lost
    /// path, spec.md §4.7).
    pub async fn reject_all_pending_requests(&self, error: isolate_protocol::WireError) {
        let mut pending = self.pending_requests.write().await;
        for (_, reply) in pending.drain() {
            let _ = reply.send(Err(error.clone()));
        }
    }

    pub async fn register_pending_callback_invocation(
        &self,
        invocation_id: CallbackInvocationId,
        reply: PendingCallbackReply,
    ) {
        self.pending_callback_invocations
            .write()
            .await
            .insert(invocation_id, reply);
    }

    pub async fn take_pending_callback_invocation(
        &self,
        invocation_id: CallbackInvocationId,
    ) -> Option<PendingCallbackReply> {
        self.pending_callback_invocations.write().await.remove(&invocation_id)
    }

    /// Rejects and drains every outstanding callback invocation (connection-lost
    /// path, spec.md §4.7 -- the guest-to-host direction's counterpart to
    /// `reject_all_pending_requests`).
    pub async fn reject_all_pending_callback_invocations(&self, error: isolate_protocol::WireError) {
        let mut pending = self.pending_callback_invocations.write().await;
        for (_, reply) in pending.drain() {
            let _ = reply.send(Err(error.clone()));
        }
    }

    pub async fn register_stream_session(&self, session: StreamSession) {
        self.active_stream_sessions
            .write()
            .await
            .insert(session.stream_id, session);
    }

    pub async fn with_stream_session_mut<R>(
        &self,
        stream_id: StreamId,
        f: impl FnOnce(&mut StreamSession) -> R,
    ) -> Result<R, CoreError> {
        let mut sessions = self.active_stream_sessions.write().await;
        let session = sessions
            .get_mut(&stream_id)
            .ok_or(CoreError::StreamNotOpen(stream_id))?;
        Ok(f(session))
    }

    pub async fn remove_stream_session(&self, stream_id: StreamId) -> Option<StreamSession> {
        self.active_stream_sessions.write().await.remove(&stream_id)
    }

    pub async fn active_stream_ids(&self) -> Vec<StreamId> {
        self.active_stream_sessions.read().await.keys().copied().collect()
    }
}

/// Process-wide registry of live connections (spec.md §9: "The only
/// process-wide state is the daemon's connection/isolate registries").
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, connection: Arc<Connection>) {
        self.connections
            .write()
            .await
            .insert(connection.connection_id.clone(), connection);
    }

    pub async fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    pub async fn remove(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.write().await.remove(connection_id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolate::CapabilitySet;

    #[tokio::test]
    async fn request_ids_are_monotonically_increasing() {
        let conn = Connection::new("c1".to_owned());
        let a = conn.next_request_id();
        let b = conn.next_request_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn teardown_disposes_every_owned_isolate() {
        let conn = Connection::new("c1".to_owned());
        conn.adopt_isolate(Isolate::new("iso-a".to_owned(), 1024, CapabilitySet::empty()))
            .await;
        conn.adopt_isolate(Isolate::new("iso-b".to_owned(), 1024, CapabilitySet::empty()))
            .await;
        assert_eq!(conn.isolate_ids().await.len(), 2);

        conn.teardown_all_isolates().await;
        assert!(conn.isolate_ids().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_isolate_lookup_is_an_error_not_a_panic() {
        let conn = Connection::new("c1".to_owned());
        let result = conn.with_isolate_mut("missing", |iso| iso.touch()).await;
        assert!(matches!(result, Err(CoreError::IsolateNotFound(_))));
    }

    #[tokio::test]
    async fn pending_callback_invocation_round_trips() {
        let conn = Connection::new("c1".to_owned());
        let invocation_id = conn.next_callback_invocation_id();
        let (tx, rx) = oneshot::channel();
        conn.register_pending_callback_invocation(invocation_id, tx).await;

        let taken = conn.take_pending_callback_invocation(invocation_id).await.unwrap();
        taken.send(Ok(isolate_protocol::MarshalledValue::Null)).unwrap();
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn registry_tracks_register_and_remove() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(Connection::new("c1".to_owned()));
        registry.register(conn.clone()).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("c1").await.is_some());
        registry.remove("c1").await;
        assert_eq!(registry.len().await, 0);
    }
}
