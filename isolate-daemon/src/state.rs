//! Daemon-wide shared state (spec.md §9 "The only process-wide state is the
//! daemon's connection/isolate registries"), shaped after the teacher's
//! `AppState` (`Arc<RwLock<HashMap<..>>>` registries plus typed accessors).

use std::collections::HashMap;
use std::sync::Arc;

use isolate_core::ConnectionRegistry;
use isolate_protocol::WsConnectionId;
use tokio::sync::RwLock;

use crate::worker::WorkerHandle;

/// Tracks which isolate owns a given WebSocket connection id, so both the
/// HTTP-surface dispatcher and the raw-IPC multiplexer can route inbound
/// messages/closes the same way regardless of which transport carried the
/// original upgrade (spec.md §4.6).
#[derive(Clone, Default)]
pub struct WsSessionRegistry {
    owners: Arc<RwLock<HashMap<WsConnectionId, String>>>,
}

impl WsSessionRegistry {
    pub async fn register(&self, connection_id: WsConnectionId, isolate_id: String) {
        self.owners.write().await.insert(connection_id, isolate_id);
    }

    pub async fn owner(&self, connection_id: WsConnectionId) -> Option<String> {
        self.owners.read().await.get(&connection_id).cloned()
    }

    pub async fn remove(&self, connection_id: WsConnectionId) -> Option<String> {
        self.owners.write().await.remove(&connection_id)
    }
}

#[derive(Clone)]
pub struct DaemonState {
    pub connections: ConnectionRegistry,
    pub worker: WorkerHandle,
    pub ws_sessions: WsSessionRegistry,
    pub max_isolates: usize,
    pub default_memory_limit_bytes: u64,
}

impl DaemonState {
    #[must_use]
    pub fn new(max_isolates: usize, default_memory_limit_bytes: u64) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            worker: crate::worker::spawn(max_isolates),
            ws_sessions: WsSessionRegistry::default(),
            max_isolates,
            default_memory_limit_bytes,
        }
    }
}
