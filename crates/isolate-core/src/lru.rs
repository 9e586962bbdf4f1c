//! LRU tracking for isolate eviction under the configured maximum (spec.md
//! §4.5 "Eviction: when the configured maximum-isolates is exceeded, the
//! LRU isolate whose owner connection is idle is disposed").

use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    connection_id: String,
    last_activity: Instant,
}

/// Tracks `(isolate_id -> (connection_id, last_activity))` across the whole
/// daemon, independent of which `Connection` owns the isolate, so eviction
/// can pick the globally least-recently-used isolate.
#[derive(Debug, Default)]
pub struct IsolateLru {
    entries: HashMap<String, Entry>,
}

impl IsolateLru {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_creation(&mut self, isolate_id: String, connection_id: String) {
        self.entries.insert(
            isolate_id,
            Entry {
                connection_id,
                last_activity: Instant::now(),
            },
        );
    }

    pub fn record_activity(&mut self, isolate_id: &str) {
        if let Some(entry) = self.entries.get_mut(isolate_id) {
            entry.last_activity = Instant::now();
        }
    }

    pub fn remove(&mut self, isolate_id: &str) {
        self.entries.remove(isolate_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `(isolate_id, connection_id)` of the least-recently-active
    /// isolate, if any are tracked.
    #[must_use]
    pub fn least_recently_used(&self) -> Option<(String, String)> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_activity)
            .map(|(id, entry)| (id.clone(), entry.connection_id.clone()))
    }
}
