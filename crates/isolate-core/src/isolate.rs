//! The isolate instance record (spec.md §3 "Isolate instance"). Owns the
//! per-isolate registries; the actual V8 context lives in `isolate-engine`,
//! which holds one of these alongside its engine handle.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::callback::CallbackTable;
use crate::error::CoreError;
use crate::stream_session::StreamSession;
use crate::test_registry::TestRegistry;
use crate::timer::TimerQueue;

bitflags::bitflags! {
    /// The subset of injected globals an isolate may see (spec.md §9
    /// "Global singletons", §4.3 "Capability set").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilitySet: u32 {
        const FETCH        = 0b0000_0001;
        const WEBSOCKET    = 0b0000_0010;
        const CRYPTO       = 0b0000_0100;
        const TIMERS       = 0b0000_1000;
        const FILESYSTEM   = 0b0001_0000;
        const TEST_RUNNER  = 0b0010_0000;
        const SERVE        = 0b0100_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolateLifecycle {
    Active,
    Disposed,
}

/// A sandboxed unit owned by exactly one client connection (spec.md §3).
pub struct Isolate {
    pub id: String,
    pub memory_limit_bytes: u64,
    pub created_at: DateTime<Utc>,
    last_activity: Instant,
    pub capabilities: CapabilitySet,
    /// specifier -> compiled module source, memoised by the loader.
    module_cache: HashMap<String, String>,
    pub callbacks: CallbackTable,
    pub streams: HashMap<u64, StreamSession>,
    pub timers: TimerQueue,
    pub test_registry: Option<TestRegistry>,
    lifecycle: IsolateLifecycle,
}

impl Isolate {
    #[must_use]
    pub fn new(id: String, memory_limit_bytes: u64, capabilities: CapabilitySet) -> Self {
        Self {
            id,
            memory_limit_bytes,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            capabilities,
            module_cache: HashMap::new(),
            callbacks: CallbackTable::new(),
            streams: HashMap::new(),
            timers: TimerQueue::new(),
            test_registry: capabilities
                .contains(CapabilitySet::TEST_RUNNER)
                .then(TestRegistry::new),
            lifecycle: IsolateLifecycle::Active,
        }
    }

    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self.lifecycle, IsolateLifecycle::Disposed)
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn cache_module(&mut self, specifier: String, code: String) {
        self.module_cache.insert(specifier, code);
    }

    #[must_use]
    pub fn cached_module(&self, specifier: &str) -> Option<&str> {
        self.module_cache.get(specifier).map(String::as_str)
    }

    /// Fails a request attempting to allocate `requested` bytes against this
    /// isolate's memory limit. Memory over-limit is retryable (spec.md §7
    /// "Resource error").
    pub fn check_memory(&self, requested: u64) -> Result<(), CoreError> {
        if requested > self.memory_limit_bytes {
            return Err(CoreError::MemoryLimitExceeded {
                requested,
                limit: self.memory_limit_bytes,
            });
        }
        Ok(())
    }

    /// Disposal ordering per spec.md §4.5: cancel streams, reject pending
    /// callbacks (the caller does the actual rejection using the ids
    /// returned here), clear timers, drop the module cache and callback
    /// table. Idempotent -- calling twice is a no-op the second time.
    pub fn begin_disposal(&mut self) -> Vec<u64> {
        if self.is_disposed() {
            return Vec::new();
        }
        let stream_ids: Vec<u64> = self.streams.keys().copied().collect();
        for session in self.streams.values_mut() {
            session.close();
        }
        self.streams.clear();
        self.callbacks.clear();
        self.timers = TimerQueue::new();
        self.module_cache.clear();
        self.lifecycle = IsolateLifecycle::Disposed;
        stream_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposal_clears_every_registry_and_is_idempotent() {
        let mut isolate = Isolate::new(
            "iso-1".to_owned(),
            1024,
            CapabilitySet::FETCH | CapabilitySet::TIMERS,
        );
        isolate.callbacks.register(crate::callback::CapabilityKind::Fetch, None);
        isolate.cache_module("mod://a".to_owned(), "export const x = 1;".to_owned());
        isolate.timers.schedule(crate::timer::TimerKind::OneShot, 10, 1);

        let cancelled = isolate.begin_disposal();
        assert_eq!(cancelled.len(), 0);
        assert!(isolate.is_disposed());
        assert!(isolate.callbacks.is_empty());
        assert!(isolate.cached_module("mod://a").is_none());

        // Idempotent: a second disposal is a safe no-op.
        let second = isolate.begin_disposal();
        assert!(second.is_empty());
        assert!(isolate.is_disposed());
    }

    #[test]
    fn memory_over_limit_is_rejected() {
        let isolate = Isolate::new("iso-2".to_owned(), 1024, CapabilitySet::empty());
        assert!(isolate.check_memory(2048).is_err());
        assert!(isolate.check_memory(512).is_ok());
    }

    #[test]
    fn test_runner_capability_provisions_a_test_registry() {
        let with = Isolate::new("a".to_owned(), 1024, CapabilitySet::TEST_RUNNER);
        assert!(with.test_registry.is_some());
        let without = Isolate::new("b".to_owned(), 1024, CapabilitySet::FETCH);
        assert!(without.test_registry.is_none());
    }
}
