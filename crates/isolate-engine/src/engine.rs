//! Per-connection isolate pool (spec.md §4.5 "Activity accounting" /
//! "Eviction"): tracks every live isolate, evicts the LRU isolate whose
//! owner connection is idle once `max_isolates` is exceeded, and enforces
//! the per-isolate memory limit up front.

use std::collections::HashMap;
use std::rc::Rc;

use isolate_core::{CapabilitySet, IsolateLru};
use tracing::{instrument, warn};

use crate::error::EngineError;
use crate::lifecycle::IsolateHandle;
use crate::module_loader::ModuleLoaderHook;

pub struct Engine {
    max_isolates: usize,
    isolates: HashMap<String, IsolateHandle>,
    lru: IsolateLru,
}

impl Engine {
    #[must_use]
    pub fn new(max_isolates: usize) -> Self {
        Self {
            max_isolates,
            isolates: HashMap::new(),
            lru: IsolateLru::new(),
        }
    }

    /// Creates a new isolate, evicting the least-recently-used isolate
    /// first if `max_isolates` would otherwise be exceeded (spec.md §4.5).
    #[instrument(skip(self, loader_hook))]
    pub fn create_isolate(
        &mut self,
        id: String,
        connection_id: String,
        memory_limit_bytes: u64,
        capabilities: CapabilitySet,
        loader_hook: Rc<dyn ModuleLoaderHook>,
    ) -> Result<(), EngineError> {
        if self.isolates.len() >= self.max_isolates {
            self.evict_least_recently_used()?;
        }

        let handle = IsolateHandle::create(id.clone(), memory_limit_bytes, capabilities, loader_hook)?;
        self.isolates.insert(id.clone(), handle);
        self.lru.record_creation(id, connection_id);
        Ok(())
    }

    pub fn touch(&mut self, id: &str) {
        if let Some(handle) = self.isolates.get_mut(id) {
            handle.record.borrow_mut().touch();
        }
        self.lru.record_activity(id);
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut IsolateHandle> {
        self.isolates.get_mut(id)
    }

    /// Disposes one isolate explicitly (`runtime.close()`), following the
    /// same ordering as eviction.
    pub fn dispose(&mut self, id: &str) -> Vec<u64> {
        self.lru.remove(id);
        self.isolates
            .get_mut(id)
            .map(IsolateHandle::dispose)
            .unwrap_or_default()
    }

    /// Removes the isolate record entirely once disposal has run.
    pub fn remove(&mut self, id: &str) -> Option<IsolateHandle> {
        self.isolates.remove(id)
    }

    fn evict_least_recently_used(&mut self) -> Result<(), EngineError> {
        let (isolate_id, _connection_id) = self
            .lru
            .least_recently_used()
            .ok_or(EngineError::NoEvictionCandidate)?;
        warn!(isolate_id = %isolate_id, "evicting least-recently-used isolate to honor max_isolates");
        self.dispose(&isolate_id);
        self.isolates.remove(&isolate_id);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.isolates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.isolates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    struct NoopLoader;
    impl ModuleLoaderHook for NoopLoader {
        fn load(
            &self,
            specifier: &str,
            _importer_resolve_dir: &str,
        ) -> Pin<Box<dyn Future<Output = Result<crate::module_loader::LoadedModule, EngineError>>>> {
            let specifier = specifier.to_owned();
            Box::pin(async move {
                Err(EngineError::ModuleLoadFailed {
                    specifier,
                    message: "no modules registered in this test".to_owned(),
                })
            })
        }
    }

    fn loader() -> Rc<dyn ModuleLoaderHook> {
        Rc::new(NoopLoader)
    }

    #[test]
    fn exceeding_max_isolates_evicts_the_least_recently_used_one() {
        let mut engine = Engine::new(1);
        engine
            .create_isolate("a".to_owned(), "conn-1".to_owned(), 64 * 1024 * 1024, CapabilitySet::empty(), loader())
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));

        engine
            .create_isolate("b".to_owned(), "conn-1".to_owned(), 64 * 1024 * 1024, CapabilitySet::empty(), loader())
            .unwrap();

        assert_eq!(engine.len(), 1);
        assert!(engine.get_mut("a").is_none());
        assert!(engine.get_mut("b").is_some());
    }

    #[test]
    fn touch_updates_activity_so_a_busier_isolate_survives_eviction() {
        let mut engine = Engine::new(2);
        engine
            .create_isolate("a".to_owned(), "conn-1".to_owned(), 64 * 1024 * 1024, CapabilitySet::empty(), loader())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        engine
            .create_isolate("b".to_owned(), "conn-1".to_owned(), 64 * 1024 * 1024, CapabilitySet::empty(), loader())
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        engine.touch("a");

        engine
            .create_isolate("c".to_owned(), "conn-1".to_owned(), 64 * 1024 * 1024, CapabilitySet::empty(), loader())
            .unwrap();

        assert!(engine.get_mut("a").is_some());
        assert!(engine.get_mut("b").is_none());
    }
}
