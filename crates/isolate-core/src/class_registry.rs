//! Host-side state for class-backed objects (spec.md §3 "Class-backed
//! object"). State is owned here, keyed by a stable numeric instance id;
//! the guest only ever holds `(instance_id, class_name)` and rematerialises
//! a fresh wrapper instance against this registry on each marshal-in.

use std::collections::HashMap;

use isolate_protocol::value::ClassTag;

/// Opaque per-class state blob. Each class kind (`Headers`, `Blob`, ...)
/// defines its own concrete shape in `isolate-bridge`; this registry only
/// needs to store and retrieve it by id, so it is generic over the stored
/// representation.
#[derive(Debug, Clone)]
pub struct ClassInstance<T> {
    pub class_name: ClassTag,
    pub state: T,
}

#[derive(Debug, Clone)]
pub struct ClassRegistry<T> {
    instances: HashMap<u64, ClassInstance<T>>,
    next_id: u64,
}

impl<T> Default for ClassRegistry<T> {
    fn default() -> Self {
        Self {
            instances: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<T> ClassRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class_name: ClassTag, state: T) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.instances.insert(id, ClassInstance { class_name, state });
        id
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&ClassInstance<T>> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut ClassInstance<T>> {
        self.instances.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<ClassInstance<T>> {
        self.instances.remove(&id)
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_stable_id_and_state_is_retrievable_by_any_holder() {
        let mut registry: ClassRegistry<String> = ClassRegistry::new();
        let id = registry.insert(ClassTag::Headers, "content-type: text/plain".to_owned());

        // Simulates a second guest marshalling the same instance id back in.
        let seen_by_guest_a = registry.get(id).unwrap();
        let seen_by_guest_b = registry.get(id).unwrap();
        assert_eq!(seen_by_guest_a.state, seen_by_guest_b.state);
        assert_eq!(seen_by_guest_a.class_name, ClassTag::Headers);
    }

    #[test]
    fn remove_drops_the_instance() {
        let mut registry: ClassRegistry<u8> = ClassRegistry::new();
        let id = registry.insert(ClassTag::Blob, 1);
        assert!(registry.remove(id).is_some());
        assert!(registry.get(id).is_none());
    }
}
