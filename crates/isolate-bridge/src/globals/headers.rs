//! `Headers` (spec.md §4.3, §3 "Headers state", §3 "Class-backed object").
//! Identity-preserving: `new Headers(otherHeaders)` copies every value into
//! a fresh host-side record, never shares the source's id.

use isolate_core::{ClassRegistry, HeaderState};
use isolate_protocol::value::ClassTag;

use crate::error_bridge::BridgeError;

#[derive(Debug, Default)]
pub struct HeadersApi {
    registry: ClassRegistry<HeaderState>,
}

impl HeadersApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `new Headers()` / `new Headers(init)`. `init` is already flattened to
    /// `(name, value)` pairs by the caller regardless of whether the guest
    /// passed another `Headers`, an array of pairs, or a plain record --
    /// internal marker stripping happens uniformly in `HeaderState::from_pairs`.
    pub fn construct(&mut self, init: impl IntoIterator<Item = (String, String)>) -> u64 {
        self.registry.insert(ClassTag::Headers, HeaderState::from_pairs(init))
    }

    pub fn get(&self, instance_id: u64, name: &str) -> Result<Option<String>, BridgeError> {
        Ok(self.state(instance_id)?.get(name))
    }

    pub fn get_all(&self, instance_id: u64, name: &str) -> Result<Vec<String>, BridgeError> {
        Ok(self.state(instance_id)?.get_all(name))
    }

    pub fn has(&self, instance_id: u64, name: &str) -> Result<bool, BridgeError> {
        Ok(self.state(instance_id)?.has(name))
    }

    pub fn set(&mut self, instance_id: u64, name: &str, value: String) -> Result<(), BridgeError> {
        self.state_mut(instance_id)?.set(name, value);
        Ok(())
    }

    pub fn append(&mut self, instance_id: u64, name: &str, value: String) -> Result<(), BridgeError> {
        self.state_mut(instance_id)?.append(name, value);
        Ok(())
    }

    pub fn delete(&mut self, instance_id: u64, name: &str) -> Result<(), BridgeError> {
        self.state_mut(instance_id)?.delete(name);
        Ok(())
    }

    pub fn entries(&self, instance_id: u64) -> Result<Vec<(String, String)>, BridgeError> {
        Ok(self
            .state(instance_id)?
            .iter()
            .map(|(name, value)| (name.to_owned(), value))
            .collect())
    }

    fn state(&self, instance_id: u64) -> Result<&HeaderState, BridgeError> {
        Ok(&self
            .registry
            .get(instance_id)
            .ok_or(isolate_core::CoreError::IsolateNotFound(instance_id.to_string()))?
            .state)
    }

    fn state_mut(&mut self, instance_id: u64) -> Result<&mut HeaderState, BridgeError> {
        Ok(&mut self
            .registry
            .get_mut(instance_id)
            .ok_or(isolate_core::CoreError::IsolateNotFound(instance_id.to_string()))?
            .state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_constructor_duplicates_values_under_a_fresh_identity() {
        let mut api = HeadersApi::new();
        let source = api.construct([("Content-Type".to_owned(), "text/plain".to_owned())]);
        let copied_pairs = api.entries(source).unwrap();
        let copy = api.construct(copied_pairs);

        assert_ne!(source, copy);
        assert_eq!(api.get(copy, "content-type").unwrap(), Some("text/plain".to_owned()));

        api.set(copy, "content-type", "application/json".to_owned()).unwrap();
        assert_eq!(api.get(source, "content-type").unwrap(), Some("text/plain".to_owned()));
    }

    #[test]
    fn case_insensitive_set_and_get_round_trip() {
        let mut api = HeadersApi::new();
        let id = api.construct(std::iter::empty());
        api.set(id, "X-Custom", "value".to_owned()).unwrap();
        assert_eq!(api.get(id, "x-CUSTOM").unwrap(), Some("value".to_owned()));
    }
}
