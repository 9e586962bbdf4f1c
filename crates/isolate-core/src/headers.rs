//! Case-insensitive multimap backing the guest `Headers` class (spec.md §3
//! "Headers state"). Iteration order is insertion order over lowercased keys,
//! matching the teacher's ordered-registration style in
//! `services/server/src/state.rs`.

use std::collections::HashMap;

use isolate_protocol::value::is_internal_marker;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderState {
    /// Lowercased name -> ordered values.
    entries: HashMap<String, Vec<String>>,
    /// Insertion order of first-seen lowercased names.
    order: Vec<String>,
}

impl HeaderState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from a plain record, stripping the three internal bridge
    /// marker fields (spec.md §4.2 "Forbidden leaks").
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut state = Self::new();
        for (name, value) in pairs {
            if is_internal_marker(&name) {
                continue;
            }
            state.append(&name, value);
        }
        state
    }

    pub fn append(&mut self, name: &str, value: String) {
        let key = name.to_ascii_lowercase();
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.entry(key).or_default().push(value);
    }

    pub fn set(&mut self, name: &str, value: String) {
        let key = name.to_ascii_lowercase();
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, vec![value]);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|values| values.join(", "))
    }

    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<String> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn delete(&mut self, name: &str) {
        let key = name.to_ascii_lowercase();
        if self.entries.remove(&key).is_some() {
            self.order.retain(|k| k != &key);
        }
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterates `(lowercased name, joined value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, String)> {
        self.order.iter().map(move |key| {
            let value = self.entries[key].join(", ");
            (key.as_str(), value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_internal_markers_on_construction() {
        let state = HeaderState::from_pairs([
            ("Content-Type".to_owned(), "text/plain".to_owned()),
            ("__instanceId__".to_owned(), "1".to_owned()),
            ("__className__".to_owned(), "Headers".to_owned()),
            ("__isDefineClassInstance__".to_owned(), "true".to_owned()),
        ]);
        assert!(!state.has("__instanceId__"));
        assert!(!state.has("__className__"));
        assert!(!state.has("__isDefineClassInstance__"));
        assert_eq!(state.get("content-type"), Some("text/plain".to_owned()));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let mut state = HeaderState::new();
        state.set("Content-Type", "application/json".to_owned());
        assert_eq!(state.get("content-type"), Some("application/json".to_owned()));
        assert_eq!(state.get("CONTENT-TYPE"), Some("application/json".to_owned()));
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut state = HeaderState::new();
        state.set("X-Second", "b".to_owned());
        state.set("X-First", "a".to_owned());
        let names: Vec<_> = state.iter().map(|(name, _)| name.to_owned()).collect();
        assert_eq!(names, vec!["x-second", "x-first"]);
    }

    #[test]
    fn append_preserves_multiple_values_joined_by_comma_space() {
        let mut state = HeaderState::new();
        state.append("Set-Cookie", "a=1".to_owned());
        state.append("set-cookie", "b=2".to_owned());
        assert_eq!(state.get_all("set-cookie"), vec!["a=1", "b=2"]);
        assert_eq!(state.get("set-cookie"), Some("a=1, b=2".to_owned()));
    }
}
