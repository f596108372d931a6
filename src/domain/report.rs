//! Flat key-value export records.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Ordered field name -> value pairs for tabular export.
///
/// Serializes as a JSON object that keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRecord {
    entries: Vec<(String, String)>,
}

impl FlatRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, replacing the value of an existing key in place.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Append every entry of `other`.
    pub fn extend(&mut self, other: FlatRecord) {
        for (key, value) in other.entries {
            self.push(key, value);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
