use serde::ser::{Serialize, SerializeMap, Serializer};

/// Label → count result of one detection attempt.
///
/// Entries keep insertion order, which is the order the server listed them
/// in. Zero counts and empty labels are never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionMapping {
    entries: Vec<(String, u32)>,
}

impl DetectionMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapping substituted when no native camera is available.
    pub fn placeholder() -> Self {
        [("person", 1), ("chair", 2), ("laptop", 1)]
            .into_iter()
            .collect()
    }

    /// Insert or replace a label. Returns false when the entry was dropped
    /// (empty label or zero count).
    pub fn insert(&mut self, label: impl Into<String>, count: u32) -> bool {
        let label = label.into();
        if label.is_empty() || count == 0 {
            return false;
        }
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = count,
            None => self.entries.push((label, count)),
        }
        true
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, count)| *count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries
            .iter()
            .map(|(label, count)| (label.as_str(), *count))
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| u64::from(*count)).sum()
    }
}

impl<L: Into<String>> FromIterator<(L, u32)> for DetectionMapping {
    fn from_iter<I: IntoIterator<Item = (L, u32)>>(iter: I) -> Self {
        let mut mapping = DetectionMapping::new();
        for (label, count) in iter {
            mapping.insert(label, count);
        }
        mapping
    }
}

impl Serialize for DetectionMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, count) in &self.entries {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}
