use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A key and its encoded value, as stored inside a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValuePair {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }
}

/// The key/value pairs held by a leaf, kept strictly ascending by key at all times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<KeyValuePair>", into = "Vec<KeyValuePair>")]
pub struct SortedMap {
    entries: Vec<KeyValuePair>,
}

impl SortedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first entry whose key is not less than `key`.
    ///
    /// The search never stops early on an equal midpoint, so the returned index is both the
    /// position of an existing match and the stable insertion point for a new key.
    fn lower_bound(&self, key: &[u8]) -> usize {
        self.entries.partition_point(|kvp| kvp.key.as_slice() < key)
    }

    pub fn find(&self, key: &[u8]) -> Option<&KeyValuePair> {
        self.entries
            .get(self.lower_bound(key))
            .filter(|kvp| kvp.key == key)
    }

    /// Inserts `kvp`, or overwrites the value of the entry with the same key.
    pub fn replace(&mut self, kvp: KeyValuePair) {
        let index = self.lower_bound(&kvp.key);
        match self.entries.get_mut(index) {
            Some(existing) if existing.key == kvp.key => *existing = kvp,
            _ => self.entries.insert(index, kvp),
        }
    }

    /// Returns an independent map over the entries at sorted indices `[begin, end)`.
    ///
    /// `end` is clamped to the map's length and `begin` to `end`, so out of range bounds give a
    /// shorter or empty map.
    pub fn slice(&self, begin: usize, end: usize) -> SortedMap {
        let end = end.min(self.entries.len());
        let begin = begin.min(end);
        Self {
            entries: self.entries[begin..end].to_vec(),
        }
    }

    /// Number of leading entries for which `pred` holds, assuming `pred` is monotone over the map.
    pub fn partition_point(&self, pred: impl FnMut(&KeyValuePair) -> bool) -> usize {
        self.entries.partition_point(pred)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyValuePair> {
        self.entries.iter()
    }
}

impl TryFrom<Vec<KeyValuePair>> for SortedMap {
    type Error = &'static str;

    fn try_from(entries: Vec<KeyValuePair>) -> Result<Self, Self::Error> {
        if entries.windows(2).any(|pair| pair[0].key >= pair[1].key) {
            return Err("leaf entries are not strictly ascending by key");
        }
        Ok(Self { entries })
    }
}

impl From<SortedMap> for Vec<KeyValuePair> {
    fn from(map: SortedMap) -> Self {
        map.entries
    }
}

impl<'a> IntoIterator for &'a SortedMap {
    type Item = &'a KeyValuePair;
    type IntoIter = std::slice::Iter<'a, KeyValuePair>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Display for SortedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SortedMap {{ ")?;
        for (i, kvp) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", hex::encode(&kvp.key), hex::encode(&kvp.value))?;
        }
        write!(f, " }}")
    }
}
