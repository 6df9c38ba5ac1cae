//! In-memory key index.
//!
//! Maps each key to the location of its most recent record. The index is
//! ordered over byte-string keys so prefix scans are range scans. It is
//! not itself persistent: the database writes it out on clean close via
//! [`codec`] and rebuilds it from the segments otherwise.

pub mod codec;

use std::collections::BTreeMap;

/// Location of one record: segment id, byte offset within the segment
/// and total frame length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub file_id: u32,
    pub offset: i64,
    pub size: i64,
}

/// The in-memory key-to-location map.
#[derive(Debug, Default)]
pub struct KeyIndex {
    map: BTreeMap<Vec<u8>, Item>,
}

impl KeyIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the location of a key.
    pub fn search(&self, key: &[u8]) -> Option<Item> {
        self.map.get(key).copied()
    }

    /// Bind a key to a location, overwriting any previous binding.
    pub fn insert(&mut self, key: &[u8], item: Item) {
        self.map.insert(key.to_vec(), item);
    }

    /// Remove a key's binding, if any.
    pub fn delete(&mut self, key: &[u8]) {
        self.map.remove(key);
    }

    /// Number of keys in the index.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over all bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Item)> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// Visit every binding whose key begins with `prefix`, in key order.
    ///
    /// The visitor returns `false` to stop the enumeration.
    pub fn for_each_prefix<F>(&self, prefix: &[u8], mut f: F)
    where
        F: FnMut(&[u8], &Item) -> bool,
    {
        for (key, item) in self.map.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if !f(key, item) {
                break;
            }
        }
    }
}
