use std::collections::BTreeMap;
use std::sync::Arc;

use crate::entry::Entry;

use super::list::EntryDirectoryList;

/// Entries keyed by relative path, iterated in path order.
#[derive(Debug, Clone, Default)]
pub struct EntrySet {
    entries: BTreeMap<String, Arc<Entry>>,
}

impl EntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts, replacing any entry with the same relative path.
    pub fn insert(&mut self, entry: Arc<Entry>) {
        self.entries.insert(entry.relative_path().to_string(), entry);
    }

    pub fn remove(&mut self, relative_path: &str) -> Option<Arc<Entry>> {
        self.entries.remove(relative_path)
    }

    pub fn get(&self, relative_path: &str) -> Option<&Arc<Entry>> {
        self.entries.get(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entry>> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn into_entries(self) -> Vec<Arc<Entry>> {
        self.entries.into_values().collect()
    }

    /// Adds every entry of `other`; entries from `other` win on collision.
    pub fn union(&mut self, other: &EntrySet) {
        for (key, entry) in &other.entries {
            self.entries.insert(key.clone(), entry.clone());
        }
    }

    pub fn intersect(&mut self, other: &EntrySet) {
        self.entries.retain(|key, _| other.entries.contains_key(key));
    }

    pub fn subtract(&mut self, other: &EntrySet) {
        self.entries.retain(|key, _| !other.entries.contains_key(key));
    }

    /// Replaces this set with everything visible in `list` that it does not
    /// contain.
    pub fn invert(&mut self, list: &EntryDirectoryList) {
        let mut all = list.get_all_desktops();
        all.subtract(self);
        self.swap(&mut all);
    }

    pub fn swap(&mut self, other: &mut EntrySet) {
        std::mem::swap(&mut self.entries, &mut other.entries);
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Entry) -> bool) {
        self.entries.retain(|_, entry| keep(entry));
    }
}

impl FromIterator<Arc<Entry>> for EntrySet {
    fn from_iter<I: IntoIterator<Item = Arc<Entry>>>(iter: I) -> Self {
        let mut set = EntrySet::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}
