use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;

use crate::entry::{Atom, DirId, Entry, EntryCache, EntryKind};

use super::set::EntrySet;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LoadFlags: u8 {
        /// Entries get the implicit `Legacy` category.
        const LEGACY              = 0b0000_0001;
        const INCLUDE_DESKTOPS    = 0b0000_0010;
        const INCLUDE_DIRECTORIES = 0b0000_0100;
    }
}

/// One directory subtree of the entry cache seen through specific flags.
///
/// Holds a use claim on the subtree for as long as it lives.
pub struct EntryDirectory {
    cache: EntryCache,
    dir: DirId,
    path: PathBuf,
    flags: LoadFlags,
    /// File-id prefix from `<LegacyDir prefix="...">`.
    prefix: Option<String>,
    legacy_atom: Atom,
}

impl fmt::Debug for EntryDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryDirectory")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl EntryDirectory {
    pub fn load(cache: &EntryCache, path: &Path, flags: LoadFlags, prefix: Option<String>) -> Self {
        let legacy = flags.contains(LoadFlags::LEGACY);
        let dir = cache.load(path, legacy);
        cache.mark_used(dir);
        let legacy_atom = if legacy {
            cache.intern_category("Legacy")
        } else {
            Atom::UNKNOWN
        };
        Self {
            cache: cache.clone(),
            dir,
            path: cache.dir_path(dir).unwrap_or_else(|| path.to_path_buf()),
            flags,
            prefix,
            legacy_atom,
        }
    }

    pub fn dir_id(&self) -> DirId {
        self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> LoadFlags {
        self.flags
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn get_desktop(&self, relative_path: &str) -> Option<Arc<Entry>> {
        if !self.flags.contains(LoadFlags::INCLUDE_DESKTOPS) {
            return None;
        }
        self.lookup(relative_path, EntryKind::Desktop)
    }

    pub fn get_directory(&self, relative_path: &str) -> Option<Arc<Entry>> {
        if !self.flags.contains(LoadFlags::INCLUDE_DIRECTORIES) {
            return None;
        }
        self.lookup(relative_path, EntryKind::Directory)
    }

    /// Inserts every visible desktop entry into `set`, overwriting by key.
    pub fn get_all_desktops(&self, set: &mut EntrySet) {
        if self.flags.contains(LoadFlags::INCLUDE_DESKTOPS) {
            self.collect(EntryKind::Desktop, set);
        }
    }

    pub fn get_all_directories(&self, set: &mut EntrySet) {
        if self.flags.contains(LoadFlags::INCLUDE_DIRECTORIES) {
            self.collect(EntryKind::Directory, set);
        }
    }

    fn lookup(&self, relative_path: &str, kind: EntryKind) -> Option<Arc<Entry>> {
        let on_disk = match &self.prefix {
            Some(prefix) => relative_path.strip_prefix(prefix.as_str())?,
            None => relative_path,
        };
        let entry = self.cache.find_entry(self.dir, on_disk, kind)?;
        Some(self.present(entry, relative_path))
    }

    fn collect(&self, kind: EntryKind, set: &mut EntrySet) {
        for (relative, entry) in self.cache.collect_entries(self.dir, kind) {
            let id = match &self.prefix {
                Some(prefix) => format!("{prefix}{relative}"),
                None => relative,
            };
            set.insert(self.present(entry, &id));
        }
    }

    /// Shares the cached entry when nothing about it changes, copies it
    /// otherwise.
    fn present(&self, entry: Arc<Entry>, relative_path: &str) -> Arc<Entry> {
        let needs_legacy = !self.legacy_atom.is_unknown() && !entry.has_category_atom(self.legacy_atom);
        if entry.relative_path() == relative_path && !needs_legacy {
            return entry;
        }
        let extra = needs_legacy.then_some(self.legacy_atom);
        Arc::new(entry.relocated(relative_path, extra))
    }
}

impl Drop for EntryDirectory {
    fn drop(&mut self) {
        self.cache.mark_unused(self.dir);
    }
}
