//! Filesystem-mirrored cache of desktop entry directories.
//!
//! Every directory anyone asked about gets a `CachedDir` node. Nodes are
//! created eagerly along a path but scanned lazily, on the first read of
//! their contents. Watches are installed when a directory is scanned and
//! only ever mark nodes unscanned.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::desktop_entry::DesktopEntryFile;
use crate::error::canonicalize_existing_path;
use crate::monitor::{FileMonitor, MonitorEvent, WatchId};
use crate::node::{NodeArena, NodeId};

use super::atoms::{Atom, CategoryAtoms};
use super::entry::{Entry, EntryKind};

/// Handle to one `CachedDir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirId(NodeId);

/// Identifies who registered a change callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Change callback. Receives the changed path and must only set flags.
pub type SubscriberCallback = Arc<dyn Fn(&Path) + Send + Sync>;

struct CachedDir {
    name: String,
    path: PathBuf,
    parent: Option<DirId>,
    children: Vec<DirId>,
    /// Entries directly in this directory, keyed by file name.
    entries: Vec<Arc<Entry>>,
    have_scanned: bool,
    /// False once a rescan of the parent no longer lists this directory.
    present: bool,
    /// `EntryDirectory` claims on this node or any ancestor.
    use_count: usize,
    legacy: bool,
    subscriptions: Vec<(SubscriberId, SubscriberCallback)>,
    watch: Option<WatchId>,
}

impl CachedDir {
    fn new(name: String, path: PathBuf, parent: Option<DirId>, use_count: usize) -> Self {
        Self {
            name,
            path,
            parent,
            children: Vec::new(),
            entries: Vec::new(),
            have_scanned: false,
            present: true,
            use_count,
            legacy: false,
            subscriptions: Vec::new(),
            watch: None,
        }
    }
}

struct Inner {
    dirs: NodeArena<CachedDir>,
    root: DirId,
    atoms: CategoryAtoms,
    /// Desktop name for `OnlyShowIn` / `NotShowIn`.
    desktop: Option<String>,
    monitor: Option<Arc<dyn FileMonitor>>,
    next_subscriber: u64,
}

/// Shared handle to the entry cache.
#[derive(Clone)]
pub struct EntryCache {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for EntryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EntryCache")
            .field("dirs", &inner.dirs.len())
            .field("atoms", &inner.atoms.len())
            .field("desktop", &inner.desktop)
            .finish()
    }
}

impl EntryCache {
    pub fn new(desktop: Option<String>) -> Self {
        Self::build(desktop, None)
    }

    pub fn with_monitor(desktop: Option<String>, monitor: Arc<dyn FileMonitor>) -> Self {
        Self::build(desktop, Some(monitor))
    }

    fn build(desktop: Option<String>, monitor: Option<Arc<dyn FileMonitor>>) -> Self {
        let mut dirs = NodeArena::new();
        let root = DirId(dirs.insert(CachedDir::new(
            String::new(),
            PathBuf::from("/"),
            None,
            0,
        )));
        Self {
            inner: Arc::new(Mutex::new(Inner {
                dirs,
                root,
                atoms: CategoryAtoms::new(),
                desktop,
                monitor,
                next_subscriber: 0,
            })),
        }
    }

    /// Finds or creates the node for `path` and scans it if needed.
    pub fn load(&self, path: &Path, legacy: bool) -> DirId {
        let path = canonicalize_existing_path(path.to_path_buf());
        let mut inner = self.inner.lock();
        let dir = inner.ensure_dir(&path);
        if legacy {
            inner.dirs[dir.0].legacy = true;
        }
        inner.scan(dir);
        dir
    }

    /// Existing node for `path`, without creating or scanning anything.
    pub fn find_dir(&self, path: &Path) -> Option<DirId> {
        self.inner.lock().find_dir(path)
    }

    pub fn dir_path(&self, dir: DirId) -> Option<PathBuf> {
        self.inner.lock().dirs.get(dir.0).map(|node| node.path.clone())
    }

    pub fn is_scanned(&self, dir: DirId) -> bool {
        self.inner
            .lock()
            .dirs
            .get(dir.0)
            .is_some_and(|node| node.have_scanned)
    }

    pub fn is_legacy(&self, dir: DirId) -> bool {
        self.inner
            .lock()
            .dirs
            .get(dir.0)
            .is_some_and(|node| node.legacy)
    }

    pub fn use_count(&self, dir: DirId) -> usize {
        self.inner
            .lock()
            .dirs
            .get(dir.0)
            .map_or(0, |node| node.use_count)
    }

    pub fn dir_count(&self) -> usize {
        self.inner.lock().dirs.len()
    }

    pub fn mark_used(&self, dir: DirId) {
        self.inner.lock().adjust_use(dir, 1);
    }

    pub fn mark_unused(&self, dir: DirId) {
        self.inner.lock().adjust_use(dir, -1);
    }

    /// Drops every subtree nobody holds a claim on. Returns how many
    /// directories were removed.
    pub fn prune_unused(&self) -> usize {
        let mut inner = self.inner.lock();
        let root = inner.root;
        let removed = inner.prune(root);
        if removed > 0 {
            log::debug!("pruned {removed} unused cached directories");
        }
        removed
    }

    // ---------------------------------------------------------------------
    // Entry lookup
    // ---------------------------------------------------------------------

    /// Looks up `relative` (`a/b/name.desktop`) below `dir`.
    pub fn find_entry(&self, dir: DirId, relative: &str, kind: EntryKind) -> Option<Arc<Entry>> {
        let mut inner = self.inner.lock();
        let (subdirs, file) = match relative.rsplit_once('/') {
            Some((subdirs, file)) => (subdirs, file),
            None => ("", relative),
        };
        let mut current = dir;
        inner.dirs.get(current.0)?;
        inner.scan(current);
        for component in subdirs.split('/').filter(|part| !part.is_empty()) {
            current = inner.present_child(current, component)?;
            inner.scan(current);
        }
        inner.dirs[current.0]
            .entries
            .iter()
            .find(|entry| entry.kind() == kind && entry.relative_path() == file)
            .cloned()
    }

    /// Every entry of `kind` below `dir`, paired with its path relative to
    /// `dir`. Sorted by that path.
    pub fn collect_entries(&self, dir: DirId, kind: EntryKind) -> Vec<(String, Arc<Entry>)> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        if inner.dirs.contains(dir.0) {
            inner.collect(dir, "", kind, &mut out);
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Entries of `kind` directly in `dir`.
    pub fn direct_entries(&self, dir: DirId, kind: EntryKind) -> Vec<Arc<Entry>> {
        let mut inner = self.inner.lock();
        if !inner.dirs.contains(dir.0) {
            return Vec::new();
        }
        inner.scan(dir);
        inner.dirs[dir.0]
            .entries
            .iter()
            .filter(|entry| entry.kind() == kind)
            .cloned()
            .collect()
    }

    /// Present subdirectories of `dir` as `(name, path)`, sorted by name.
    pub fn subdirectories(&self, dir: DirId) -> Vec<(String, PathBuf)> {
        let mut inner = self.inner.lock();
        if !inner.dirs.contains(dir.0) {
            return Vec::new();
        }
        inner.scan(dir);
        let mut out: Vec<(String, PathBuf)> = inner.dirs[dir.0]
            .children
            .iter()
            .map(|child| &inner.dirs[child.0])
            .filter(|child| child.present)
            .map(|child| (child.name.clone(), child.path.clone()))
            .collect();
        out.sort();
        out
    }

    // ---------------------------------------------------------------------
    // Categories
    // ---------------------------------------------------------------------

    pub fn intern_category(&self, name: &str) -> Atom {
        self.inner.lock().atoms.intern(name)
    }

    /// `Atom::UNKNOWN` when the category was never seen.
    pub fn lookup_category(&self, name: &str) -> Atom {
        self.inner.lock().atoms.lookup(name)
    }

    pub fn category_name(&self, atom: Atom) -> Option<String> {
        self.inner.lock().atoms.name(atom).map(str::to_string)
    }

    /// String form of [`Entry::has_category_atom`]; never interns.
    pub fn entry_has_category(&self, entry: &Entry, name: &str) -> bool {
        entry.has_category_atom(self.lookup_category(name))
    }

    // ---------------------------------------------------------------------
    // Change notification
    // ---------------------------------------------------------------------

    pub fn new_subscriber(&self) -> SubscriberId {
        let mut inner = self.inner.lock();
        inner.next_subscriber += 1;
        SubscriberId(inner.next_subscriber)
    }

    pub fn subscribe(&self, dir: DirId, owner: SubscriberId, callback: SubscriberCallback) {
        let mut inner = self.inner.lock();
        if let Some(node) = inner.dirs.get_mut(dir.0) {
            if !node.subscriptions.iter().any(|(id, _)| *id == owner) {
                node.subscriptions.push((owner, callback));
            }
        }
    }

    pub fn unsubscribe_owner(&self, owner: SubscriberId) {
        let mut inner = self.inner.lock();
        let ids: Vec<NodeId> = inner.dirs.iter().map(|(id, _)| id).collect();
        for id in ids {
            inner.dirs[id]
                .subscriptions
                .retain(|(subscriber, _)| *subscriber != owner);
        }
    }

    /// Applies one filesystem event: the directory it names and the one
    /// containing it are marked unscanned, then subscribers on those and
    /// their ancestors are told. Returns whether any cached node matched.
    pub fn handle_event(&self, event: &MonitorEvent) -> bool {
        let callbacks = {
            let mut inner = self.inner.lock();
            let mut affected = Vec::new();
            if let Some(dir) = inner.find_dir(&event.path) {
                affected.push(dir);
            }
            if let Some(parent) = event.path.parent().and_then(|parent| inner.find_dir(parent)) {
                if !affected.contains(&parent) {
                    affected.push(parent);
                }
            }
            if affected.is_empty() {
                return false;
            }
            for &dir in &affected {
                inner.dirs[dir.0].have_scanned = false;
            }
            log::debug!(
                "{:?} on {} invalidated {} cached directories",
                event.kind,
                event.path.display(),
                affected.len()
            );
            inner.subscribers_above(&affected)
        };
        for callback in callbacks {
            callback(&event.path);
        }
        true
    }
}

impl Inner {
    fn find_dir(&self, path: &Path) -> Option<DirId> {
        let mut current = self.root;
        for component in path.components() {
            if let Component::Normal(name) = component {
                current = self.child_named(current, &name.to_string_lossy())?;
            }
        }
        Some(current)
    }

    fn child_named(&self, dir: DirId, name: &str) -> Option<DirId> {
        self.dirs[dir.0]
            .children
            .iter()
            .copied()
            .find(|child| self.dirs[child.0].name == name)
    }

    fn present_child(&self, dir: DirId, name: &str) -> Option<DirId> {
        self.child_named(dir, name)
            .filter(|child| self.dirs[child.0].present)
    }

    fn ensure_dir(&mut self, path: &Path) -> DirId {
        let mut current = self.root;
        for component in path.components() {
            if let Component::Normal(name) = component {
                let name = name.to_string_lossy();
                current = match self.child_named(current, &name) {
                    Some(child) => {
                        self.dirs[child.0].present = true;
                        child
                    }
                    None => self.add_child(current, &name),
                };
            }
        }
        current
    }

    fn add_child(&mut self, parent: DirId, name: &str) -> DirId {
        let parent_node = &self.dirs[parent.0];
        let node = CachedDir::new(
            name.to_string(),
            parent_node.path.join(name),
            Some(parent),
            parent_node.use_count,
        );
        let child = DirId(self.dirs.insert(node));
        self.dirs[parent.0].children.push(child);
        child
    }

    fn scan(&mut self, dir: DirId) {
        if self.dirs[dir.0].have_scanned {
            return;
        }
        let path = self.dirs[dir.0].path.clone();
        let mut entries = Vec::new();
        let mut subdirs = Vec::new();
        let listed = match fs::read_dir(&path) {
            Ok(read_dir) => {
                for item in read_dir.flatten() {
                    let file_name = item.file_name().to_string_lossy().into_owned();
                    let item_path = item.path();
                    if is_traversable_dir(&path, &item_path) {
                        subdirs.push(file_name);
                        continue;
                    }
                    let Some(kind) = EntryKind::from_file_name(&file_name) else {
                        continue;
                    };
                    if let Some(entry) = self.load_entry(&file_name, &item_path, kind) {
                        entries.push(Arc::new(entry));
                    }
                }
                true
            }
            Err(error) => {
                log::debug!("cannot scan {}: {error}", path.display());
                false
            }
        };
        entries.sort_by(|a, b| a.relative_path().cmp(b.relative_path()));

        if listed {
            for child in self.dirs[dir.0].children.clone() {
                let present = subdirs.contains(&self.dirs[child.0].name);
                if !present && self.dirs[child.0].present {
                    self.mark_vanished(child);
                }
                self.dirs[child.0].present = present;
            }
            for name in subdirs {
                if self.child_named(dir, &name).is_none() {
                    self.add_child(dir, &name);
                }
            }
        }

        log::debug!(
            "scanned {} ({} entries, {} subdirectories)",
            path.display(),
            entries.len(),
            self.dirs[dir.0].children.len()
        );
        let node = &mut self.dirs[dir.0];
        node.entries = entries;
        node.have_scanned = true;
        if listed {
            self.install_watch(dir);
        }
    }

    fn mark_vanished(&mut self, dir: DirId) {
        for id in self.subtree(dir) {
            let node = &mut self.dirs[id.0];
            node.entries.clear();
            node.have_scanned = false;
        }
        self.dirs[dir.0].present = false;
    }

    fn install_watch(&mut self, dir: DirId) {
        let Some(monitor) = self.monitor.clone() else {
            return;
        };
        let node = &mut self.dirs[dir.0];
        if node.watch.is_some() {
            return;
        }
        match monitor.watch(&node.path) {
            Ok(id) => node.watch = Some(id),
            Err(error) => log::warn!("not watching {}: {error}", node.path.display()),
        }
    }

    fn load_entry(&mut self, file_name: &str, path: &Path, kind: EntryKind) -> Option<Entry> {
        let file = match DesktopEntryFile::load(path) {
            Ok(file) => file,
            Err(error) => {
                log::warn!("skipping unreadable entry {}: {error}", path.display());
                return None;
            }
        };
        let no_display = file.get_bool("NoDisplay").unwrap_or(false);
        if kind == EntryKind::Desktop {
            if no_display || file.get_bool("Hidden").unwrap_or(false) {
                return None;
            }
            if !self.shown_in_desktop(&file) {
                return None;
            }
        }
        let categories = file
            .get_strings("Categories")
            .unwrap_or_default()
            .iter()
            .filter(|category| !category.is_empty())
            .map(|category| self.atoms.intern(category))
            .collect();
        Some(Entry::new(file_name, path, kind, categories, no_display))
    }

    fn shown_in_desktop(&self, file: &DesktopEntryFile) -> bool {
        let Some(desktop) = self.desktop.as_deref() else {
            return true;
        };
        if let Some(only) = file.get_strings("OnlyShowIn") {
            if !only.iter().any(|name| name == desktop) {
                return false;
            }
        }
        if let Some(not) = file.get_strings("NotShowIn") {
            if not.iter().any(|name| name == desktop) {
                return false;
            }
        }
        true
    }

    fn collect(
        &mut self,
        dir: DirId,
        prefix: &str,
        kind: EntryKind,
        out: &mut Vec<(String, Arc<Entry>)>,
    ) {
        self.scan(dir);
        for entry in &self.dirs[dir.0].entries {
            if entry.kind() == kind {
                out.push((format!("{prefix}{}", entry.relative_path()), entry.clone()));
            }
        }
        for child in self.dirs[dir.0].children.clone() {
            if !self.dirs[child.0].present {
                continue;
            }
            let child_prefix = format!("{prefix}{}/", self.dirs[child.0].name);
            self.collect(child, &child_prefix, kind, out);
        }
    }

    fn subtree(&self, dir: DirId) -> Vec<DirId> {
        let mut out = Vec::new();
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.dirs[current.0].children.iter().copied());
        }
        out
    }

    fn adjust_use(&mut self, dir: DirId, delta: isize) {
        if !self.dirs.contains(dir.0) {
            return;
        }
        for id in self.subtree(dir) {
            let node = &mut self.dirs[id.0];
            node.use_count = node.use_count.saturating_add_signed(delta);
        }
    }

    /// Post-order removal of unclaimed leaves. Returns the number removed.
    fn prune(&mut self, dir: DirId) -> usize {
        let mut removed = 0;
        for child in self.dirs[dir.0].children.clone() {
            removed += self.prune(child);
            let node = &self.dirs[child.0];
            if node.use_count == 0 && node.children.is_empty() {
                self.remove_dir(child);
                removed += 1;
            }
        }
        removed
    }

    fn remove_dir(&mut self, dir: DirId) {
        let Some(node) = self.dirs.try_remove(dir.0) else {
            return;
        };
        if let Some(parent) = node.parent {
            // The parent's listing no longer matches its children.
            let parent = &mut self.dirs[parent.0];
            parent.children.retain(|child| *child != dir);
            parent.have_scanned = false;
        }
        if let (Some(watch), Some(monitor)) = (node.watch, self.monitor.as_ref()) {
            monitor.cancel(watch);
        }
    }

    fn subscribers_above(&self, dirs: &[DirId]) -> Vec<SubscriberCallback> {
        let mut seen: Vec<SubscriberId> = Vec::new();
        let mut callbacks = Vec::new();
        for &dir in dirs {
            let mut current = Some(dir);
            while let Some(id) = current {
                let node = &self.dirs[id.0];
                for (owner, callback) in &node.subscriptions {
                    if !seen.contains(owner) {
                        seen.push(*owner);
                        callbacks.push(callback.clone());
                    }
                }
                current = node.parent;
            }
        }
        callbacks
    }
}

/// Directories are followed through symlinks unless the link points back
/// into the directory being scanned.
fn is_traversable_dir(scanning: &Path, item: &Path) -> bool {
    let Ok(metadata) = fs::metadata(item) else {
        return false;
    };
    if !metadata.is_dir() {
        return false;
    }
    let is_link = fs::symlink_metadata(item)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return true;
    }
    match fs::canonicalize(item) {
        Ok(target) => !scanning.starts_with(&target),
        Err(_) => false,
    }
}
