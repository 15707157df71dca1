//! Resolved-tree cache keyed by logical menu name.
//!
//! Trees are rebuilt lazily: watch events and entry-cache notifications only
//! flip a dirty flag, and the next lookup reloads and records a diff.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use fnv::FnvHashMap;

use crate::config::MenuConfig;
use crate::entry::{EntryCache, SubscriberId};
use crate::error::{canonicalize_existing_path, MenuError, Result};
use crate::monitor::{monitor_channel, FileMonitor, MonitorEvent, NotifyMonitor, NullMonitor, WatchId};
use crate::node::MenuTree;
use crate::parser::{detect_dialect, MenuDialect};
use crate::resolve::{materialize, resolve_file, DesktopEntryTree, ResolveContext};

use super::diff::{diff_trees, TreeChange};
use super::raw::MenuFileCache;

/// Where a logical menu currently lives.
#[derive(Debug, Clone)]
pub(super) struct MenuLocation {
    pub(super) menu_file: PathBuf,
    /// First system copy after the user directory, merged by a freshly
    /// created user file.
    pub(super) chain_to: Option<PathBuf>,
}

pub(super) struct CachedTree {
    /// Set for name lookups, which re-search the menu directories on reload.
    pub(super) lookup_name: Option<String>,
    pub(super) location: MenuLocation,
    /// Resolved menu tree; its cached directory lists hold the use claims
    /// backing `tree`.
    pub(super) resolved: Option<MenuTree>,
    pub(super) tree: Option<Arc<DesktopEntryTree>>,
    error: Option<MenuError>,
    pending: Vec<TreeChange>,
    pub(super) dirty: Arc<AtomicBool>,
    subscriber: SubscriberId,
    read_files: Vec<PathBuf>,
}

/// Cache of materialized menus with change tracking and edit support.
pub struct DesktopEntryTreeCache {
    pub(super) config: MenuConfig,
    pub(super) entry_cache: EntryCache,
    pub(super) raw: MenuFileCache,
    monitor: Arc<dyn FileMonitor>,
    events: Receiver<MonitorEvent>,
    pub(super) trees: FnvHashMap<String, CachedTree>,
    file_watches: FnvHashMap<PathBuf, WatchId>,
}

impl std::fmt::Debug for DesktopEntryTreeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopEntryTreeCache")
            .field("trees", &self.trees.keys().collect::<Vec<_>>())
            .field("raw", &self.raw.len())
            .field("watches", &self.file_watches.len())
            .finish()
    }
}

impl DesktopEntryTreeCache {
    /// Uses the OS notifier when `config.watch` is set.
    pub fn new(config: MenuConfig) -> Self {
        let (sender, receiver) = monitor_channel();
        let monitor: Arc<dyn FileMonitor> = if config.watch {
            match NotifyMonitor::new(sender) {
                Ok(monitor) => Arc::new(monitor),
                Err(error) => {
                    log::warn!("file watching unavailable, menus will not auto-refresh: {error}");
                    Arc::new(NullMonitor::new())
                }
            }
        } else {
            Arc::new(NullMonitor::new())
        };
        Self::with_monitor(config, monitor, receiver)
    }

    /// Uses `monitor` for every watch; its events must arrive on `events`.
    pub fn with_monitor(
        config: MenuConfig,
        monitor: Arc<dyn FileMonitor>,
        events: Receiver<MonitorEvent>,
    ) -> Self {
        let entry_cache = EntryCache::with_monitor(config.desktop.clone(), monitor.clone());
        Self {
            config,
            entry_cache,
            raw: MenuFileCache::new(),
            monitor,
            events,
            trees: FnvHashMap::default(),
            file_watches: FnvHashMap::default(),
        }
    }

    pub fn config(&self) -> &MenuConfig {
        &self.config
    }

    pub fn entry_cache(&self) -> &EntryCache {
        &self.entry_cache
    }

    pub fn raw(&self) -> &MenuFileCache {
        &self.raw
    }

    /// Resolves the menu file called `name`, searching the menu directories
    /// in order.
    pub fn lookup(&mut self, name: &str) -> Result<Arc<DesktopEntryTree>> {
        if !self.trees.contains_key(name) {
            let location = self.locate(name)?;
            self.insert_tree(name.to_string(), Some(name.to_string()), location);
        }
        self.refresh(name)
    }

    /// Resolves an explicitly named menu file.
    pub fn lookup_file(&mut self, path: &Path) -> Result<Arc<DesktopEntryTree>> {
        let canonical = canonicalize_existing_path(path.to_path_buf());
        let key = canonical.to_string_lossy().into_owned();
        if !self.trees.contains_key(&key) {
            fs::metadata(&canonical).map_err(|error| MenuError::io(&canonical, error))?;
            let location = MenuLocation {
                menu_file: canonical,
                chain_to: None,
            };
            self.insert_tree(key.clone(), None, location);
        }
        self.refresh(&key)
    }

    /// Drains the changes recorded for `key` since the last call, reloading
    /// first if the tree is dirty.
    pub fn take_changes(&mut self, key: &str) -> Result<Vec<TreeChange>> {
        if self.trees.contains_key(key) {
            self.refresh(key)?;
        }
        Ok(self
            .trees
            .get_mut(key)
            .map(|entry| std::mem::take(&mut entry.pending))
            .unwrap_or_default())
    }

    /// Whether `key` will reload on its next lookup.
    pub fn is_dirty(&self, key: &str) -> bool {
        self.trees
            .get(key)
            .is_some_and(|entry| entry.dirty.load(Ordering::Acquire))
    }

    /// Override directory for the menu called `name`.
    pub fn override_dir(&self, name: &str) -> Option<PathBuf> {
        self.config.edits_dir(name)
    }

    /// Applies every queued watch event. Only invalidates; nothing is
    /// rebuilt here. Returns how many events were applied.
    pub fn process_events(&mut self) -> usize {
        let events: Vec<MonitorEvent> = self.events.try_iter().collect();
        for event in &events {
            self.apply_event(event);
        }
        events.len()
    }

    pub(super) fn apply_event(&mut self, event: &MonitorEvent) {
        self.entry_cache.handle_event(event);
        self.raw.invalidate_prefix(&event.path);

        let parent = event.path.parent();
        let file_name = event.path.file_name().and_then(|name| name.to_str());
        let in_menu_dir = parent.is_some_and(|parent| {
            self.config
                .menu_dirs()
                .iter()
                .any(|dir| canonicalize_existing_path(dir.clone()) == parent || dir == parent)
        });
        for (key, entry) in &self.trees {
            let touches_read_file = entry
                .read_files
                .iter()
                .any(|read| *read == event.path || Some(read.as_path()) == parent);
            let names_lookup = in_menu_dir
                && entry.lookup_name.is_some()
                && entry.lookup_name.as_deref() == file_name;
            if touches_read_file || names_lookup {
                log::debug!("{:?} on {} invalidated menu {key}", event.kind, event.path.display());
                entry.dirty.store(true, Ordering::Release);
            }
        }
    }

    pub(super) fn mark_dirty(&self, key: &str) {
        if let Some(entry) = self.trees.get(key) {
            entry.dirty.store(true, Ordering::Release);
        }
    }

    /// Finds `name` in the menu directories. I/O failures fall through to
    /// the next directory; only the last one is reported.
    pub(super) fn locate(&self, name: &str) -> Result<MenuLocation> {
        let user_dir = self.config.user_menu_dir();
        let mut menu_file = None;
        let mut chain_to = None;
        let mut last_error = MenuError::NotFound(PathBuf::from(name));
        for dir in self.config.menu_dirs() {
            let candidate = dir.join(name);
            match fs::metadata(&candidate) {
                Ok(metadata) if metadata.is_file() => {
                    let is_user = user_dir.as_deref() == Some(dir.as_path());
                    if menu_file.is_none() {
                        menu_file = Some(candidate.clone());
                    }
                    if !is_user && chain_to.is_none() {
                        chain_to = Some(candidate);
                    }
                }
                Ok(_) => last_error = MenuError::IsDirectory(candidate),
                Err(error) => last_error = MenuError::io(&candidate, error),
            }
            if menu_file.is_some() && chain_to.is_some() {
                break;
            }
        }
        match menu_file {
            Some(menu_file) => Ok(MenuLocation {
                menu_file,
                chain_to,
            }),
            None => Err(last_error),
        }
    }

    fn insert_tree(&mut self, key: String, lookup_name: Option<String>, location: MenuLocation) {
        let entry = CachedTree {
            lookup_name,
            location,
            resolved: None,
            tree: None,
            error: None,
            pending: Vec::new(),
            dirty: Arc::new(AtomicBool::new(true)),
            subscriber: self.entry_cache.new_subscriber(),
            read_files: Vec::new(),
        };
        self.trees.insert(key, entry);
    }

    /// Returns the current tree for `key`, reloading it first when dirty.
    fn refresh(&mut self, key: &str) -> Result<Arc<DesktopEntryTree>> {
        let Some(mut entry) = self.trees.remove(key) else {
            return Err(MenuError::NotFound(PathBuf::from(key)));
        };
        if entry.dirty.swap(false, Ordering::AcqRel) {
            self.reload(key, &mut entry);
        }
        let result = match (&entry.error, &entry.tree) {
            (Some(error), _) => Err(error.clone()),
            (None, Some(tree)) => Ok(tree.clone()),
            (None, None) => Err(MenuError::Internal(format!("menu {key} was never loaded"))),
        };
        self.trees.insert(key.to_string(), entry);
        result
    }

    fn reload(&mut self, key: &str, entry: &mut CachedTree) {
        let started = Instant::now();
        if let Some(name) = &entry.lookup_name {
            match self.locate(name) {
                Ok(location) => entry.location = location,
                Err(error) => {
                    log::warn!("menu {name} is no longer available: {error}");
                    entry.error = Some(error);
                    return;
                }
            }
        }
        let menu_file = entry.location.menu_file.clone();

        let loaded = self.load_resolved(&menu_file);
        let (resolved, read_files) = match loaded {
            Ok(loaded) => loaded,
            Err(error) => {
                log::warn!("failed to load menu {}: {error}", menu_file.display());
                entry.error = Some(error);
                entry.read_files = vec![canonicalize_existing_path(menu_file)];
                self.watch_files(&entry.read_files);
                return;
            }
        };
        let (resolved, tree) = resolved;

        if let Some(previous) = &entry.tree {
            entry.pending.extend(diff_trees(previous, &tree));
        }
        entry.error = None;
        entry.tree = Some(Arc::new(tree));
        // New claims are in place, so dropping the old tree only releases
        // directories nothing uses anymore.
        entry.resolved = Some(resolved);
        self.entry_cache.prune_unused();

        self.entry_cache.unsubscribe_owner(entry.subscriber);
        if let Some(tree) = &entry.tree {
            for &dir in tree.dir_ids() {
                let dirty = entry.dirty.clone();
                self.entry_cache.subscribe(
                    dir,
                    entry.subscriber,
                    Arc::new(move |_: &Path| dirty.store(true, Ordering::Release)),
                );
            }
        }
        entry.read_files = read_files;
        self.watch_files(&entry.read_files);
        self.watch_files(&self.config.menu_dirs());

        log::info!(
            "loaded menu {key} from {} in {:?}",
            menu_file.display(),
            started.elapsed()
        );
    }

    #[allow(clippy::type_complexity)]
    fn load_resolved(&self, menu_file: &Path) -> Result<((MenuTree, DesktopEntryTree), Vec<PathBuf>)> {
        if detect_dialect(menu_file)? == MenuDialect::Legacy {
            return Err(MenuError::UnknownRootElement {
                path: menu_file.to_path_buf(),
                element: "VFolderInfo".to_string(),
            });
        }
        let ctx = ResolveContext {
            config: &self.config,
            raw: &self.raw,
            entry_cache: &self.entry_cache,
        };
        let mut resolved = resolve_file(&ctx, menu_file)?;
        let tree = materialize(&mut resolved.tree, &self.entry_cache);
        Ok(((resolved.tree, tree), resolved.read_files))
    }

    fn watch_files(&mut self, paths: &[PathBuf]) {
        for path in paths {
            if self.file_watches.contains_key(path) || !path.exists() {
                continue;
            }
            match self.monitor.watch(path) {
                Ok(id) => {
                    self.file_watches.insert(path.clone(), id);
                }
                Err(error) => log::debug!("not watching {}: {error}", path.display()),
            }
        }
    }
}

impl Drop for DesktopEntryTreeCache {
    fn drop(&mut self) {
        for (_, id) in self.file_watches.drain() {
            self.monitor.cancel(id);
        }
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::monitor::{ChangeKind, ManualMonitor};
    use tempfile::TempDir;

    pub(crate) struct Fixture {
        pub(crate) temp: TempDir,
        pub(crate) monitor: Arc<ManualMonitor>,
        pub(crate) cache: DesktopEntryTreeCache,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let temp = TempDir::new().expect("tempdir");
            let user_config = temp.path().join("home/config");
            let system_config = temp.path().join("etc/xdg");
            let user_data = temp.path().join("home/data");
            let system_data = temp.path().join("usr/share");
            for dir in [&user_config, &system_config] {
                fs::create_dir_all(dir.join("menus")).expect("menus dir");
            }
            for dir in [&user_data, &system_data] {
                fs::create_dir_all(dir.join("applications")).expect("apps dir");
            }
            let config = MenuConfig::with_dirs(
                vec![user_config, system_config],
                vec![user_data, system_data],
            );
            let (sender, receiver) = monitor_channel();
            let monitor = Arc::new(ManualMonitor::new(sender));
            let cache = DesktopEntryTreeCache::with_monitor(config, monitor.clone(), receiver);
            Self {
                temp,
                monitor,
                cache,
            }
        }

        pub(crate) fn path(&self, relative: &str) -> PathBuf {
            self.temp.path().join(relative)
        }

        pub(crate) fn write(&self, relative: &str, contents: &str) -> PathBuf {
            let path = self.path(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("parent dir");
            }
            fs::write(&path, contents).expect("write file");
            path
        }

        pub(crate) fn write_app(&self, relative: &str, categories: &str) -> PathBuf {
            self.write(
                relative,
                &format!("[Desktop Entry]\nType=Application\nName=App\nCategories={categories}\n"),
            )
        }
    }

    pub(crate) const SYSTEM_MENU: &str = "<Menu><Name>Applications</Name>\
        <DefaultAppDirs/><DefaultDirectoryDirs/>\
        <Menu><Name>Games</Name><Include><Category>Game</Category></Include></Menu>\
        <Menu><Name>Other</Name><OnlyUnallocated/><Include><All/></Include></Menu>\
        </Menu>";

    #[test]
    fn lookup_searches_menu_dirs_and_chains_to_system_copy() {
        let fixture = Fixture::new();
        fixture.write("etc/xdg/menus/applications.menu", SYSTEM_MENU);
        fixture.write_app("usr/share/applications/chess.desktop", "Game;");
        fixture.write_app("usr/share/applications/editor.desktop", "Utility;");

        let mut cache = fixture.cache;
        let tree = cache.lookup("applications.menu").expect("lookup");
        let games = tree.lookup("Games").expect("Games");
        assert!(tree.find_entry(games, "chess.desktop").is_some());
        let other = tree.lookup("Other").expect("Other");
        assert!(tree.find_entry(other, "editor.desktop").is_some());
        assert!(tree.find_entry(other, "chess.desktop").is_none());

        let location = cache.locate("applications.menu").expect("locate");
        assert_eq!(location.chain_to, Some(location.menu_file.clone()));
        assert!(cache.take_changes("applications.menu").expect("changes").is_empty());
    }

    #[test]
    fn missing_menu_reports_last_failure() {
        let fixture = Fixture::new();
        let mut cache = fixture.cache;
        match cache.lookup("nothing.menu") {
            Err(MenuError::NotFound(path)) => assert!(path.ends_with("etc/xdg/menus/nothing.menu")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn lookup_file_rejects_legacy_dialect_and_missing_files() {
        let fixture = Fixture::new();
        let legacy = fixture.write("legacy.menu", "<VFolderInfo></VFolderInfo>");
        let mut cache = fixture.cache;
        assert!(matches!(
            cache.lookup_file(&legacy),
            Err(MenuError::UnknownRootElement { .. })
        ));
        assert!(cache.lookup_file(&fixture.temp.path().join("absent.menu")).unwrap_err().is_io());
    }

    #[test]
    fn watch_events_only_mark_dirty_and_next_lookup_diffs() {
        let fixture = Fixture::new();
        fixture.write("etc/xdg/menus/applications.menu", SYSTEM_MENU);
        fixture.write_app("usr/share/applications/chess.desktop", "Game;");
        let Fixture {
            temp,
            monitor,
            mut cache,
        } = fixture;
        let apps = temp.path().join("usr/share/applications");

        cache.lookup("applications.menu").expect("first lookup");
        assert!(monitor.is_watched(&canonicalize_existing_path(apps.clone())));

        fs::write(
            apps.join("tetris.desktop"),
            "[Desktop Entry]\nName=Tetris\nCategories=Game;\n",
        )
        .expect("write new entry");
        monitor.emit(canonicalize_existing_path(apps.join("tetris.desktop")), ChangeKind::Created);
        assert_eq!(cache.process_events(), 1);
        assert!(cache.is_dirty("applications.menu"));

        let changes = cache.take_changes("applications.menu").expect("changes");
        assert_eq!(
            changes,
            vec![TreeChange {
                kind: ChangeKind::Created,
                path: "Games/tetris.desktop".to_string(),
                is_dir: false,
            }]
        );
        assert!(!cache.is_dirty("applications.menu"));
    }

    #[test]
    fn editing_a_merged_file_reloads() {
        let fixture = Fixture::new();
        let main = fixture.write(
            "etc/xdg/menus/applications.menu",
            "<Menu><Name>Applications</Name><MergeFile>extra.menu</MergeFile></Menu>",
        );
        let extra = fixture.write(
            "etc/xdg/menus/extra.menu",
            "<Menu><Name>x</Name><Menu><Name>One</Name></Menu></Menu>",
        );
        let mut cache = fixture.cache;
        let tree = cache.lookup_file(&main).expect("lookup");
        assert!(tree.lookup("One").is_some());

        fs::write(&extra, "<Menu><Name>x</Name><Menu><Name>Two</Name></Menu></Menu>")
            .expect("rewrite extra");
        fixture
            .monitor
            .emit(canonicalize_existing_path(extra), ChangeKind::Changed);
        cache.process_events();
        let key = canonicalize_existing_path(main).to_string_lossy().into_owned();
        let changes = cache.take_changes(&key).expect("changes");
        let kinds: Vec<_> = changes.iter().map(|c| (c.kind, c.path.as_str())).collect();
        assert_eq!(
            kinds,
            vec![(ChangeKind::Deleted, "One"), (ChangeKind::Created, "Two")]
        );
    }
}
