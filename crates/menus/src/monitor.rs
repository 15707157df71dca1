//! Filesystem change monitoring.
//!
//! Watches feed `MonitorEvent`s into a crossbeam channel. Nothing reacts
//! inside a watch callback; the owner of the receiving end drains the
//! channel when it next needs fresh data.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use fnv::FnvHashMap;
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{MenuError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Deleted,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl MonitorEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// The one capability needed from the environment.
pub trait FileMonitor: Send + Sync {
    /// Starts delivering events for `path` (non-recursive).
    fn watch(&self, path: &Path) -> Result<WatchId>;

    fn cancel(&self, id: WatchId);
}

pub fn monitor_channel() -> (Sender<MonitorEvent>, Receiver<MonitorEvent>) {
    crossbeam_channel::unbounded()
}

fn next_watch_id(counter: &AtomicU64) -> WatchId {
    WatchId(counter.fetch_add(1, Ordering::Relaxed))
}

/// Accepts every watch and never reports anything.
#[derive(Debug, Default)]
pub struct NullMonitor {
    next_id: AtomicU64,
}

impl NullMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileMonitor for NullMonitor {
    fn watch(&self, _path: &Path) -> Result<WatchId> {
        Ok(next_watch_id(&self.next_id))
    }

    fn cancel(&self, _id: WatchId) {}
}

/// OS-backed monitor built on `notify`.
pub struct NotifyMonitor {
    watcher: Mutex<RecommendedWatcher>,
    state: Mutex<WatchTable>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct WatchTable {
    paths: FnvHashMap<WatchId, PathBuf>,
    /// Watches per path; the OS watch goes away with the last one.
    counts: FnvHashMap<PathBuf, usize>,
}

impl NotifyMonitor {
    pub fn new(sender: Sender<MonitorEvent>) -> Result<Self> {
        let watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
            match event_result {
                Ok(event) => forward_notify_event(&sender, event),
                Err(error) => log::warn!("filesystem watcher error: {error}"),
            }
        })
        .map_err(|error| {
            MenuError::Internal(format!("failed to create filesystem watcher: {error}"))
        })?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            state: Mutex::new(WatchTable::default()),
            next_id: AtomicU64::new(0),
        })
    }
}

impl FileMonitor for NotifyMonitor {
    fn watch(&self, path: &Path) -> Result<WatchId> {
        let mut state = self.state.lock();
        let count = state.counts.get(path).copied().unwrap_or(0);
        if count == 0 {
            self.watcher
                .lock()
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|error| {
                    MenuError::Internal(format!("failed to watch {}: {error}", path.display()))
                })?;
        }
        state.counts.insert(path.to_path_buf(), count + 1);
        let id = next_watch_id(&self.next_id);
        state.paths.insert(id, path.to_path_buf());
        Ok(id)
    }

    fn cancel(&self, id: WatchId) {
        let mut state = self.state.lock();
        let Some(path) = state.paths.remove(&id) else {
            return;
        };
        let remaining = match state.counts.get_mut(&path) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            state.counts.remove(&path);
            if let Err(error) = self.watcher.lock().unwatch(&path) {
                log::debug!("failed to unwatch {}: {error}", path.display());
            }
        }
    }
}

fn forward_notify_event(sender: &Sender<MonitorEvent>, event: Event) {
    let kind = match event.kind {
        EventKind::Access(_) => return,
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => ChangeKind::Changed,
    };
    for path in event.paths {
        // A closed receiver means the owning cache is gone.
        let _ = sender.send(MonitorEvent { path, kind });
    }
}

/// Deterministic monitor for tests: records watches, emits on request.
pub struct ManualMonitor {
    sender: Sender<MonitorEvent>,
    watches: Mutex<FnvHashMap<WatchId, PathBuf>>,
    next_id: AtomicU64,
}

impl ManualMonitor {
    pub fn new(sender: Sender<MonitorEvent>) -> Self {
        Self {
            sender,
            watches: Mutex::new(FnvHashMap::default()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Currently watched paths, sorted.
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.watches.lock().values().cloned().collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watches.lock().values().any(|watched| watched == path)
    }

    /// Queues an event as if the OS had reported it.
    pub fn emit(&self, path: impl Into<PathBuf>, kind: ChangeKind) {
        let _ = self.sender.send(MonitorEvent::new(path, kind));
    }
}

impl FileMonitor for ManualMonitor {
    fn watch(&self, path: &Path) -> Result<WatchId> {
        let id = next_watch_id(&self.next_id);
        self.watches.lock().insert(id, path.to_path_buf());
        Ok(id)
    }

    fn cancel(&self, id: WatchId) {
        self.watches.lock().remove(&id);
    }
}
