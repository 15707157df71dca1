//! Cache of parsed menu files keyed by canonical path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::Mutex;

use crate::error::{canonicalize_existing_path, Result};
use crate::node::MenuTree;
use crate::parser;

/// One parse per physical file, shared by every merge site. Failures are
/// cached too and handed out until the path is invalidated.
#[derive(Debug, Default)]
pub struct MenuFileCache {
    files: Mutex<FnvHashMap<PathBuf, Result<Arc<MenuTree>>>>,
}

impl MenuFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, path: &Path) -> Result<Arc<MenuTree>> {
        let canonical = canonicalize_existing_path(path.to_path_buf());
        if let Some(cached) = self.files.lock().get(&canonical) {
            log::debug!("menu cache hit for {}", canonical.display());
            return cached.clone();
        }
        log::debug!("menu cache miss for {}", canonical.display());
        let loaded = parser::parse_file(&canonical).map(Arc::new);
        self.files.lock().insert(canonical, loaded.clone());
        loaded
    }

    /// Drops every cached file at or below `prefix`, comparing whole path
    /// components. Returns how many were dropped.
    pub fn invalidate_prefix(&self, prefix: &Path) -> usize {
        let canonical = canonicalize_existing_path(prefix.to_path_buf());
        let mut files = self.files.lock();
        let before = files.len();
        files.retain(|path, _| !path.starts_with(&canonical) && !path.starts_with(prefix));
        let removed = before - files.len();
        if removed > 0 {
            log::debug!("invalidated {removed} cached menu files under {}", prefix.display());
        }
        removed
    }

    pub fn contains(&self, path: &Path) -> bool {
        let canonical = canonicalize_existing_path(path.to_path_buf());
        self.files.lock().contains_key(&canonical)
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    pub fn clear(&self) {
        self.files.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MENU: &str = "<Menu><Name>Apps</Name></Menu>";

    #[test]
    fn loads_once_and_shares() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("apps.menu");
        fs::write(&path, MENU).expect("write");

        let cache = MenuFileCache::new();
        let first = cache.load(&path).expect("load");
        let second = cache.load(&path).expect("load again");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_cached_until_invalidated() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("broken.menu");
        fs::write(&path, "<Menu><Name></Name></Menu>").expect("write");

        let cache = MenuFileCache::new();
        assert!(cache.load(&path).expect_err("broken").is_parse());

        fs::write(&path, MENU).expect("fix");
        assert!(cache.load(&path).is_err(), "cached failure is returned again");

        cache.invalidate_prefix(&path);
        assert!(cache.load(&path).is_ok());
    }

    #[test]
    fn prefix_invalidation_is_component_wise() {
        let temp = TempDir::new().expect("tempdir");
        let root = fs::canonicalize(temp.path()).expect("canonical");
        for dir in ["a/b", "a/bc", "a/c"] {
            fs::create_dir_all(root.join(dir)).expect("mkdir");
            fs::write(root.join(dir).join("x.menu"), MENU).expect("write");
        }
        let cache = MenuFileCache::new();
        for dir in ["a/b", "a/bc", "a/c"] {
            cache.load(&root.join(dir).join("x.menu")).expect("load");
        }

        assert_eq!(cache.invalidate_prefix(&root.join("a/b")), 1);
        assert!(!cache.contains(&root.join("a/b/x.menu")));
        assert!(cache.contains(&root.join("a/bc/x.menu")));
        assert!(cache.contains(&root.join("a/c/x.menu")));
    }
}
