use std::sync::Arc;

use crate::entry::Entry;

use super::entry_directory::EntryDirectory;
use super::set::EntrySet;

/// Directories in priority order: the first one wins a name collision.
#[derive(Debug, Default)]
pub struct EntryDirectoryList {
    dirs: Vec<EntryDirectory>,
}

impl EntryDirectoryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory below every existing one in priority.
    pub fn append(&mut self, dir: EntryDirectory) {
        self.dirs.push(dir);
    }

    /// Adds a directory above every existing one in priority.
    pub fn prepend(&mut self, dir: EntryDirectory) {
        self.dirs.insert(0, dir);
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntryDirectory> {
        self.dirs.iter()
    }

    pub fn get_desktop(&self, relative_path: &str) -> Option<Arc<Entry>> {
        self.dirs.iter().find_map(|dir| dir.get_desktop(relative_path))
    }

    pub fn get_directory(&self, relative_path: &str) -> Option<Arc<Entry>> {
        self.dirs.iter().find_map(|dir| dir.get_directory(relative_path))
    }

    /// Everything visible, lowest priority first so higher ones overwrite.
    pub fn get_all_desktops(&self) -> EntrySet {
        let mut set = EntrySet::new();
        for dir in self.dirs.iter().rev() {
            dir.get_all_desktops(&mut set);
        }
        set
    }

    pub fn get_all_directories(&self) -> EntrySet {
        let mut set = EntrySet::new();
        for dir in self.dirs.iter().rev() {
            dir.get_all_directories(&mut set);
        }
        set
    }

    /// Complement of `set` over everything visible in this list.
    pub fn invert_set(&self, set: &EntrySet) -> EntrySet {
        let mut inverted = set.clone();
        inverted.invert(self);
        inverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::LoadFlags;
    use crate::entry::EntryCache;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn higher_priority_directory_wins() {
        let temp = TempDir::new().expect("tempdir");
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a).expect("mkdir a");
        fs::create_dir_all(&b).expect("mkdir b");
        fs::write(a.join("foo.desktop"), "[Desktop Entry]\nCategories=Game;\n").expect("write");
        fs::write(b.join("foo.desktop"), "[Desktop Entry]\nCategories=Office;\n").expect("write");
        fs::write(b.join("only-b.desktop"), "[Desktop Entry]\n").expect("write");

        let cache = EntryCache::new(None);
        let mut list = EntryDirectoryList::new();
        list.append(EntryDirectory::load(&cache, &a, LoadFlags::INCLUDE_DESKTOPS, None));
        list.append(EntryDirectory::load(&cache, &b, LoadFlags::INCLUDE_DESKTOPS, None));

        let all = list.get_all_desktops();
        assert_eq!(all.len(), 2);
        let foo = all.get("foo.desktop").expect("foo");
        assert!(foo.path().starts_with(fs::canonicalize(&a).expect("canonical a")));
        assert!(cache.entry_has_category(foo, "Game"));
        assert!(!cache.entry_has_category(foo, "Office"));

        let single = list.get_desktop("foo.desktop").expect("lookup");
        assert!(Arc::ptr_eq(&single, foo));

        let mut only_foo = EntrySet::new();
        only_foo.insert(single);
        let inverted = list.invert_set(&only_foo);
        assert_eq!(inverted.keys().collect::<Vec<_>>(), vec!["only-b.desktop"]);
    }
}
