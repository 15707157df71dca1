use std::path::{Path, PathBuf};

use super::atoms::Atom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A `.desktop` application entry.
    Desktop,
    /// A `.directory` folder description.
    Directory,
}

impl EntryKind {
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".desktop") {
            Some(Self::Desktop)
        } else if name.ends_with(".directory") {
            Some(Self::Directory)
        } else {
            None
        }
    }
}

/// One parsed desktop or directory file.
///
/// `relative_path` is the key used for deduplication and `<Filename>`
/// matching; it is relative to whatever search root produced the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    relative_path: String,
    path: PathBuf,
    kind: EntryKind,
    categories: Vec<Atom>,
    no_display: bool,
}

impl Entry {
    pub fn new(
        relative_path: impl Into<String>,
        path: impl Into<PathBuf>,
        kind: EntryKind,
        categories: Vec<Atom>,
        no_display: bool,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            path: path.into(),
            kind,
            categories,
            no_display,
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// On-disk file name, the name shown inside a folder.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.relative_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn categories(&self) -> &[Atom] {
        &self.categories
    }

    pub fn no_display(&self) -> bool {
        self.no_display
    }

    pub fn has_category_atom(&self, atom: Atom) -> bool {
        !atom.is_unknown() && self.categories.contains(&atom)
    }

    /// Copy under a different relative path, optionally tagged with one more
    /// category.
    pub fn relocated(&self, relative_path: impl Into<String>, extra: Option<Atom>) -> Self {
        let mut copy = self.clone();
        copy.relative_path = relative_path.into();
        if let Some(atom) = extra {
            if !copy.categories.contains(&atom) {
                copy.categories.push(atom);
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_suffix() {
        assert_eq!(EntryKind::from_file_name("a.desktop"), Some(EntryKind::Desktop));
        assert_eq!(EntryKind::from_file_name("a.directory"), Some(EntryKind::Directory));
        assert_eq!(EntryKind::from_file_name("a.txt"), None);
    }

    #[test]
    fn relocated_copy_adds_category_once() {
        let mut atoms = crate::entry::CategoryAtoms::new();
        let game = atoms.intern("Game");
        let legacy = atoms.intern("Legacy");
        let entry = Entry::new("x.desktop", "/apps/x.desktop", EntryKind::Desktop, vec![game], false);

        let copy = entry.relocated("kde-x.desktop", Some(legacy));
        assert_eq!(copy.relative_path(), "kde-x.desktop");
        assert!(copy.has_category_atom(legacy));
        assert_eq!(copy.relocated("y", Some(legacy)).categories().len(), 2);
        assert!(!entry.has_category_atom(Atom::UNKNOWN));
        let nested = Entry::new("kde-b.desktop", "/applnk/A/b.desktop", EntryKind::Desktop, vec![], false);
        assert_eq!(nested.name(), "b.desktop");
    }
}
