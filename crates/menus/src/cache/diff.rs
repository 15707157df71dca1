//! Tree-shaped diff between two materializations.

use std::cmp::Ordering;

use crate::monitor::ChangeKind;
use crate::node::NodeId;
use crate::resolve::DesktopEntryTree;

/// One created or deleted entry or folder, addressed by its `/`-separated
/// path below the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChange {
    pub kind: ChangeKind,
    pub path: String,
    pub is_dir: bool,
}

impl TreeChange {
    fn new(kind: ChangeKind, path: String, is_dir: bool) -> Self {
        Self { kind, path, is_dir }
    }
}

/// Changes turning `old` into `new`. Entries are compared by name and
/// folders by name at every level; created and deleted folders report
/// their contents too.
pub fn diff_trees(old: &DesktopEntryTree, new: &DesktopEntryTree) -> Vec<TreeChange> {
    let mut out = Vec::new();
    match (old.root(), new.root()) {
        (Some(old_root), Some(new_root)) => diff_folder(old, old_root, new, new_root, "", &mut out),
        (Some(old_root), None) => report_contents(old, old_root, "", ChangeKind::Deleted, &mut out),
        (None, Some(new_root)) => report_contents(new, new_root, "", ChangeKind::Created, &mut out),
        (None, None) => {}
    }
    out
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn entry_names(tree: &DesktopEntryTree, folder: NodeId) -> Vec<&str> {
    let mut names: Vec<&str> = tree.node(folder).entries().iter().map(|entry| entry.name()).collect();
    names.sort_unstable();
    names.dedup();
    names
}

fn subfolders(tree: &DesktopEntryTree, folder: NodeId) -> Vec<(&str, NodeId)> {
    let mut folders: Vec<(&str, NodeId)> = tree
        .node(folder)
        .children()
        .iter()
        .map(|&child| (tree.node(child).name(), child))
        .collect();
    folders.sort_by(|a, b| a.0.cmp(b.0));
    folders.dedup_by(|a, b| a.0 == b.0);
    folders
}

/// Position of a name in a sorted merge of two listings.
enum Side<T> {
    Old(T),
    New(T),
    Both(T, T),
}

/// Walks two name-sorted lists in step.
fn merge_sorted<'a, T: Copy>(old: &[(&'a str, T)], new: &[(&'a str, T)]) -> Vec<(&'a str, Side<T>)> {
    let mut out = Vec::with_capacity(old.len().max(new.len()));
    let (mut i, mut j) = (0, 0);
    while i < old.len() || j < new.len() {
        let order = match (old.get(i), new.get(j)) {
            (Some(a), Some(b)) => a.0.cmp(b.0),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };
        match order {
            Ordering::Less => {
                out.push((old[i].0, Side::Old(old[i].1)));
                i += 1;
            }
            Ordering::Greater => {
                out.push((new[j].0, Side::New(new[j].1)));
                j += 1;
            }
            Ordering::Equal => {
                out.push((old[i].0, Side::Both(old[i].1, new[j].1)));
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn diff_folder(
    old: &DesktopEntryTree,
    old_id: NodeId,
    new: &DesktopEntryTree,
    new_id: NodeId,
    prefix: &str,
    out: &mut Vec<TreeChange>,
) {
    let old_entries: Vec<(&str, ())> = entry_names(old, old_id).into_iter().map(|n| (n, ())).collect();
    let new_entries: Vec<(&str, ())> = entry_names(new, new_id).into_iter().map(|n| (n, ())).collect();
    for (name, side) in merge_sorted(&old_entries, &new_entries) {
        match side {
            Side::Old(()) => out.push(TreeChange::new(ChangeKind::Deleted, join(prefix, name), false)),
            Side::New(()) => out.push(TreeChange::new(ChangeKind::Created, join(prefix, name), false)),
            Side::Both((), ()) => {}
        }
    }

    let old_folders = subfolders(old, old_id);
    let new_folders = subfolders(new, new_id);
    for (name, side) in merge_sorted(&old_folders, &new_folders) {
        let path = join(prefix, name);
        match side {
            Side::Old(id) => {
                out.push(TreeChange::new(ChangeKind::Deleted, path.clone(), true));
                report_contents(old, id, &path, ChangeKind::Deleted, out);
            }
            Side::New(id) => {
                out.push(TreeChange::new(ChangeKind::Created, path.clone(), true));
                report_contents(new, id, &path, ChangeKind::Created, out);
            }
            Side::Both(a, b) => diff_folder(old, a, new, b, &path, out),
        }
    }
}

/// Reports everything below `folder` (not the folder itself) as `kind`.
fn report_contents(
    tree: &DesktopEntryTree,
    folder: NodeId,
    prefix: &str,
    kind: ChangeKind,
    out: &mut Vec<TreeChange>,
) {
    for name in entry_names(tree, folder) {
        out.push(TreeChange::new(kind, join(prefix, name), false));
    }
    for (name, child) in subfolders(tree, folder) {
        let path = join(prefix, name);
        out.push(TreeChange::new(kind, path.clone(), true));
        report_contents(tree, child, &path, kind, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryCache;
    use crate::parser::parse_str;
    use crate::resolve::materialize;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn build(text: &str, cache: &EntryCache) -> DesktopEntryTree {
        let mut menu = parse_str(text, Path::new("/")).expect("parse");
        materialize(&mut menu, cache)
    }

    #[test]
    fn gained_folder_reports_one_dir_created() {
        let cache = EntryCache::new(None);
        let old = build(
            "<Menu><Name>Top</Name><Menu><Name>X</Name></Menu><Menu><Name>Z</Name></Menu></Menu>",
            &cache,
        );
        let new = build(
            "<Menu><Name>Top</Name><Menu><Name>X</Name><Menu><Name>Y</Name></Menu></Menu>\
             <Menu><Name>Z</Name></Menu></Menu>",
            &cache,
        );
        let changes = diff_trees(&old, &new);
        assert_eq!(
            changes,
            vec![TreeChange::new(ChangeKind::Created, "X/Y".to_string(), true)]
        );
    }

    #[test]
    fn entry_and_folder_removal() {
        let apps = TempDir::new().expect("tempdir");
        fs::write(apps.path().join("a.desktop"), "[Desktop Entry]\nName=A\n").expect("write");
        fs::write(apps.path().join("b.desktop"), "[Desktop Entry]\nName=B\n").expect("write");
        let cache = EntryCache::new(None);
        let dir = apps.path().display();
        let old = build(
            &format!(
                "<Menu><Name>Top</Name><AppDir>{dir}</AppDir>\
                 <Include><Filename>a.desktop</Filename><Filename>b.desktop</Filename></Include>\
                 <Menu><Name>Gone</Name><Include><Filename>a.desktop</Filename></Include></Menu></Menu>"
            ),
            &cache,
        );
        let new = build(
            &format!(
                "<Menu><Name>Top</Name><AppDir>{dir}</AppDir>\
                 <Include><Filename>a.desktop</Filename></Include></Menu>"
            ),
            &cache,
        );
        let changes = diff_trees(&old, &new);
        assert_eq!(
            changes,
            vec![
                TreeChange::new(ChangeKind::Deleted, "b.desktop".to_string(), false),
                TreeChange::new(ChangeKind::Deleted, "Gone".to_string(), true),
                TreeChange::new(ChangeKind::Deleted, "Gone/a.desktop".to_string(), false),
            ]
        );
        assert!(diff_trees(&new, &new).is_empty());
    }
}
