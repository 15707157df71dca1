//! Turns a resolved menu tree into the concrete folder hierarchy.

use std::collections::HashSet;
use std::sync::Arc;

use crate::directory::{EntryDirectory, EntryDirectoryList, EntrySet, LoadFlags};
use crate::entry::{DirId, Entry, EntryCache};
use crate::node::{MenuTree, NodeArena, NodeId, NodeKind, NodeTag};

use super::query::QueryContext;

/// One folder of a [`DesktopEntryTree`].
#[derive(Debug, Clone)]
pub struct TreeNode {
    parent: Option<NodeId>,
    name: String,
    directory: Option<Arc<Entry>>,
    entries: Vec<Arc<Entry>>,
    children: Vec<NodeId>,
    only_unallocated: bool,
}

impl TreeNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The folder's `.directory` entry, if one was found.
    pub fn directory(&self) -> Option<&Arc<Entry>> {
        self.directory.as_ref()
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn only_unallocated(&self) -> bool {
        self.only_unallocated
    }
}

/// Materialized menu: named folders holding entries.
#[derive(Debug, Clone, Default)]
pub struct DesktopEntryTree {
    nodes: NodeArena<TreeNode>,
    root: Option<NodeId>,
    /// Cached directories the tree was built from.
    dir_ids: Vec<DirId>,
}

impl DesktopEntryTree {
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dir_ids(&self) -> &[DirId] {
        &self.dir_ids
    }

    /// Folder at a `/`-separated path below the root; `""` is the root.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root?;
        for component in path.split('/').filter(|part| !part.is_empty()) {
            current = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child].name == component)?;
        }
        Some(current)
    }

    /// Entry shown as `name` inside `folder`.
    pub fn find_entry(&self, folder: NodeId, name: &str) -> Option<&Arc<Entry>> {
        self.nodes
            .get(folder)?
            .entries
            .iter()
            .find(|entry| entry.name() == name)
    }

    /// `/`-separated path of `folder` below the root; the root is `""`.
    pub fn folder_path(&self, folder: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(folder);
        while let Some(id) = current {
            let node = &self.nodes[id];
            if node.parent.is_some() {
                parts.push(node.name.as_str());
            }
            current = node.parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Removes `folder` and everything below it.
    pub fn free(&mut self, folder: NodeId) {
        let Some(parent) = self.nodes.get(folder).map(|node| node.parent) else {
            return;
        };
        match parent {
            Some(parent) => self.nodes[parent].children.retain(|&child| child != folder),
            None => self.root = None,
        }
        let mut stack = vec![folder];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.try_remove(id) {
                stack.extend(node.children);
            }
        }
    }

    fn add_folder(&mut self, parent: Option<NodeId>, node: TreeNode) -> NodeId {
        let id = self.nodes.insert(node);
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.root = Some(id),
        }
        id
    }
}

/// Builds the folder hierarchy for the top menu of an already resolved
/// `tree`. Directory lists are computed and cached on the menu nodes, which
/// keeps their directory claims alive for as long as `tree` lives.
pub fn materialize(tree: &mut MenuTree, cache: &EntryCache) -> DesktopEntryTree {
    let mut out = DesktopEntryTree::default();
    let Some(top) = tree.top_menu() else {
        return out;
    };
    compute_directory_lists(tree, top, cache);
    out.dir_ids = collect_dir_ids(tree, top);

    let mut builder = Builder {
        tree,
        cache,
        out,
        allocated: HashSet::new(),
        deferred: Vec::new(),
    };
    builder.build_folder(top, None);
    builder.distribute_unallocated();
    builder.out
}

fn compute_directory_lists(tree: &mut MenuTree, menu: NodeId, cache: &EntryCache) {
    let parent_lists = tree
        .parent(menu)
        .and_then(|parent| tree.menu_data(parent))
        .map(|data| (data.app_dirs.clone(), data.directory_dirs.clone()));
    let (inherited_apps, inherited_dirs) = parent_lists.unwrap_or((None, None));

    let needs_apps = tree.menu_data(menu).is_some_and(|data| data.app_dirs.is_none());
    if needs_apps {
        let own = build_list(tree, menu, cache, NodeTag::AppDir);
        let list = own.or(inherited_apps).unwrap_or_default();
        if let Some(data) = tree.menu_data_mut(menu) {
            data.app_dirs = Some(list);
        }
    }
    let needs_dirs = tree
        .menu_data(menu)
        .is_some_and(|data| data.directory_dirs.is_none());
    if needs_dirs {
        let own = build_list(tree, menu, cache, NodeTag::DirectoryDir);
        let list = own.or(inherited_dirs).unwrap_or_default();
        if let Some(data) = tree.menu_data_mut(menu) {
            data.directory_dirs = Some(list);
        }
    }

    for child in tree.child_ids(menu) {
        if tree.tag(child) == NodeTag::Menu {
            compute_directory_lists(tree, child, cache);
        }
    }
}

/// The menu's own directories of kind `tag`, later declarations first.
/// `None` when the menu declares none and should inherit.
fn build_list(
    tree: &MenuTree,
    menu: NodeId,
    cache: &EntryCache,
    tag: NodeTag,
) -> Option<Arc<EntryDirectoryList>> {
    let declared: Vec<NodeId> = tree
        .children(menu)
        .filter(|&child| tree.tag(child) == tag)
        .collect();
    if declared.is_empty() {
        return None;
    }
    let mut list = EntryDirectoryList::new();
    for &id in declared.iter().rev() {
        let Some(path) = tree.content_as_path(id) else {
            continue;
        };
        let (flags, prefix) = match tree.kind(id) {
            NodeKind::AppDir { legacy: Some(tag) } => (
                LoadFlags::LEGACY | LoadFlags::INCLUDE_DESKTOPS,
                tag.prefix.clone(),
            ),
            NodeKind::AppDir { legacy: None } => (LoadFlags::INCLUDE_DESKTOPS, None),
            _ => (LoadFlags::INCLUDE_DIRECTORIES, None),
        };
        list.append(EntryDirectory::load(cache, &path, flags, prefix));
    }
    Some(Arc::new(list))
}

fn collect_dir_ids(tree: &MenuTree, top: NodeId) -> Vec<DirId> {
    let mut ids = Vec::new();
    for id in tree.descendants(top) {
        let Some(data) = tree.menu_data(id) else {
            continue;
        };
        for list in [&data.app_dirs, &data.directory_dirs].into_iter().flatten() {
            for dir in list.iter() {
                if !ids.contains(&dir.dir_id()) {
                    ids.push(dir.dir_id());
                }
            }
        }
    }
    ids
}

struct Builder<'a> {
    tree: &'a MenuTree,
    cache: &'a EntryCache,
    out: DesktopEntryTree,
    /// Relative paths claimed by ordinary folders.
    allocated: HashSet<String>,
    /// Only-unallocated folders in post-order.
    deferred: Vec<NodeId>,
}

#[derive(Default)]
struct MenuFlags {
    deleted: bool,
    only_unallocated: bool,
    directory: Option<Arc<Entry>>,
    entries: EntrySet,
}

impl Builder<'_> {
    fn build_folder(&mut self, menu: NodeId, parent: Option<NodeId>) {
        let flags = self.evaluate_menu(menu);
        let hidden = flags.deleted || flags.directory.as_ref().is_some_and(|dir| dir.no_display());

        if !flags.only_unallocated {
            self.allocated
                .extend(flags.entries.keys().map(str::to_string));
        }
        let only_unallocated = flags.only_unallocated;
        let folder = self.out.add_folder(
            parent,
            TreeNode {
                parent,
                name: self.tree.menu_name(menu).unwrap_or_default().to_string(),
                directory: flags.directory,
                entries: flags.entries.into_entries(),
                children: Vec::new(),
                only_unallocated,
            },
        );

        // Suppressed folders are still walked so their claims count.
        let tree = self.tree;
        for child in tree.children(menu) {
            if tree.tag(child) == NodeTag::Menu {
                self.build_folder(child, Some(folder));
            }
        }

        if hidden {
            log::debug!("discarding hidden menu {:?}", tree.menu_name(menu));
            self.out.free(folder);
            let nodes = &self.out.nodes;
            self.deferred.retain(|&id| nodes.contains(id));
        } else if only_unallocated {
            self.deferred.push(folder);
        }
    }

    fn evaluate_menu(&self, menu: NodeId) -> MenuFlags {
        let mut flags = MenuFlags::default();
        let Some(data) = self.tree.menu_data(menu) else {
            return flags;
        };
        let apps = data.app_dirs.clone().unwrap_or_default();
        let dirs = data.directory_dirs.clone().unwrap_or_default();
        let query = QueryContext::new(self.tree, &apps, self.cache);

        for child in self.tree.children(menu) {
            match self.tree.tag(child) {
                NodeTag::Include => flags.entries.union(&query.evaluate_children(child)),
                NodeTag::Exclude => flags.entries.subtract(&query.evaluate_children(child)),
                NodeTag::Directory => {
                    let found = self
                        .tree
                        .content(child)
                        .and_then(|name| dirs.get_directory(name));
                    if found.is_some() {
                        flags.directory = found;
                    }
                }
                NodeTag::Deleted => flags.deleted = true,
                NodeTag::NotDeleted => flags.deleted = false,
                NodeTag::OnlyUnallocated => flags.only_unallocated = true,
                NodeTag::NotOnlyUnallocated => flags.only_unallocated = false,
                _ => {}
            }
        }
        flags
    }

    fn distribute_unallocated(&mut self) {
        for folder in std::mem::take(&mut self.deferred) {
            let Some(node) = self.out.nodes.get_mut(folder) else {
                continue;
            };
            let allocated = &self.allocated;
            node.entries
                .retain(|entry| !allocated.contains(entry.relative_path()));
            let empty = node.entries.is_empty() && node.children.is_empty();
            if empty && node.parent.is_some() {
                self.out.free(folder);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_entry(dir: &Path, name: &str, categories: &str) {
        fs::write(
            dir.join(name),
            format!("[Desktop Entry]\nName={name}\nCategories={categories}\n"),
        )
        .expect("write entry");
    }

    fn names(tree: &DesktopEntryTree, folder: NodeId) -> Vec<String> {
        tree.node(folder)
            .entries()
            .iter()
            .map(|entry| entry.name().to_string())
            .collect()
    }

    #[test]
    fn only_unallocated_skips_claimed_entries() {
        let apps = TempDir::new().expect("tempdir");
        write_entry(apps.path(), "editor.desktop", "Utility;");
        write_entry(apps.path(), "clock.desktop", "Utility;");

        let text = format!(
            "<Menu><Name>Top</Name><AppDir>{}</AppDir>\
             <Menu><Name>Other</Name><OnlyUnallocated/><Include><Category>Utility</Category></Include></Menu>\
             <Menu><Name>Editors</Name><Include><Filename>editor.desktop</Filename></Include></Menu>\
             </Menu>",
            apps.path().display()
        );
        let mut menu = parse_str(&text, Path::new("/")).expect("parse");
        let cache = EntryCache::new(None);
        let tree = materialize(&mut menu, &cache);

        let other = tree.lookup("Other").expect("Other");
        assert_eq!(names(&tree, other), vec!["clock.desktop"]);
        let editors = tree.lookup("Editors").expect("Editors");
        assert_eq!(names(&tree, editors), vec!["editor.desktop"]);
        assert!(tree.node(other).only_unallocated());
    }

    #[test]
    fn two_unallocated_folders_both_keep_a_shared_entry() {
        let apps = TempDir::new().expect("tempdir");
        write_entry(apps.path(), "clock.desktop", "Utility;");
        write_entry(apps.path(), "editor.desktop", "Utility;");
        let text = format!(
            "<Menu><Name>Top</Name><AppDir>{}</AppDir>\
             <Menu><Name>Other</Name><OnlyUnallocated/><Include><All/></Include></Menu>\
             <Menu><Name>Tools</Name><OnlyUnallocated/><Include><Category>Utility</Category></Include></Menu>\
             <Menu><Name>Editors</Name><Include><Filename>editor.desktop</Filename></Include></Menu>\
             </Menu>",
            apps.path().display()
        );
        let mut menu = parse_str(&text, Path::new("/")).expect("parse");
        let tree = materialize(&mut menu, &EntryCache::new(None));

        let other = tree.lookup("Other").expect("Other");
        let tools = tree.lookup("Tools").expect("Tools");
        assert_eq!(names(&tree, other), vec!["clock.desktop"]);
        assert_eq!(names(&tree, tools), vec!["clock.desktop"]);
    }

    #[test]
    fn empty_unallocated_folder_is_dropped() {
        let apps = TempDir::new().expect("tempdir");
        write_entry(apps.path(), "editor.desktop", "Utility;");
        let text = format!(
            "<Menu><Name>Top</Name><AppDir>{}</AppDir>\
             <Menu><Name>Other</Name><OnlyUnallocated/><Include><All/></Include></Menu>\
             <Menu><Name>All</Name><Include><All/></Include></Menu>\
             </Menu>",
            apps.path().display()
        );
        let mut menu = parse_str(&text, Path::new("/")).expect("parse");
        let tree = materialize(&mut menu, &EntryCache::new(None));
        assert!(tree.lookup("Other").is_none());
        assert!(tree.lookup("All").is_some());
    }

    #[test]
    fn deleted_and_excluded() {
        let apps = TempDir::new().expect("tempdir");
        write_entry(apps.path(), "a.desktop", "Game;");
        write_entry(apps.path(), "b.desktop", "Game;");
        let text = format!(
            "<Menu><Name>Top</Name><AppDir>{}</AppDir>\
             <Menu><Name>Games</Name><Include><Category>Game</Category></Include>\
               <Exclude><Filename>b.desktop</Filename></Exclude></Menu>\
             <Menu><Name>Gone</Name><Include><All/></Include><Deleted/></Menu>\
             <Menu><Name>Back</Name><Deleted/><NotDeleted/></Menu>\
             </Menu>",
            apps.path().display()
        );
        let mut menu = parse_str(&text, Path::new("/")).expect("parse");
        let tree = materialize(&mut menu, &EntryCache::new(None));
        let games = tree.lookup("Games").expect("Games");
        assert_eq!(names(&tree, games), vec!["a.desktop"]);
        assert!(tree.lookup("Gone").is_none());
        assert!(tree.lookup("Back").is_some());
        assert_eq!(tree.folder_path(games), "Games");
    }

    #[test]
    fn submenus_inherit_directories_and_find_directory_entries() {
        let apps = TempDir::new().expect("tempdir");
        let dirs = TempDir::new().expect("tempdir");
        write_entry(apps.path(), "a.desktop", "Game;");
        fs::write(
            dirs.path().join("games.directory"),
            "[Desktop Entry]\nName=Games\n",
        )
        .expect("write directory");
        fs::write(
            dirs.path().join("hidden.directory"),
            "[Desktop Entry]\nName=Hidden\nNoDisplay=true\n",
        )
        .expect("write directory");
        let text = format!(
            "<Menu><Name>Top</Name><AppDir>{}</AppDir><DirectoryDir>{}</DirectoryDir>\
             <Menu><Name>Games</Name><Directory>games.directory</Directory>\
               <Include><All/></Include></Menu>\
             <Menu><Name>Hidden</Name><Directory>hidden.directory</Directory></Menu>\
             </Menu>",
            apps.path().display(),
            dirs.path().display()
        );
        let mut menu = parse_str(&text, Path::new("/")).expect("parse");
        let cache = EntryCache::new(None);
        let tree = materialize(&mut menu, &cache);
        let games = tree.lookup("Games").expect("Games");
        let directory = tree.node(games).directory().expect("directory entry");
        assert_eq!(directory.name(), "games.directory");
        assert_eq!(names(&tree, games), vec!["a.desktop"]);
        assert!(tree.lookup("Hidden").is_none());
        assert_eq!(tree.dir_ids().len(), 2);

        let mut freed = tree.clone();
        freed.free(games);
        assert!(freed.lookup("Games").is_none());
        assert_eq!(freed.node(freed.root().expect("root")).children().len(), 0);
    }
}
