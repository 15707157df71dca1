//! Edits persisted into the user's copy of a menu file.
//!
//! Every edit rewrites `<user config>/menus/<name>`, creating it (merging
//! the system copy) when missing. Edited desktop files live in the override
//! directory, which is added as the highest-priority `<AppDir>`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{MenuError, Result};
use crate::monitor::{ChangeKind, MonitorEvent};
use crate::node::{MenuTree, NodeId, NodeKind, NodeTag};
use crate::parser::write_menu;
use crate::resolve::DesktopEntryTree;

use super::persist::write_atomic;
use super::tree::DesktopEntryTreeCache;

/// Splits `A/B/leaf` into (`A/B`, `leaf`).
fn split_path(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(MenuError::InvalidInput(format!("empty menu path {path:?}")));
    }
    Ok(trimmed.rsplit_once('/').unwrap_or(("", trimmed)))
}

fn join_id(folder: &str, leaf: &str) -> String {
    if folder.is_empty() {
        leaf.to_string()
    } else {
        format!("{folder}/{leaf}")
    }
}

/// A rule node holding exactly one `<Filename>id</Filename>`.
fn is_filename_rule(tree: &MenuTree, id: NodeId, tag: NodeTag, file_id: &str) -> bool {
    if tree.tag(id) != tag {
        return false;
    }
    let children = tree.child_ids(id);
    children.len() == 1
        && tree.tag(children[0]) == NodeTag::Filename
        && tree.content(children[0]) == Some(file_id)
}

fn remove_filename_rules(tree: &mut MenuTree, menu: NodeId, tag: NodeTag, file_id: &str) {
    for child in tree.child_ids(menu) {
        if is_filename_rule(tree, child, tag, file_id) {
            tree.remove(child);
        }
    }
}

fn append_filename_rule(tree: &mut MenuTree, menu: NodeId, tag: NodeTag, file_id: &str) {
    let rule = tree.create_tag(tag);
    let filename = tree.create_with_content(NodeKind::Filename, file_id);
    tree.append_child(rule, filename);
    tree.append_child(menu, rule);
}

fn set_deleted(tree: &mut MenuTree, menu: NodeId, deleted: bool) {
    for child in tree.child_ids(menu) {
        if matches!(tree.tag(child), NodeTag::Deleted | NodeTag::NotDeleted) {
            tree.remove(child);
        }
    }
    let tag = if deleted {
        NodeTag::Deleted
    } else {
        NodeTag::NotDeleted
    };
    let marker = tree.create_tag(tag);
    tree.append_child(menu, marker);
}

/// Folder paths of every menu that ends up flagged `<OnlyUnallocated/>`.
fn only_unallocated_paths(tree: &MenuTree) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(top) = tree.top_menu() {
        collect_only_unallocated(tree, top, "", &mut out);
    }
    out
}

fn collect_only_unallocated(tree: &MenuTree, menu: NodeId, path: &str, out: &mut Vec<String>) {
    let mut only_unallocated = false;
    for child in tree.children(menu) {
        match tree.tag(child) {
            NodeTag::OnlyUnallocated => only_unallocated = true,
            NodeTag::NotOnlyUnallocated => only_unallocated = false,
            NodeTag::Menu => {
                if let Some(name) = tree.menu_name(child) {
                    collect_only_unallocated(tree, child, &join_id(path, name), out);
                }
            }
            _ => {}
        }
    }
    if only_unallocated {
        out.push(path.to_string());
    }
}

/// Makes `dir` the last, and so highest-priority, `<AppDir>` of `top`.
fn ensure_last_app_dir(tree: &mut MenuTree, top: NodeId, dir: &Path) {
    let content = dir.to_string_lossy().into_owned();
    for child in tree.child_ids(top) {
        if tree.tag(child) == NodeTag::AppDir && tree.content(child) == Some(content.as_str()) {
            tree.remove(child);
        }
    }
    let app_dir = tree.create_with_content(NodeKind::AppDir { legacy: None }, content);
    tree.append_child(top, app_dir);
}

impl DesktopEntryTreeCache {
    /// Creates or overrides the desktop file shown as `path`
    /// (`Folder/name.desktop`). The file is copied from `source`, or from the
    /// entry currently shown there, or written empty. Returns the path of the
    /// writable copy.
    pub fn create_entry(&mut self, name: &str, path: &str, source: Option<&Path>) -> Result<PathBuf> {
        let (folder_path, leaf) = split_path(path)?;
        if !leaf.ends_with(".desktop") {
            return Err(MenuError::InvalidInput(format!("not a desktop file name: {leaf}")));
        }
        let tree = self.lookup(name)?;
        let folder = tree
            .lookup(folder_path)
            .ok_or_else(|| MenuError::NotFound(PathBuf::from(path)))?;
        if tree.lookup(path).is_some() {
            return Err(MenuError::IsDirectory(PathBuf::from(path)));
        }
        let existing = tree.find_entry(folder, leaf).cloned();
        let override_root = self.require_override_dir(name)?;

        let target_dir = override_root.join(folder_path);
        fs::create_dir_all(&target_dir).map_err(|error| MenuError::io(&target_dir, error))?;
        let target = target_dir.join(leaf);
        if !target.exists() {
            match source.or(existing.as_ref().map(|entry| entry.path())) {
                Some(from) => {
                    fs::copy(from, &target).map_err(|error| MenuError::io(from, error))?;
                }
                None => {
                    let stem = leaf.trim_end_matches(".desktop");
                    let contents = format!("[Desktop Entry]\nType=Application\nName={stem}\n");
                    write_atomic(&target, contents.as_bytes())?;
                }
            }
            self.notify_created(&override_root, &target);
        }

        let file_id = join_id(folder_path, leaf);
        let (user_file, mut menu_tree, top) = self.user_menu(name, &tree)?;
        ensure_last_app_dir(&mut menu_tree, top, &override_root);
        let menu = menu_tree.ensure_menu_path(top, folder_path);
        remove_filename_rules(&mut menu_tree, menu, NodeTag::Exclude, &file_id);
        remove_filename_rules(&mut menu_tree, menu, NodeTag::Include, &file_id);
        append_filename_rule(&mut menu_tree, menu, NodeTag::Include, &file_id);
        if let Some(existing) = existing.filter(|entry| entry.relative_path() != file_id) {
            self.hide_id(name, &mut menu_tree, top, folder_path, existing.relative_path());
        }
        self.save(name, &user_file, &menu_tree)?;
        log::debug!("created entry {path} in menu {name}");
        Ok(target)
    }

    /// Hides the entry shown as `path`, removing its override copy if any.
    pub fn delete_entry(&mut self, name: &str, path: &str) -> Result<()> {
        let (folder_path, leaf) = split_path(path)?;
        let tree = self.lookup(name)?;
        let folder = tree
            .lookup(folder_path)
            .ok_or_else(|| MenuError::NotFound(PathBuf::from(path)))?;
        if tree.lookup(path).is_some() {
            return Err(MenuError::IsDirectory(PathBuf::from(path)));
        }
        let entry = tree
            .find_entry(folder, leaf)
            .cloned()
            .ok_or_else(|| MenuError::NotFound(PathBuf::from(path)))?;

        let (user_file, mut menu_tree, top) = self.user_menu(name, &tree)?;
        self.hide_id(name, &mut menu_tree, top, folder_path, entry.relative_path());

        let override_root = self.override_dir(name);
        if override_root.is_some_and(|root| entry.path().starts_with(root)) {
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    self.entry_cache
                        .handle_event(&MonitorEvent::new(entry.path(), ChangeKind::Deleted));
                }
                Err(error) => log::warn!("could not remove {}: {error}", entry.path().display()),
            }
        }
        self.save(name, &user_file, &menu_tree)?;
        log::debug!("deleted entry {path} from menu {name}");
        Ok(())
    }

    /// Creates the folder `path`, or undeletes it.
    pub fn mkdir(&mut self, name: &str, path: &str) -> Result<()> {
        let (parent_path, leaf) = split_path(path)?;
        let tree = self.lookup(name)?;
        if tree.lookup(path).is_some() {
            return Err(MenuError::AlreadyExists(PathBuf::from(path)));
        }
        let parent = tree
            .lookup(parent_path)
            .ok_or_else(|| MenuError::NotFound(PathBuf::from(parent_path)))?;
        if tree.find_entry(parent, leaf).is_some() {
            return Err(MenuError::AlreadyExists(PathBuf::from(path)));
        }

        let (user_file, mut menu_tree, top) = self.user_menu(name, &tree)?;
        let menu = menu_tree.ensure_menu_path(top, path);
        set_deleted(&mut menu_tree, menu, false);

        let override_root = self.require_override_dir(name)?;
        let override_dir = override_root.join(path.trim_matches('/'));
        fs::create_dir_all(&override_dir).map_err(|error| MenuError::io(&override_dir, error))?;
        self.notify_created(&override_root, &override_dir);
        self.save(name, &user_file, &menu_tree)?;
        log::debug!("created folder {path} in menu {name}");
        Ok(())
    }

    /// Deletes the empty folder `path`.
    pub fn rmdir(&mut self, name: &str, path: &str) -> Result<()> {
        let (parent_path, leaf) = split_path(path)?;
        let tree = self.lookup(name)?;
        let Some(folder) = tree.lookup(path) else {
            let is_entry = tree
                .lookup(parent_path)
                .is_some_and(|parent| tree.find_entry(parent, leaf).is_some());
            return Err(if is_entry {
                MenuError::NotDirectory(PathBuf::from(path))
            } else {
                MenuError::NotFound(PathBuf::from(path))
            });
        };
        let node = tree.node(folder);
        if !node.entries().is_empty() || !node.children().is_empty() {
            return Err(MenuError::NotEmpty(PathBuf::from(path)));
        }

        let (user_file, mut menu_tree, top) = self.user_menu(name, &tree)?;
        let menu = menu_tree.ensure_menu_path(top, path);
        set_deleted(&mut menu_tree, menu, true);

        if let Some(root) = self.override_dir(name) {
            // Only succeeds when the override copy is empty too.
            let dir = root.join(path.trim_matches('/'));
            if let Err(error) = fs::remove_dir(&dir) {
                if !matches!(
                    error.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
                ) {
                    log::debug!("could not remove {}: {error}", dir.display());
                }
            }
        }
        self.save(name, &user_file, &menu_tree)?;
        log::debug!("deleted folder {path} from menu {name}");
        Ok(())
    }

    /// Excludes `file_id` from `folder_path` and from every only-unallocated
    /// folder, so the entry is not picked up as unallocated elsewhere.
    fn hide_id(&self, name: &str, menu_tree: &mut MenuTree, top: NodeId, folder_path: &str, file_id: &str) {
        let mut paths = self
            .trees
            .get(name)
            .and_then(|entry| entry.resolved.as_ref())
            .map(only_unallocated_paths)
            .unwrap_or_default();
        paths.push(folder_path.to_string());
        paths.sort();
        paths.dedup();
        for path in paths {
            let menu = menu_tree.ensure_menu_path(top, &path);
            remove_filename_rules(menu_tree, menu, NodeTag::Include, file_id);
            remove_filename_rules(menu_tree, menu, NodeTag::Exclude, file_id);
            append_filename_rule(menu_tree, menu, NodeTag::Exclude, file_id);
        }
    }

    /// Invalidates scans of `path` and every new directory above it, up to
    /// and including `root`.
    fn notify_created(&self, root: &Path, path: &Path) {
        for created in path.ancestors().take_while(|dir| dir.starts_with(root)) {
            self.entry_cache
                .handle_event(&MonitorEvent::new(created, ChangeKind::Created));
        }
    }

    fn require_override_dir(&self, name: &str) -> Result<PathBuf> {
        self.override_dir(name)
            .ok_or_else(|| MenuError::InvalidInput("no user config directory".to_string()))
    }

    /// The user's raw menu file for `name`, created in memory when missing.
    fn user_menu(&self, name: &str, resolved: &DesktopEntryTree) -> Result<(PathBuf, MenuTree, NodeId)> {
        let user_dir = self
            .config
            .user_menu_dir()
            .ok_or_else(|| MenuError::InvalidInput("no user config directory".to_string()))?;
        let user_file = user_dir.join(name);

        if user_file.exists() {
            let tree = self.raw.load(&user_file)?.deep_clone();
            let top = tree
                .top_menu()
                .ok_or_else(|| MenuError::NoRootElement(user_file.clone()))?;
            return Ok((user_file, tree, top));
        }

        let top_name = resolved
            .root()
            .map(|root| resolved.node(root).name().to_string())
            .unwrap_or_default();
        let mut tree = MenuTree::new(user_dir.clone(), name);
        let top = tree.new_menu(&top_name);
        let root = tree.root();
        tree.append_child(root, top);
        let chain_to = self
            .trees
            .get(name)
            .and_then(|entry| entry.location.chain_to.clone())
            .filter(|chain| *chain != user_file);
        if let Some(chain_to) = chain_to {
            let merge = tree.create_with_content(NodeKind::MergeFile, chain_to.to_string_lossy().into_owned());
            tree.append_child(top, merge);
        }
        log::debug!("creating user menu file {}", user_file.display());
        Ok((user_file, tree, top))
    }

    fn save(&mut self, name: &str, user_file: &Path, tree: &MenuTree) -> Result<()> {
        let text = write_menu(tree)?;
        write_atomic(user_file, text.as_bytes())?;
        self.raw.invalidate_prefix(user_file);
        self.mark_dirty(name);
        Ok(())
    }
}
