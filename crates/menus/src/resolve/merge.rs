//! Expansion of merge, default-directory, legacy, and passthrough nodes.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::canonicalize_existing_path;
use crate::node::{make_paths_absolute, MenuTree, NodeId, NodeKind, NodeTag};

use super::legacy;
use super::ResolveContext;

const KDE_LEGACY_PREFIX: &str = "kde-";

pub(crate) struct Expander<'a> {
    ctx: &'a ResolveContext<'a>,
    /// Basename of the top-level menu, used for `<DefaultMergeDirs/>`.
    basename: String,
    /// Files currently being merged, outermost first.
    stack: Vec<PathBuf>,
    /// Every menu file and merge directory consulted.
    pub(crate) read_files: Vec<PathBuf>,
}

impl<'a> Expander<'a> {
    pub(crate) fn new(ctx: &'a ResolveContext<'a>, basename: String) -> Self {
        Self {
            ctx,
            basename,
            stack: Vec::new(),
            read_files: Vec::new(),
        }
    }

    /// Marks `path` as the file being expanded.
    pub(crate) fn enter(&mut self, path: &Path) {
        let canonical = canonicalize_existing_path(path.to_path_buf());
        self.note_read(canonical.clone());
        self.stack.push(canonical);
    }

    pub(crate) fn expand_tree(&mut self, tree: &mut MenuTree) {
        for child in tree.child_ids(tree.root()) {
            if tree.tag(child) == NodeTag::Menu {
                self.expand_menu(tree, child);
            }
        }
    }

    fn expand_menu(&mut self, tree: &mut MenuTree, menu: NodeId) {
        let mut cursor = tree.first_child(menu);
        while let Some(id) = cursor {
            cursor = match tree.tag(id) {
                NodeTag::Menu => {
                    self.expand_menu(tree, id);
                    tree.next_sibling(id)
                }
                NodeTag::MergeFile => self.merge_file(tree, id),
                NodeTag::MergeDir => self.merge_dir(tree, id),
                NodeTag::DefaultMergeDirs => {
                    let dirs = self.ctx.config.merged_dirs(&self.basename);
                    replace_with_paths(tree, id, dirs, || NodeKind::MergeDir)
                }
                NodeTag::DefaultAppDirs => {
                    let dirs = self.ctx.config.app_dirs();
                    replace_with_paths(tree, id, dirs, || NodeKind::AppDir { legacy: None })
                }
                NodeTag::DefaultDirectoryDirs => {
                    let dirs = self.ctx.config.directory_dirs();
                    replace_with_paths(tree, id, dirs, || NodeKind::DirectoryDir)
                }
                NodeTag::KdeLegacyDirs => {
                    let dirs = self.ctx.config.kde_legacy_dirs();
                    replace_with_paths(tree, id, dirs, || NodeKind::LegacyDir {
                        prefix: Some(KDE_LEGACY_PREFIX.to_string()),
                    })
                }
                NodeTag::LegacyDir => legacy::expand_legacy_dir(self.ctx.entry_cache, tree, id),
                NodeTag::Passthrough => {
                    let next = tree.next_sibling(id);
                    tree.remove(id);
                    next
                }
                _ => tree.next_sibling(id),
            };
        }
    }

    fn merge_file(&mut self, tree: &mut MenuTree, id: NodeId) -> Option<NodeId> {
        let last = match tree.content_as_path(id) {
            Some(path) => self.merge_path(tree, id, &path),
            None => id,
        };
        let resume = tree.next_sibling(last);
        tree.remove(id);
        resume
    }

    fn merge_dir(&mut self, tree: &mut MenuTree, id: NodeId) -> Option<NodeId> {
        let mut last = id;
        if let Some(dir) = tree.content_as_path(id) {
            let dir = canonicalize_existing_path(dir);
            self.note_read(dir.clone());
            for file in menu_files_in(&dir) {
                last = self.merge_path(tree, last, &file);
            }
        }
        let resume = tree.next_sibling(last);
        tree.remove(id);
        resume
    }

    /// Splices the children of `path`'s top menu after `anchor` and returns
    /// the last node inserted (or `anchor` when nothing was merged).
    fn merge_path(&mut self, tree: &mut MenuTree, anchor: NodeId, path: &Path) -> NodeId {
        let canonical = canonicalize_existing_path(path.to_path_buf());
        if self.stack.contains(&canonical) {
            log::warn!("skipping recursive merge of {}", canonical.display());
            return anchor;
        }
        self.note_read(canonical.clone());

        let raw = match self.ctx.raw.load(&canonical) {
            Ok(raw) => raw,
            Err(error) if error.is_io() => {
                log::debug!("merge target {} unavailable: {error}", canonical.display());
                return anchor;
            }
            Err(error) => {
                log::warn!("ignoring unparseable merge target: {error}");
                return anchor;
            }
        };

        let mut merged = raw.deep_clone();
        self.stack.push(canonical.clone());
        self.expand_tree(&mut merged);
        self.stack.pop();

        let Some(top) = merged.top_menu() else {
            return anchor;
        };
        let base = merged.base_dir().to_path_buf();
        make_paths_absolute(&mut merged, top, &base);

        let imported = tree.import_subtree(&merged, top);
        let last = tree.splice_children_after(imported, anchor, |tag| tag == NodeTag::Name);
        tree.free_subtree(imported);
        log::debug!("merged {}", canonical.display());
        last
    }

    fn note_read(&mut self, path: PathBuf) {
        if !self.read_files.contains(&path) {
            self.read_files.push(path);
        }
    }
}

/// Replaces a placeholder with one node per directory. `dirs` is in search
/// order (user first); nodes are emitted in reverse so the user directory
/// comes last and takes precedence. Returns the first replacement.
fn replace_with_paths(
    tree: &mut MenuTree,
    placeholder: NodeId,
    dirs: Vec<PathBuf>,
    make: impl Fn() -> NodeKind,
) -> Option<NodeId> {
    let mut anchor = placeholder;
    for dir in dirs.into_iter().rev() {
        let node = tree.create_with_content(make(), dir.to_string_lossy().into_owned());
        tree.insert_after(anchor, node);
        anchor = node;
    }
    let next = tree.next_sibling(placeholder);
    tree.remove(placeholder);
    next
}

fn menu_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = read_dir
        .flatten()
        .map(|item| item.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "menu") && path.is_file())
        .collect();
    files.sort();
    files
}
