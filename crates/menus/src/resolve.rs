//! Menu resolution: from a parsed menu file to a materialized folder tree.
//!
//! - Expansion of merges, default directories and legacy directories
//! - Duplicate removal and `<Move>` execution
//! - Rule evaluation and only-unallocated distribution

mod dedup;
mod legacy;
mod materialize;
mod merge;
mod moves;
mod query;

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cache::MenuFileCache;
use crate::config::MenuConfig;
use crate::entry::EntryCache;
use crate::error::{canonicalize_existing_path, MenuError, Result};
use crate::node::MenuTree;

pub use dedup::strip_duplicate_children;
pub use materialize::{materialize, DesktopEntryTree, TreeNode};
pub use moves::execute_moves;

use merge::Expander;

/// Collaborators a resolution borrows.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    pub config: &'a MenuConfig,
    pub raw: &'a MenuFileCache,
    pub entry_cache: &'a EntryCache,
}

/// Output of [`resolve_file`].
#[derive(Debug)]
pub struct ResolvedMenu {
    /// Private, fully expanded copy of the menu file.
    pub tree: MenuTree,
    /// Canonical paths of every menu file and merge directory consulted.
    pub read_files: Vec<PathBuf>,
}

/// Loads `path` through the raw cache and resolves a private copy of it.
pub fn resolve_file(ctx: &ResolveContext<'_>, path: &Path) -> Result<ResolvedMenu> {
    let started = Instant::now();
    let canonical = canonicalize_existing_path(path.to_path_buf());
    let raw = ctx.raw.load(&canonical)?;
    let mut tree = raw.deep_clone();
    tree.root_data_mut().entry_cache = Some(ctx.entry_cache.clone());

    let read_files = resolve_tree(ctx, &mut tree, Some(&canonical))?;
    log::debug!(
        "resolved {} in {:?} ({} files read)",
        canonical.display(),
        started.elapsed(),
        read_files.len()
    );
    Ok(ResolvedMenu { tree, read_files })
}

/// Resolves `tree` in place. `source` is the file the tree came from, used
/// to guard against the file merging itself. Returns every file consulted.
pub fn resolve_tree(
    ctx: &ResolveContext<'_>,
    tree: &mut MenuTree,
    source: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let basename = tree.root_data().name.clone();
    let mut expander = Expander::new(ctx, basename);
    if let Some(source) = source {
        expander.enter(source);
    }
    expander.expand_tree(tree);

    let top = tree
        .top_menu()
        .ok_or_else(|| MenuError::NoRootElement(tree.base_dir().to_path_buf()))?;
    strip_duplicate_children(tree, top);
    execute_moves(tree, top);
    Ok(expander.read_files)
}
