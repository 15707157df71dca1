//! Rewrites `<LegacyDir>` into the equivalent current-grammar subtree.
//!
//! The legacy convention is one category per subdirectory: files directly
//! in the root are included by name, every subdirectory becomes a submenu
//! with its own search directory.

use std::path::Path;

use crate::entry::{EntryCache, EntryKind};
use crate::node::{LegacyTag, MenuTree, NodeId, NodeKind, NodeTag};

pub(crate) fn expand_legacy_dir(
    cache: &EntryCache,
    tree: &mut MenuTree,
    id: NodeId,
) -> Option<NodeId> {
    let prefix = match tree.kind(id) {
        NodeKind::LegacyDir { prefix } => prefix.clone(),
        _ => None,
    };
    let path = tree.content_as_path(id).filter(|path| path.is_dir());
    let Some(path) = path else {
        log::debug!("dropping legacy dir without a directory: {:?}", tree.content(id));
        let next = tree.next_sibling(id);
        tree.remove(id);
        return next;
    };

    *tree.kind_mut(id) = NodeKind::AppDir {
        legacy: Some(LegacyTag {
            prefix: prefix.clone(),
        }),
    };
    tree.set_content(id, Some(path.to_string_lossy().into_owned()));
    if let Some(parent) = tree.parent(id) {
        tree.clear_directory_lists(parent);
    }

    let mut anchor = id;
    for node in legacy_contents(cache, tree, &path, prefix.as_deref()) {
        tree.insert_after(anchor, node);
        anchor = node;
    }
    log::debug!("expanded legacy dir {}", path.display());
    tree.next_sibling(anchor)
}

/// `DirectoryDir`, `Include`, and one submenu per subdirectory, detached.
fn legacy_contents(
    cache: &EntryCache,
    tree: &mut MenuTree,
    dir: &Path,
    prefix: Option<&str>,
) -> Vec<NodeId> {
    let dir_id = cache.load(dir, true);
    let mut nodes = Vec::new();

    let dir_text = dir.to_string_lossy().into_owned();
    nodes.push(tree.create_with_content(NodeKind::DirectoryDir, dir_text));

    let legacy_atom = cache.lookup_category("Legacy");
    let include = tree.create_tag(NodeTag::Include);
    for entry in cache.direct_entries(dir_id, EntryKind::Desktop) {
        if entry.has_category_atom(legacy_atom) {
            continue;
        }
        let file_id = format!("{}{}", prefix.unwrap_or(""), entry.relative_path());
        let filename = tree.create_with_content(NodeKind::Filename, file_id);
        tree.append_child(include, filename);
    }
    if tree.first_child(include).is_some() {
        nodes.push(include);
    } else {
        tree.free_subtree(include);
    }

    for (name, path) in cache.subdirectories(dir_id) {
        nodes.push(legacy_menu(cache, tree, &name, &path, prefix));
    }
    nodes
}

fn legacy_menu(
    cache: &EntryCache,
    tree: &mut MenuTree,
    name: &str,
    dir: &Path,
    prefix: Option<&str>,
) -> NodeId {
    let menu = tree.new_menu(name);
    let app_dir = tree.create_with_content(
        NodeKind::AppDir {
            legacy: Some(LegacyTag {
                prefix: prefix.map(str::to_string),
            }),
        },
        dir.to_string_lossy().into_owned(),
    );
    tree.append_child(menu, app_dir);

    let contents = legacy_contents(cache, tree, dir, prefix);
    for node in contents {
        tree.append_child(menu, node);
    }

    let dir_id = cache.load(dir, true);
    let has_directory_file = cache
        .direct_entries(dir_id, EntryKind::Directory)
        .iter()
        .any(|entry| entry.relative_path() == ".directory");
    if has_directory_file {
        let directory = tree.create_with_content(NodeKind::Directory, ".directory");
        tree.append_child(menu, directory);
    }
    menu
}
