//! `<Move>` execution.

use crate::node::{MenuTree, NodeId, NodeTag};

use super::dedup::strip_duplicate_children;

/// Runs every `<Move>` below `top`, children before parents, then
/// deduplicates once from `top`.
pub fn execute_moves(tree: &mut MenuTree, top: NodeId) {
    run_moves(tree, top);
    strip_duplicate_children(tree, top);
}

fn run_moves(tree: &mut MenuTree, menu: NodeId) {
    for child in tree.child_ids(menu) {
        if tree.contains(child) && tree.tag(child) == NodeTag::Menu {
            run_moves(tree, child);
        }
    }

    for id in tree.child_ids(menu) {
        if !tree.contains(id) || tree.tag(id) != NodeTag::Move {
            continue;
        }
        let old = pair_content(tree, id, NodeTag::Old);
        let new = pair_content(tree, id, NodeTag::New);
        tree.remove(id);
        if let (Some(old), Some(new)) = (old, new) {
            move_menu(tree, menu, &old, &new);
        }
    }
}

fn pair_content(tree: &MenuTree, id: NodeId, tag: NodeTag) -> Option<String> {
    let child = tree.find_child(id, tag)?;
    tree.content(child).map(str::to_string)
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

fn move_menu(tree: &mut MenuTree, menu: NodeId, old: &str, new: &str) {
    let old_parts = components(old);
    let new_parts = components(new);
    if old_parts.is_empty() || new_parts.is_empty() || old_parts == new_parts {
        return;
    }
    if new_parts.starts_with(&old_parts) {
        log::warn!("ignoring move of {old} into its own descendant {new}");
        return;
    }
    let Some(source) = tree.menu_by_path(menu, old) else {
        log::debug!("move source {old} does not exist");
        return;
    };
    let destination = tree.ensure_menu_path(menu, new);
    tree.move_children(source, destination, |tag| tag == NodeTag::Name);
    tree.remove(source);
    log::debug!("moved menu {old} to {new}");
}
