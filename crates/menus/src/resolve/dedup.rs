//! Removal of redundant children after merging.

use crate::node::{LegacyTag, MenuTree, NodeId, NodeKind, NodeTag};

/// Per menu, recursively:
/// - repeated `AppDir`/`DirectoryDir`/`Directory` keep their last occurrence
/// - same-named submenus fold into the first one
/// - `Move`s sharing an `Old` keep the first one
pub fn strip_duplicate_children(tree: &mut MenuTree, menu: NodeId) {
    strip_simple_duplicates(tree, menu);
    fold_same_named_menus(tree, menu);
    strip_duplicate_moves(tree, menu);
    for child in tree.child_ids(menu) {
        if tree.tag(child) == NodeTag::Menu {
            strip_duplicate_children(tree, child);
        }
    }
}

type SimpleKey = (NodeTag, Option<LegacyTag>, String);

fn simple_key(tree: &MenuTree, id: NodeId) -> Option<SimpleKey> {
    let legacy = match tree.kind(id) {
        NodeKind::AppDir { legacy } => legacy.clone(),
        NodeKind::DirectoryDir | NodeKind::Directory => None,
        _ => return None,
    };
    let content = tree.content(id)?.to_string();
    Some((tree.tag(id), legacy, content))
}

fn strip_simple_duplicates(tree: &mut MenuTree, menu: NodeId) {
    let mut seen: Vec<SimpleKey> = Vec::new();
    for id in tree.child_ids(menu).into_iter().rev() {
        let Some(key) = simple_key(tree, id) else {
            continue;
        };
        if seen.contains(&key) {
            tree.remove(id);
        } else {
            seen.push(key);
        }
    }
}

fn fold_same_named_menus(tree: &mut MenuTree, menu: NodeId) {
    let mut firsts: Vec<(String, NodeId)> = Vec::new();
    for id in tree.child_ids(menu) {
        if tree.tag(id) != NodeTag::Menu {
            continue;
        }
        let Some(name) = tree.menu_name(id).map(str::to_string) else {
            continue;
        };
        let existing = firsts
            .iter()
            .find(|(first_name, _)| *first_name == name)
            .map(|&(_, first)| first);
        match existing {
            None => firsts.push((name, id)),
            Some(first) => {
                let first_has_directory = tree.find_child(first, NodeTag::Directory).is_some();
                tree.move_children(id, first, |tag| {
                    tag == NodeTag::Name || (first_has_directory && tag == NodeTag::Directory)
                });
                tree.remove(id);
                log::debug!("folded duplicate menu {name}");
            }
        }
    }
}

fn move_old(tree: &MenuTree, id: NodeId) -> Option<String> {
    let old = tree.find_child(id, NodeTag::Old)?;
    tree.content(old).map(str::to_string)
}

fn strip_duplicate_moves(tree: &mut MenuTree, menu: NodeId) {
    let mut olds: Vec<String> = Vec::new();
    for id in tree.child_ids(menu) {
        if tree.tag(id) != NodeTag::Move {
            continue;
        }
        match move_old(tree, id) {
            Some(old) if olds.contains(&old) => tree.remove(id),
            Some(old) => olds.push(old),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use std::path::Path;

    #[test]
    fn simple_duplicates_keep_last() {
        let mut tree = parse_str(
            "<Menu><Name>A</Name><AppDir>/x</AppDir><DirectoryDir>/d</DirectoryDir>\
             <AppDir>/y</AppDir><AppDir>/x</AppDir></Menu>",
            Path::new("/"),
        )
        .expect("parse");
        let top = tree.top_menu().expect("top");
        strip_duplicate_children(&mut tree, top);
        let contents: Vec<_> = tree
            .children(top)
            .filter_map(|id| tree.content(id).map(str::to_string))
            .collect();
        assert_eq!(contents, vec!["A", "/d", "/y", "/x"]);
    }

    #[test]
    fn same_named_menus_fold_into_first() {
        let mut tree = parse_str(
            "<Menu><Name>Top</Name>\
             <Menu><Name>Games</Name><Directory>one.directory</Directory><Include><All/></Include></Menu>\
             <Menu><Name>Office</Name></Menu>\
             <Menu><Name>Games</Name><Directory>two.directory</Directory><Deleted/></Menu>\
             </Menu>",
            Path::new("/"),
        )
        .expect("parse");
        let top = tree.top_menu().expect("top");
        strip_duplicate_children(&mut tree, top);

        let menus: Vec<_> = tree
            .children(top)
            .filter(|&id| tree.tag(id) == NodeTag::Menu)
            .collect();
        assert_eq!(menus.len(), 2);
        let games = menus[0];
        assert_eq!(tree.menu_name(games), Some("Games"));
        let tags: Vec<_> = tree.children(games).map(|id| tree.tag(id)).collect();
        assert_eq!(
            tags,
            vec![NodeTag::Name, NodeTag::Directory, NodeTag::Include, NodeTag::Deleted]
        );
        let directory = tree.find_child(games, NodeTag::Directory).expect("directory");
        assert_eq!(tree.content(directory), Some("one.directory"));
    }

    #[test]
    fn later_move_with_same_old_is_dropped() {
        let mut tree = parse_str(
            "<Menu><Name>A</Name>\
             <Move><Old>X</Old><New>Y</New></Move>\
             <Move><Old>X</Old><New>Z</New></Move></Menu>",
            Path::new("/"),
        )
        .expect("parse");
        let top = tree.top_menu().expect("top");
        strip_duplicate_children(&mut tree, top);
        let moves: Vec<_> = tree
            .children(top)
            .filter(|&id| tree.tag(id) == NodeTag::Move)
            .collect();
        assert_eq!(moves.len(), 1);
        let new = tree.find_child(moves[0], NodeTag::New).expect("new");
        assert_eq!(tree.content(new), Some("Y"));
    }
}
