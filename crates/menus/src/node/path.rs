//! Path handling for path-valued node contents.

use std::path::{Component, Path, PathBuf};

use super::arena::NodeId;
use super::tree::MenuTree;

/// Rewrites every relative path content below `id` to an absolute path
/// joined against `base`. Used before splicing a merged file so its
/// contents keep pointing where they did in their own file.
pub fn make_paths_absolute(tree: &mut MenuTree, id: NodeId, base: &Path) {
    for node in tree.descendants(id) {
        if !tree.tag(node).has_path_content() {
            continue;
        }
        let Some(content) = tree.content(node) else {
            continue;
        };
        if Path::new(content).is_absolute() {
            continue;
        }
        let joined = normalize_lexically(&base.join(content));
        tree.set_content(node, Some(joined.to_string_lossy().into_owned()));
    }
}

/// Removes `.` components and folds `..` against preceding components
/// without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
