//! Evaluation of `<Include>`/`<Exclude>` rule trees into entry sets.

use std::cell::OnceCell;

use crate::directory::{EntryDirectoryList, EntrySet};
use crate::entry::EntryCache;
use crate::node::{MenuTree, NodeId, NodeTag};

/// Rule evaluation against one menu's application directories.
pub(crate) struct QueryContext<'a> {
    tree: &'a MenuTree,
    list: &'a EntryDirectoryList,
    cache: &'a EntryCache,
    all: OnceCell<EntrySet>,
}

impl<'a> QueryContext<'a> {
    pub(crate) fn new(tree: &'a MenuTree, list: &'a EntryDirectoryList, cache: &'a EntryCache) -> Self {
        Self {
            tree,
            list,
            cache,
            all: OnceCell::new(),
        }
    }

    fn all(&self) -> &EntrySet {
        self.all.get_or_init(|| self.list.get_all_desktops())
    }

    /// Union of every rule directly below `rule_parent` (an `Include`,
    /// `Exclude`, or `Or`).
    pub(crate) fn evaluate_children(&self, rule_parent: NodeId) -> EntrySet {
        let mut out = EntrySet::new();
        for child in self.tree.children(rule_parent) {
            out.union(&self.evaluate(child));
        }
        out
    }

    fn evaluate(&self, rule: NodeId) -> EntrySet {
        match self.tree.tag(rule) {
            NodeTag::Filename => self
                .tree
                .content(rule)
                .and_then(|name| self.list.get_desktop(name))
                .into_iter()
                .collect(),
            NodeTag::Category => {
                let Some(name) = self.tree.content(rule) else {
                    return EntrySet::new();
                };
                // Scanning interns every category seen, so look up after.
                let all = self.all();
                let atom = self.cache.lookup_category(name);
                if atom.is_unknown() {
                    return EntrySet::new();
                }
                all.iter()
                    .filter(|entry| entry.has_category_atom(atom))
                    .cloned()
                    .collect()
            }
            NodeTag::All => self.all().clone(),
            NodeTag::And => {
                let mut children = self.tree.children(rule);
                let Some(first) = children.next() else {
                    return EntrySet::new();
                };
                let mut out = self.evaluate(first);
                for child in children {
                    if out.is_empty() {
                        break;
                    }
                    out.intersect(&self.evaluate(child));
                }
                out
            }
            NodeTag::Or => self.evaluate_children(rule),
            NodeTag::Not => {
                let mut out = self.all().clone();
                out.subtract(&self.evaluate_children(rule));
                out
            }
            other => {
                log::debug!("ignoring {other:?} inside a match rule");
                EntrySet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{EntryDirectory, LoadFlags};
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

    fn keys(set: &EntrySet) -> Vec<String> {
        set.keys().map(str::to_string).collect()
    }

    #[test]
    fn rules_combine() {
        let temp = TempDir::new().expect("tempdir");
        write_entry(temp.path(), "editor.desktop", "Utility;TextEditor;");
        write_entry(temp.path(), "calc.desktop", "Utility;Math;");
        write_entry(temp.path(), "game.desktop", "Game;");

        let cache = EntryCache::new(None);
        let mut list = EntryDirectoryList::new();
        list.append(EntryDirectory::load(
            &cache,
            temp.path(),
            LoadFlags::INCLUDE_DESKTOPS,
            None,
        ));

        let tree = parse_str(
            "<Menu><Name>A</Name>\
             <Include><And><Category>Utility</Category><Not><Category>Math</Category></Not></And></Include>\
             <Include><Or><Filename>game.desktop</Filename><Category>Nope</Category></Or></Include>\
             <Include><All/></Include>\
             </Menu>",
            Path::new("/"),
        )
        .expect("parse");
        let top = tree.top_menu().expect("top");
        let includes: Vec<_> = tree
            .children(top)
            .filter(|&id| tree.tag(id) == NodeTag::Include)
            .collect();

        let query = QueryContext::new(&tree, &list, &cache);
        assert_eq!(keys(&query.evaluate_children(includes[0])), vec!["editor.desktop"]);
        assert_eq!(keys(&query.evaluate_children(includes[1])), vec!["game.desktop"]);
        assert_eq!(query.evaluate_children(includes[2]).len(), 3);
    }

    #[test]
    fn unknown_category_matches_nothing() {
        let temp = TempDir::new().expect("tempdir");
        write_entry(temp.path(), "a.desktop", "Game;");
        let cache = EntryCache::new(None);
        let mut list = EntryDirectoryList::new();
        list.append(EntryDirectory::load(
            &cache,
            temp.path(),
            LoadFlags::INCLUDE_DESKTOPS,
            None,
        ));
        let tree = parse_str(
            "<Menu><Name>A</Name><Include><Category>Office</Category></Include></Menu>",
            Path::new("/"),
        )
        .expect("parse");
        let top = tree.top_menu().expect("top");
        let include = tree.find_child(top, NodeTag::Include).expect("include");
        let query = QueryContext::new(&tree, &list, &cache);
        assert!(query.evaluate_children(include).is_empty());
        assert!(cache.lookup_category("Office").is_unknown());
    }
}
