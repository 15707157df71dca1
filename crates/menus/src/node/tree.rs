//! `MenuTree` - a menu document held in an arena.
//!
//! Siblings form a circular doubly-linked ring of arena indices; a ring of
//! one node points at itself. Iteration stops when `next` wraps back to the
//! parent's first child. Parents are plain indices, never owners.

use std::path::{Path, PathBuf};

use super::arena::{NodeArena, NodeId};
use super::kind::{MenuData, NodeKind, NodeTag, RootData};

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub content: Option<String>,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    next: NodeId,
    prev: NodeId,
}

impl Node {
    pub fn tag(&self) -> NodeTag {
        self.kind.tag()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// One parsed (or resolved) menu document.
#[derive(Debug, Clone)]
pub struct MenuTree {
    nodes: NodeArena<Node>,
    root: NodeId,
}

/// Flattened subtree used to copy between arenas.
struct CopyPlan {
    /// `(kind, content, index of parent within the plan)` in preorder.
    nodes: Vec<(NodeKind, Option<String>, Option<usize>)>,
}

impl MenuTree {
    /// Creates a tree holding only a `Root` node.
    pub fn new(base_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        let mut tree = Self {
            nodes: NodeArena::new(),
            root: NodeId::new(0),
        };
        tree.root = tree.create(NodeKind::Root(RootData {
            base_dir: base_dir.into(),
            name: name.into(),
            entry_cache: None,
        }));
        tree
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---------------------------------------------------------------------
    // Node access
    // ---------------------------------------------------------------------

    /// Creates a detached node.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.insert(Node {
            kind,
            content: None,
            parent: None,
            first_child: None,
            next: NodeId::new(0),
            prev: NodeId::new(0),
        });
        let node = &mut self.nodes[id];
        node.next = id;
        node.prev = id;
        id
    }

    pub fn create_with_content(&mut self, kind: NodeKind, content: impl Into<String>) -> NodeId {
        let id = self.create(kind);
        self.nodes[id].content = Some(content.into());
        id
    }

    pub fn create_tag(&mut self, tag: NodeTag) -> NodeId {
        self.create(NodeKind::from_tag(tag))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn tag(&self, id: NodeId) -> NodeTag {
        self.nodes[id].kind.tag()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id].kind
    }

    pub fn content(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].content.as_deref()
    }

    pub fn set_content(&mut self, id: NodeId, content: Option<String>) {
        self.nodes[id].content = content;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].first_child.map(|first| self.nodes[first].prev)
    }

    /// Next sibling, `None` once the ring wraps to the parent's first child.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id];
        let parent = node.parent?;
        if Some(node.next) == self.nodes[parent].first_child {
            None
        } else {
            Some(node.next)
        }
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id];
        let parent = node.parent?;
        if Some(id) == self.nodes[parent].first_child {
            None
        } else {
            Some(node.prev)
        }
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.nodes[id].first_child,
        }
    }

    /// Snapshot of the children, safe to hold across mutation.
    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).collect()
    }

    /// Preorder listing of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let mut children = self.child_ids(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    // ---------------------------------------------------------------------
    // Structural mutation
    // ---------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach_for_link(child);
        match self.nodes[parent].first_child {
            None => {
                self.nodes[parent].first_child = Some(child);
                self.nodes[child].parent = Some(parent);
            }
            Some(first) => {
                self.link_before(first, child);
                self.nodes[child].parent = Some(parent);
            }
        }
        self.on_child_linked(parent, child);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.append_child(parent, child);
        self.nodes[parent].first_child = Some(child);
        self.on_child_linked(parent, child);
    }

    pub fn insert_before(&mut self, sibling: NodeId, new: NodeId) {
        let Some(parent) = self.nodes[sibling].parent else {
            log::error!("cannot insert a sibling next to a node without a parent");
            return;
        };
        self.detach_for_link(new);
        self.link_before(sibling, new);
        self.nodes[new].parent = Some(parent);
        if self.nodes[parent].first_child == Some(sibling) {
            self.nodes[parent].first_child = Some(new);
        }
        self.on_child_linked(parent, new);
    }

    pub fn insert_after(&mut self, sibling: NodeId, new: NodeId) {
        let Some(parent) = self.nodes[sibling].parent else {
            log::error!("cannot insert a sibling next to a node without a parent");
            return;
        };
        self.detach_for_link(new);
        let next = self.nodes[sibling].next;
        self.nodes[new].prev = sibling;
        self.nodes[new].next = next;
        self.nodes[next].prev = new;
        self.nodes[sibling].next = new;
        self.nodes[new].parent = Some(parent);
        self.on_child_linked(parent, new);
    }

    /// Removes `id` from its parent and keeps the subtree alive (detached).
    pub fn steal(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id].parent else {
            return;
        };
        let next = self.nodes[id].next;
        let prev = self.nodes[id].prev;
        if next == id {
            self.nodes[parent].first_child = None;
        } else {
            self.nodes[prev].next = next;
            self.nodes[next].prev = prev;
            if self.nodes[parent].first_child == Some(id) {
                self.nodes[parent].first_child = Some(next);
            }
        }
        let node = &mut self.nodes[id];
        node.parent = None;
        node.next = id;
        node.prev = id;
        self.on_child_unlinked(parent, id);
    }

    /// Unlinks `id` and frees its whole subtree.
    pub fn remove(&mut self, id: NodeId) {
        self.steal(id);
        self.free_subtree(id);
    }

    /// Frees `id` and its descendants. Detaches first if still linked.
    pub fn free_subtree(&mut self, id: NodeId) {
        if id == self.root {
            log::error!("refusing to free the root of a menu tree");
            return;
        }
        self.steal(id);
        for node in self.descendants(id) {
            self.nodes.try_remove(node);
        }
    }

    /// Moves every child of `from` (except those `skip` rejects) to the end
    /// of `to`, preserving order.
    pub fn move_children(&mut self, from: NodeId, to: NodeId, skip: impl Fn(NodeTag) -> bool) {
        for child in self.child_ids(from) {
            if skip(self.tag(child)) {
                continue;
            }
            self.append_child(to, child);
        }
    }

    /// Moves children of `from` in after `anchor`, returning the last moved.
    pub fn splice_children_after(
        &mut self,
        from: NodeId,
        anchor: NodeId,
        skip: impl Fn(NodeTag) -> bool,
    ) -> NodeId {
        let mut last = anchor;
        for child in self.child_ids(from) {
            if skip(self.tag(child)) {
                continue;
            }
            self.insert_after(last, child);
            last = child;
        }
        last
    }

    fn detach_for_link(&mut self, id: NodeId) {
        if self.nodes[id].parent.is_some() {
            self.steal(id);
        }
    }

    /// Puts `new` directly before `sibling` in its ring.
    fn link_before(&mut self, sibling: NodeId, new: NodeId) {
        let prev = self.nodes[sibling].prev;
        self.nodes[new].prev = prev;
        self.nodes[new].next = sibling;
        self.nodes[prev].next = new;
        self.nodes[sibling].prev = new;
    }

    fn on_child_linked(&mut self, parent: NodeId, child: NodeId) {
        self.update_menu_bookkeeping(parent, self.tag(child));
    }

    fn on_child_unlinked(&mut self, parent: NodeId, child: NodeId) {
        self.update_menu_bookkeeping(parent, self.tag(child));
    }

    fn update_menu_bookkeeping(&mut self, parent: NodeId, child_tag: NodeTag) {
        if self.tag(parent) != NodeTag::Menu {
            return;
        }
        if child_tag == NodeTag::Name {
            let name_node = self.find_child(parent, NodeTag::Name);
            if let Some(data) = self.menu_data_mut(parent) {
                data.name_node = name_node;
            }
        } else if child_tag.affects_directory_lists() {
            self.clear_directory_lists(parent);
        }
    }

    /// Drops cached directory lists on `menu` and every menu below it.
    pub fn clear_directory_lists(&mut self, menu: NodeId) {
        for id in self.descendants(menu) {
            if let Some(data) = self.menu_data_mut(id) {
                data.clear_directory_lists();
            }
        }
    }

    // ---------------------------------------------------------------------
    // Copying
    // ---------------------------------------------------------------------

    /// Copies the subtree at `id` into a new detached subtree of this tree.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let plan = self.copy_plan(id);
        self.build_from_plan(plan)
    }

    /// Copies the subtree at `id` of `other` into a new detached subtree here.
    pub fn import_subtree(&mut self, other: &MenuTree, id: NodeId) -> NodeId {
        let plan = other.copy_plan(id);
        self.build_from_plan(plan)
    }

    /// Clones the whole tree, dropping menu caches.
    pub fn deep_clone(&self) -> MenuTree {
        let mut copy = MenuTree {
            nodes: NodeArena::new(),
            root: NodeId::new(0),
        };
        copy.root = copy.import_subtree(self, self.root);
        copy
    }

    fn copy_plan(&self, id: NodeId) -> CopyPlan {
        let mut nodes = Vec::new();
        let mut stack: Vec<(NodeId, Option<usize>)> = vec![(id, None)];
        while let Some((current, parent_index)) = stack.pop() {
            let node = &self.nodes[current];
            let index = nodes.len();
            nodes.push((node.kind.detached_clone(), node.content.clone(), parent_index));
            let mut children = self.child_ids(current);
            children.reverse();
            stack.extend(children.into_iter().map(|child| (child, Some(index))));
        }
        CopyPlan { nodes }
    }

    fn build_from_plan(&mut self, plan: CopyPlan) -> NodeId {
        let mut created: Vec<NodeId> = Vec::with_capacity(plan.nodes.len());
        for (kind, content, parent_index) in plan.nodes {
            let id = self.create(kind);
            self.nodes[id].content = content;
            if let Some(parent_index) = parent_index {
                self.append_child(created[parent_index], id);
            }
            created.push(id);
        }
        created[0]
    }

    // ---------------------------------------------------------------------
    // Root and Menu helpers
    // ---------------------------------------------------------------------

    pub fn root_data(&self) -> &RootData {
        match &self.nodes[self.root].kind {
            NodeKind::Root(data) => data,
            _ => unreachable!("menu tree root is always a Root node"),
        }
    }

    pub fn root_data_mut(&mut self) -> &mut RootData {
        let root = self.root;
        match &mut self.nodes[root].kind {
            NodeKind::Root(data) => data,
            _ => unreachable!("menu tree root is always a Root node"),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.root_data().base_dir
    }

    /// Content read as a path: absolute content verbatim, relative content
    /// joined against the root's base directory.
    pub fn content_as_path(&self, id: NodeId) -> Option<PathBuf> {
        let content = self.content(id)?;
        let path = Path::new(content);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(self.base_dir().join(path))
        }
    }

    pub fn menu_data(&self, id: NodeId) -> Option<&MenuData> {
        match &self.nodes[id].kind {
            NodeKind::Menu(data) => Some(data),
            _ => None,
        }
    }

    pub fn menu_data_mut(&mut self, id: NodeId) -> Option<&mut MenuData> {
        match &mut self.nodes[id].kind {
            NodeKind::Menu(data) => Some(data),
            _ => None,
        }
    }

    pub fn menu_name(&self, id: NodeId) -> Option<&str> {
        let name_node = self.menu_data(id)?.name_node?;
        self.content(name_node)
    }

    /// First `<Menu>` below the root.
    pub fn top_menu(&self) -> Option<NodeId> {
        self.find_child(self.root, NodeTag::Menu)
    }

    pub fn find_child(&self, parent: NodeId, tag: NodeTag) -> Option<NodeId> {
        self.children(parent).find(|&child| self.tag(child) == tag)
    }

    pub fn find_child_with_content(
        &self,
        parent: NodeId,
        tag: NodeTag,
        content: &str,
    ) -> Option<NodeId> {
        self.children(parent)
            .find(|&child| self.tag(child) == tag && self.content(child) == Some(content))
    }

    /// First submenu of `menu` with the given name.
    pub fn child_menu(&self, menu: NodeId, name: &str) -> Option<NodeId> {
        self.children(menu).find(|&child| {
            self.tag(child) == NodeTag::Menu && self.menu_name(child) == Some(name)
        })
    }

    /// Follows `/`-separated submenu names below `menu`.
    pub fn menu_by_path(&self, menu: NodeId, path: &str) -> Option<NodeId> {
        let mut current = menu;
        for component in path.split('/').filter(|part| !part.is_empty()) {
            current = self.child_menu(current, component)?;
        }
        Some(current)
    }

    /// Like [`Self::menu_by_path`], creating missing menus at the end.
    pub fn ensure_menu_path(&mut self, menu: NodeId, path: &str) -> NodeId {
        let mut current = menu;
        for component in path.split('/').filter(|part| !part.is_empty()) {
            current = match self.child_menu(current, component) {
                Some(existing) => existing,
                None => {
                    let created = self.new_menu(component);
                    self.append_child(current, created);
                    created
                }
            };
        }
        current
    }

    /// Creates a detached `<Menu>` with a `<Name>` child.
    pub fn new_menu(&mut self, name: &str) -> NodeId {
        let menu = self.create_tag(NodeTag::Menu);
        let name_node = self.create_with_content(NodeKind::Name, name);
        self.append_child(menu, name_node);
        menu
    }

    // ---------------------------------------------------------------------
    // Checks
    // ---------------------------------------------------------------------

    /// Verifies `next.prev == id` and `prev.next == id` around `id`, and that
    /// `id` appears exactly once in its parent's ring.
    pub fn check_ring(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        if self.nodes[node.next].prev != id || self.nodes[node.prev].next != id {
            return false;
        }
        match node.parent {
            None => true,
            Some(parent) => self.children(parent).filter(|&child| child == id).count() == 1,
        }
    }

    /// Same tags, payloads, and contents at every position.
    pub fn structurally_equal(&self, a: NodeId, other: &MenuTree, b: NodeId) -> bool {
        let left = &self.nodes[a];
        let right = &other.nodes[b];
        if !left.kind.same_payload(&right.kind) || left.content != right.content {
            return false;
        }
        let left_children = self.child_ids(a);
        let right_children = other.child_ids(b);
        left_children.len() == right_children.len()
            && left_children
                .iter()
                .zip(right_children.iter())
                .all(|(&l, &r)| self.structurally_equal(l, other, r))
    }
}

/// Iterator over the children of a node, in document order.
pub struct Children<'a> {
    tree: &'a MenuTree,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.next_sibling(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (MenuTree, NodeId) {
        let mut tree = MenuTree::new("/etc/xdg/menus", "applications.menu");
        let menu = tree.new_menu("Applications");
        let root = tree.root();
        tree.append_child(root, menu);
        let app_dir = tree.create_with_content(NodeKind::AppDir { legacy: None }, "apps");
        tree.append_child(menu, app_dir);
        let include = tree.create_tag(NodeTag::Include);
        let category = tree.create_with_content(NodeKind::Category, "Game");
        tree.append_child(include, category);
        tree.append_child(menu, include);
        (tree, menu)
    }

    fn ring_ok(tree: &MenuTree) -> bool {
        tree.descendants(tree.root())
            .into_iter()
            .all(|id| tree.check_ring(id))
    }

    #[test]
    fn append_and_iterate_in_order() {
        let (tree, menu) = sample_tree();
        let tags: Vec<NodeTag> = tree.children(menu).map(|id| tree.tag(id)).collect();
        assert_eq!(tags, vec![NodeTag::Name, NodeTag::AppDir, NodeTag::Include]);
        assert_eq!(tree.menu_name(menu), Some("Applications"));
        assert!(ring_ok(&tree));
    }

    #[test]
    fn single_node_ring_points_to_itself() {
        let mut tree = MenuTree::new("/", "x");
        let lone = tree.create_tag(NodeTag::All);
        assert!(tree.check_ring(lone));
        assert_eq!(tree.next_sibling(lone), None);
    }

    #[test]
    fn insert_before_first_updates_first_child() {
        let (mut tree, menu) = sample_tree();
        let first = tree.first_child(menu).expect("menu has children");
        let deleted = tree.create_tag(NodeTag::Deleted);
        tree.insert_before(first, deleted);
        assert_eq!(tree.first_child(menu), Some(deleted));
        assert_eq!(tree.prev_sibling(first), Some(deleted));
        assert!(ring_ok(&tree));
    }

    #[test]
    fn insert_after_last_appends() {
        let (mut tree, menu) = sample_tree();
        let last = tree.last_child(menu).expect("menu has children");
        let not_deleted = tree.create_tag(NodeTag::NotDeleted);
        tree.insert_after(last, not_deleted);
        assert_eq!(tree.last_child(menu), Some(not_deleted));
        assert_eq!(tree.next_sibling(not_deleted), None);
        assert!(ring_ok(&tree));
    }

    #[test]
    fn prepend_child_becomes_first() {
        let (mut tree, menu) = sample_tree();
        let only = tree.create_tag(NodeTag::OnlyUnallocated);
        tree.prepend_child(menu, only);
        assert_eq!(tree.first_child(menu), Some(only));
        assert_eq!(tree.child_ids(menu).len(), 4);
        assert!(ring_ok(&tree));
    }

    #[test]
    fn steal_and_remove_keep_rings_consistent() {
        let (mut tree, menu) = sample_tree();
        let children = tree.child_ids(menu);
        tree.steal(children[1]);
        assert!(tree.check_ring(children[1]));
        assert_eq!(tree.parent(children[1]), None);
        assert!(ring_ok(&tree));

        tree.remove(children[0]);
        assert!(!tree.contains(children[0]));
        assert_eq!(tree.child_ids(menu), vec![children[2]]);
        assert_eq!(tree.menu_name(menu), None);

        tree.remove(children[2]);
        assert_eq!(tree.first_child(menu), None);
        assert!(ring_ok(&tree));
    }

    #[test]
    fn sibling_insert_on_detached_node_is_a_no_op() {
        let mut tree = MenuTree::new("/", "x");
        let lone = tree.create_tag(NodeTag::All);
        let other = tree.create_tag(NodeTag::All);
        tree.insert_after(lone, other);
        assert_eq!(tree.parent(other), None);
        assert!(tree.check_ring(lone));
        assert!(tree.check_ring(other));
    }

    #[test]
    fn deep_copy_is_equal_and_independent() {
        let (mut tree, menu) = sample_tree();
        let copy = tree.deep_copy(menu);
        assert!(tree.structurally_equal(menu, &tree, copy));
        assert_eq!(tree.menu_name(copy), Some("Applications"));

        let category = tree.descendants(copy)[4];
        assert_eq!(tree.tag(category), NodeTag::Category);
        tree.set_content(category, Some("Office".to_string()));
        assert!(!tree.structurally_equal(menu, &tree, copy));
        assert_eq!(tree.content(tree.descendants(menu)[4]), Some("Game"));
    }

    #[test]
    fn deep_clone_across_arenas() {
        let (tree, _) = sample_tree();
        let clone = tree.deep_clone();
        assert!(tree.structurally_equal(tree.root(), &clone, clone.root()));
        assert_eq!(clone.base_dir(), Path::new("/etc/xdg/menus"));
    }

    #[test]
    fn content_as_path_joins_relative_content() {
        let (tree, menu) = sample_tree();
        let app_dir = tree.find_child(menu, NodeTag::AppDir).expect("app dir");
        assert_eq!(
            tree.content_as_path(app_dir),
            Some(PathBuf::from("/etc/xdg/menus/apps"))
        );
    }

    #[test]
    fn ensure_menu_path_creates_missing_menus() {
        let (mut tree, menu) = sample_tree();
        let games = tree.ensure_menu_path(menu, "Games/Arcade");
        assert_eq!(tree.menu_name(games), Some("Arcade"));
        assert_eq!(tree.menu_by_path(menu, "/Games/Arcade/"), Some(games));
        let again = tree.ensure_menu_path(menu, "Games/Arcade");
        assert_eq!(again, games);
        assert!(ring_ok(&tree));
    }

    #[test]
    fn removing_app_dir_clears_cached_lists() {
        let (mut tree, menu) = sample_tree();
        let child = tree.ensure_menu_path(menu, "Sub");
        let list = std::sync::Arc::new(crate::directory::EntryDirectoryList::new());
        tree.menu_data_mut(menu).expect("menu").app_dirs = Some(list.clone());
        tree.menu_data_mut(child).expect("menu").app_dirs = Some(list);

        let app_dir = tree.find_child(menu, NodeTag::AppDir).expect("app dir");
        tree.remove(app_dir);
        assert!(tree.menu_data(menu).expect("menu").app_dirs.is_none());
        assert!(tree.menu_data(child).expect("menu").app_dirs.is_none());
    }
}
