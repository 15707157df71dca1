//! Nesting, attribute, and content rules of the menu grammar.

use crate::node::NodeTag;

/// Whether `child` may appear directly below an element tagged `parent`.
///
/// Unknown elements below `<Menu>` and anything below a passthrough are
/// handled by the reader and never reach this table.
pub(crate) fn child_allowed(parent: NodeTag, child: NodeTag) -> bool {
    use NodeTag::*;
    match parent {
        Root => child == Menu,
        Menu => matches!(
            child,
            Menu | AppDir
                | DefaultAppDirs
                | DirectoryDir
                | DefaultDirectoryDirs
                | DefaultMergeDirs
                | Name
                | Directory
                | OnlyUnallocated
                | NotOnlyUnallocated
                | Deleted
                | NotDeleted
                | Include
                | Exclude
                | MergeFile
                | MergeDir
                | LegacyDir
                | KdeLegacyDirs
                | Move
                | Layout
                | DefaultLayout
        ),
        Include | Exclude | And | Or | Not => child.is_match_rule(),
        Move => matches!(child, Old | New),
        Layout | DefaultLayout => matches!(child, Merge | Filename | Menuname | Separator),
        _ => false,
    }
}

pub(crate) fn attribute_allowed(tag: NodeTag, attribute: &str) -> bool {
    matches!(
        (tag, attribute),
        (NodeTag::LegacyDir, "prefix") | (NodeTag::Merge, "type")
    )
}

/// Elements that carry text.
pub(crate) fn takes_content(tag: NodeTag) -> bool {
    requires_content(tag) || tag == NodeTag::Passthrough
}

/// Elements that are an error when closed without text.
pub(crate) fn requires_content(tag: NodeTag) -> bool {
    use NodeTag::*;
    matches!(
        tag,
        Name | Directory
            | AppDir
            | DirectoryDir
            | Filename
            | Category
            | MergeFile
            | MergeDir
            | LegacyDir
            | Old
            | New
            | Menuname
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_rules_nest_only_below_rule_containers() {
        assert!(child_allowed(NodeTag::Include, NodeTag::And));
        assert!(child_allowed(NodeTag::Not, NodeTag::Category));
        assert!(!child_allowed(NodeTag::Menu, NodeTag::Category));
        assert!(!child_allowed(NodeTag::Include, NodeTag::Menu));
        assert!(child_allowed(NodeTag::Layout, NodeTag::Filename));
        assert!(!child_allowed(NodeTag::Move, NodeTag::Filename));
    }

    #[test]
    fn only_two_attributes_exist() {
        assert!(attribute_allowed(NodeTag::LegacyDir, "prefix"));
        assert!(attribute_allowed(NodeTag::Merge, "type"));
        assert!(!attribute_allowed(NodeTag::Menu, "prefix"));
        assert!(!attribute_allowed(NodeTag::MergeFile, "type"));
    }
}
