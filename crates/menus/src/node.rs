//! The generic menu document tree.
//!
//! - Slab arena of nodes addressed by `NodeId`
//! - Circular sibling rings expressed as arena indices
//! - Menu bookkeeping (cached `<Name>` and directory lists)

mod arena;
mod kind;
mod path;
mod tree;

pub use arena::{NodeArena, NodeId};
pub use kind::{LegacyTag, MenuData, NodeKind, NodeTag, RootData};
pub use path::{make_paths_absolute, normalize_lexically};
pub use tree::{Children, MenuTree, Node};
