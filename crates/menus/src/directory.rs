//! Search lists over the entry cache and the set algebra used by queries.
//!
//! - `EntryDirectory`: one loaded directory subtree, holding a use claim
//! - `EntryDirectoryList`: priority-ordered directories, first wins
//! - `EntrySet`: path-keyed entry collections with union/intersect/subtract/invert

mod entry_directory;
mod list;
mod set;

pub use entry_directory::{EntryDirectory, LoadFlags};
pub use list::EntryDirectoryList;
pub use set::EntrySet;
