//! Caching layers above the resolver.
//!
//! - `MenuFileCache`: parsed menu files keyed by canonical path
//! - `DesktopEntryTreeCache`: materialized menus with diffs and edits

mod diff;
mod edit;
mod persist;
mod raw;
mod tree;

pub use diff::{diff_trees, TreeChange};
pub use persist::write_atomic;
pub use raw::MenuFileCache;
pub use tree::DesktopEntryTreeCache;
