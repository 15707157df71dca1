//! Desktop menu resolution library.
//!
//! This crate turns XDG `.menu` files into folder trees of desktop entries:
//! - Menu file parsing into an arena-backed node tree
//! - Entry cache over application and directory-entry directories
//! - Merge, move and legacy-directory expansion, rule evaluation
//! - Cached, change-tracked trees with persisted user edits

pub mod cache;
pub mod config;
pub mod desktop_entry;
pub mod directory;
pub mod entry;
pub mod error;
pub mod monitor;
pub mod node;
pub mod parser;
pub mod resolve;

// Re-export main types
pub use cache::{DesktopEntryTreeCache, MenuFileCache, TreeChange};
pub use config::MenuConfig;
pub use entry::{Entry, EntryCache, EntryKind};
pub use error::{MenuError, Result};
pub use monitor::{ChangeKind, MonitorEvent};
pub use node::{MenuTree, NodeId, NodeKind, NodeTag};
pub use parser::{parse_file, parse_str};
pub use resolve::{materialize, resolve_file, DesktopEntryTree, ResolveContext};
