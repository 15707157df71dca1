//! Menu file parsing and serialization.
//!
//! - Streaming reader validating the menu grammar as it builds a tree
//! - Root-element sniffing to tell dialects apart
//! - Writer used when edits are persisted

mod grammar;
mod reader;
mod writer;

use std::fs;
use std::path::Path;

use crate::error::{MenuError, Result};
use crate::node::MenuTree;

pub use reader::{detect_dialect, root_element_name, MenuDialect};
pub use writer::write_menu;

/// Parses a menu file. Relative contents resolve against its directory.
pub fn parse_file(path: &Path) -> Result<MenuTree> {
    let text = fs::read_to_string(path).map_err(|error| MenuError::io(path, error))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("/"));
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    log::debug!("parsing menu file {}", path.display());
    reader::parse_document(&text, path, base_dir, &name)
}

/// Parses menu text held in memory.
pub fn parse_str(text: &str, base_dir: &Path) -> Result<MenuTree> {
    reader::parse_document(text, base_dir, base_dir, "")
}
