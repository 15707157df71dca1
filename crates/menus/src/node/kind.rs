//! Node kinds of the menu grammar.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::directory::EntryDirectoryList;
use crate::entry::EntryCache;

use super::arena::NodeId;

/// Extra state carried by the root of every parsed or resolved tree.
#[derive(Clone, Default)]
pub struct RootData {
    /// Directory relative path contents are resolved against.
    pub base_dir: PathBuf,
    /// Logical menu name, usually the file's basename.
    pub name: String,
    pub entry_cache: Option<EntryCache>,
}

impl fmt::Debug for RootData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootData")
            .field("base_dir", &self.base_dir)
            .field("name", &self.name)
            .field("entry_cache", &self.entry_cache.is_some())
            .finish()
    }
}

/// Per-`<Menu>` caches. Never copied: a copy recomputes them lazily.
#[derive(Clone, Default)]
pub struct MenuData {
    /// First `<Name>` child.
    pub name_node: Option<NodeId>,
    pub app_dirs: Option<Arc<EntryDirectoryList>>,
    pub directory_dirs: Option<Arc<EntryDirectoryList>>,
}

impl MenuData {
    pub fn clear_directory_lists(&mut self) {
        self.app_dirs = None;
        self.directory_dirs = None;
    }
}

impl fmt::Debug for MenuData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuData")
            .field("name_node", &self.name_node)
            .field("app_dirs", &self.app_dirs.as_ref().map(|list| list.len()))
            .field(
                "directory_dirs",
                &self.directory_dirs.as_ref().map(|list| list.len()),
            )
            .finish()
    }
}

/// Marks an `<AppDir>` synthesized from a `<LegacyDir>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyTag {
    pub prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root(RootData),
    /// Well-formed markup the grammar does not know; dropped on resolve.
    Passthrough { element: String },
    Menu(MenuData),
    AppDir { legacy: Option<LegacyTag> },
    DefaultAppDirs,
    DirectoryDir,
    DefaultDirectoryDirs,
    DefaultMergeDirs,
    Name,
    Directory,
    OnlyUnallocated,
    NotOnlyUnallocated,
    Deleted,
    NotDeleted,
    Include,
    Exclude,
    Filename,
    Category,
    All,
    And,
    Or,
    Not,
    MergeFile,
    MergeDir,
    LegacyDir { prefix: Option<String> },
    KdeLegacyDirs,
    Move,
    Old,
    New,
    Layout,
    DefaultLayout,
    Menuname,
    Separator,
    Merge { merge_type: Option<String> },
}

/// Payload-free discriminant of [`NodeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeTag {
    Root,
    Passthrough,
    Menu,
    AppDir,
    DefaultAppDirs,
    DirectoryDir,
    DefaultDirectoryDirs,
    DefaultMergeDirs,
    Name,
    Directory,
    OnlyUnallocated,
    NotOnlyUnallocated,
    Deleted,
    NotDeleted,
    Include,
    Exclude,
    Filename,
    Category,
    All,
    And,
    Or,
    Not,
    MergeFile,
    MergeDir,
    LegacyDir,
    KdeLegacyDirs,
    Move,
    Old,
    New,
    Layout,
    DefaultLayout,
    Menuname,
    Separator,
    Merge,
}

impl NodeTag {
    /// XML element name, `None` for the synthetic root.
    pub fn element_name(self) -> Option<&'static str> {
        Some(match self {
            Self::Root | Self::Passthrough => return None,
            Self::Menu => "Menu",
            Self::AppDir => "AppDir",
            Self::DefaultAppDirs => "DefaultAppDirs",
            Self::DirectoryDir => "DirectoryDir",
            Self::DefaultDirectoryDirs => "DefaultDirectoryDirs",
            Self::DefaultMergeDirs => "DefaultMergeDirs",
            Self::Name => "Name",
            Self::Directory => "Directory",
            Self::OnlyUnallocated => "OnlyUnallocated",
            Self::NotOnlyUnallocated => "NotOnlyUnallocated",
            Self::Deleted => "Deleted",
            Self::NotDeleted => "NotDeleted",
            Self::Include => "Include",
            Self::Exclude => "Exclude",
            Self::Filename => "Filename",
            Self::Category => "Category",
            Self::All => "All",
            Self::And => "And",
            Self::Or => "Or",
            Self::Not => "Not",
            Self::MergeFile => "MergeFile",
            Self::MergeDir => "MergeDir",
            Self::LegacyDir => "LegacyDir",
            Self::KdeLegacyDirs => "KDELegacyDirs",
            Self::Move => "Move",
            Self::Old => "Old",
            Self::New => "New",
            Self::Layout => "Layout",
            Self::DefaultLayout => "DefaultLayout",
            Self::Menuname => "Menuname",
            Self::Separator => "Separator",
            Self::Merge => "Merge",
        })
    }

    /// Maps an element name to a tag. `Root` and `Passthrough` never match.
    pub fn from_element_name(name: &str) -> Option<Self> {
        Some(match name {
            "Menu" => Self::Menu,
            "AppDir" => Self::AppDir,
            "DefaultAppDirs" => Self::DefaultAppDirs,
            "DirectoryDir" => Self::DirectoryDir,
            "DefaultDirectoryDirs" => Self::DefaultDirectoryDirs,
            "DefaultMergeDirs" => Self::DefaultMergeDirs,
            "Name" => Self::Name,
            "Directory" => Self::Directory,
            "OnlyUnallocated" => Self::OnlyUnallocated,
            "NotOnlyUnallocated" => Self::NotOnlyUnallocated,
            "Deleted" => Self::Deleted,
            "NotDeleted" => Self::NotDeleted,
            "Include" => Self::Include,
            "Exclude" => Self::Exclude,
            "Filename" => Self::Filename,
            "Category" => Self::Category,
            "All" => Self::All,
            "And" => Self::And,
            "Or" => Self::Or,
            "Not" => Self::Not,
            "MergeFile" => Self::MergeFile,
            "MergeDir" => Self::MergeDir,
            "LegacyDir" => Self::LegacyDir,
            "KDELegacyDirs" => Self::KdeLegacyDirs,
            "Move" => Self::Move,
            "Old" => Self::Old,
            "New" => Self::New,
            "Layout" => Self::Layout,
            "DefaultLayout" => Self::DefaultLayout,
            "Menuname" => Self::Menuname,
            "Separator" => Self::Separator,
            "Merge" => Self::Merge,
            _ => return None,
        })
    }

    /// Elements whose content is a filesystem path.
    pub fn has_path_content(self) -> bool {
        matches!(
            self,
            Self::AppDir | Self::DirectoryDir | Self::MergeFile | Self::MergeDir | Self::LegacyDir
        )
    }

    /// Elements that contribute search directories to their `<Menu>`.
    pub fn affects_directory_lists(self) -> bool {
        matches!(self, Self::AppDir | Self::DirectoryDir | Self::LegacyDir)
    }

    /// Match-rule elements allowed below `Include`/`Exclude`/`And`/`Or`/`Not`.
    pub fn is_match_rule(self) -> bool {
        matches!(
            self,
            Self::Filename | Self::Category | Self::All | Self::And | Self::Or | Self::Not
        )
    }
}

impl NodeKind {
    /// Builds the payload-free kind for a tag.
    pub fn from_tag(tag: NodeTag) -> Self {
        match tag {
            NodeTag::Root => Self::Root(RootData::default()),
            NodeTag::Passthrough => Self::Passthrough {
                element: String::new(),
            },
            NodeTag::Menu => Self::Menu(MenuData::default()),
            NodeTag::AppDir => Self::AppDir { legacy: None },
            NodeTag::DefaultAppDirs => Self::DefaultAppDirs,
            NodeTag::DirectoryDir => Self::DirectoryDir,
            NodeTag::DefaultDirectoryDirs => Self::DefaultDirectoryDirs,
            NodeTag::DefaultMergeDirs => Self::DefaultMergeDirs,
            NodeTag::Name => Self::Name,
            NodeTag::Directory => Self::Directory,
            NodeTag::OnlyUnallocated => Self::OnlyUnallocated,
            NodeTag::NotOnlyUnallocated => Self::NotOnlyUnallocated,
            NodeTag::Deleted => Self::Deleted,
            NodeTag::NotDeleted => Self::NotDeleted,
            NodeTag::Include => Self::Include,
            NodeTag::Exclude => Self::Exclude,
            NodeTag::Filename => Self::Filename,
            NodeTag::Category => Self::Category,
            NodeTag::All => Self::All,
            NodeTag::And => Self::And,
            NodeTag::Or => Self::Or,
            NodeTag::Not => Self::Not,
            NodeTag::MergeFile => Self::MergeFile,
            NodeTag::MergeDir => Self::MergeDir,
            NodeTag::LegacyDir => Self::LegacyDir { prefix: None },
            NodeTag::KdeLegacyDirs => Self::KdeLegacyDirs,
            NodeTag::Move => Self::Move,
            NodeTag::Old => Self::Old,
            NodeTag::New => Self::New,
            NodeTag::Layout => Self::Layout,
            NodeTag::DefaultLayout => Self::DefaultLayout,
            NodeTag::Menuname => Self::Menuname,
            NodeTag::Separator => Self::Separator,
            NodeTag::Merge => Self::Merge { merge_type: None },
        }
    }

    pub fn tag(&self) -> NodeTag {
        match self {
            Self::Root(_) => NodeTag::Root,
            Self::Passthrough { .. } => NodeTag::Passthrough,
            Self::Menu(_) => NodeTag::Menu,
            Self::AppDir { .. } => NodeTag::AppDir,
            Self::DefaultAppDirs => NodeTag::DefaultAppDirs,
            Self::DirectoryDir => NodeTag::DirectoryDir,
            Self::DefaultDirectoryDirs => NodeTag::DefaultDirectoryDirs,
            Self::DefaultMergeDirs => NodeTag::DefaultMergeDirs,
            Self::Name => NodeTag::Name,
            Self::Directory => NodeTag::Directory,
            Self::OnlyUnallocated => NodeTag::OnlyUnallocated,
            Self::NotOnlyUnallocated => NodeTag::NotOnlyUnallocated,
            Self::Deleted => NodeTag::Deleted,
            Self::NotDeleted => NodeTag::NotDeleted,
            Self::Include => NodeTag::Include,
            Self::Exclude => NodeTag::Exclude,
            Self::Filename => NodeTag::Filename,
            Self::Category => NodeTag::Category,
            Self::All => NodeTag::All,
            Self::And => NodeTag::And,
            Self::Or => NodeTag::Or,
            Self::Not => NodeTag::Not,
            Self::MergeFile => NodeTag::MergeFile,
            Self::MergeDir => NodeTag::MergeDir,
            Self::LegacyDir { .. } => NodeTag::LegacyDir,
            Self::KdeLegacyDirs => NodeTag::KdeLegacyDirs,
            Self::Move => NodeTag::Move,
            Self::Old => NodeTag::Old,
            Self::New => NodeTag::New,
            Self::Layout => NodeTag::Layout,
            Self::DefaultLayout => NodeTag::DefaultLayout,
            Self::Menuname => NodeTag::Menuname,
            Self::Separator => NodeTag::Separator,
            Self::Merge { .. } => NodeTag::Merge,
        }
    }

    /// Clone for a copied node: menu caches are dropped.
    pub fn detached_clone(&self) -> Self {
        match self {
            Self::Menu(_) => Self::Menu(MenuData::default()),
            other => other.clone(),
        }
    }

    /// Compares payloads that are part of the document (not caches).
    pub fn same_payload(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Passthrough { element: a }, Self::Passthrough { element: b }) => a == b,
            (Self::AppDir { legacy: a }, Self::AppDir { legacy: b }) => a == b,
            (Self::LegacyDir { prefix: a }, Self::LegacyDir { prefix: b }) => a == b,
            (Self::Merge { merge_type: a }, Self::Merge { merge_type: b }) => a == b,
            (a, b) => a.tag() == b.tag(),
        }
    }
}
