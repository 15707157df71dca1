use std::fs;
use std::path::{Path, PathBuf};

use menus::{DesktopEntryTreeCache, MenuConfig, MenuError, MenuFileCache};
use tempfile::TempDir;

struct Layout {
    temp: TempDir,
}

impl Layout {
    fn new() -> Self {
        let temp = TempDir::new().expect("tempdir");
        for dir in [
            "home/config/menus",
            "etc/xdg/menus",
            "home/data/applications",
            "usr/share/applications",
            "usr/share/desktop-directories",
        ] {
            fs::create_dir_all(temp.path().join(dir)).expect("create dir");
        }
        Self { temp }
    }

    fn config(&self) -> MenuConfig {
        let root = self.temp.path();
        MenuConfig::with_dirs(
            vec![root.join("home/config"), root.join("etc/xdg")],
            vec![root.join("home/data"), root.join("usr/share")],
        )
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.temp.path().join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("parent dir");
        fs::write(&path, contents).expect("write file");
        path
    }

    fn app(&self, name: &str, extra: &str) {
        self.write(
            &format!("usr/share/applications/{name}"),
            &format!("[Desktop Entry]\nType=Application\nName={name}\n{extra}"),
        );
    }
}

const MENU: &str = "<!DOCTYPE Menu PUBLIC \"-//freedesktop//DTD Menu 1.0//EN\"\n \
    \"http://www.freedesktop.org/standards/menu-spec/menu-1.0.dtd\">\n\
    <Menu>\n\
      <Name>Applications</Name>\n\
      <DefaultAppDirs/>\n\
      <DefaultDirectoryDirs/>\n\
      <Menu>\n\
        <Name>Accessories</Name>\n\
        <Directory>accessories.directory</Directory>\n\
        <Include><Category>Utility</Category></Include>\n\
        <Exclude><Filename>calc.desktop</Filename></Exclude>\n\
      </Menu>\n\
      <Menu>\n\
        <Name>Hidden</Name>\n\
        <Directory>hidden.directory</Directory>\n\
        <Include><Category>Secret</Category></Include>\n\
      </Menu>\n\
      <Menu>\n\
        <Name>Leftovers</Name>\n\
        <OnlyUnallocated/>\n\
        <Include><Category>Utility</Category></Include>\n\
      </Menu>\n\
      <Menu>\n\
        <Name>Empty</Name>\n\
        <OnlyUnallocated/>\n\
        <Include><Category>Nothing</Category></Include>\n\
      </Menu>\n\
    </Menu>\n";

fn setup() -> Layout {
    let layout = Layout::new();
    layout.write("etc/xdg/menus/applications.menu", MENU);
    layout.write(
        "usr/share/desktop-directories/accessories.directory",
        "[Desktop Entry]\nType=Directory\nName=Accessories\n",
    );
    layout.write(
        "usr/share/desktop-directories/hidden.directory",
        "[Desktop Entry]\nType=Directory\nName=Hidden\nNoDisplay=true\n",
    );
    layout.app("editor.desktop", "Categories=Utility;\n");
    layout.app("calc.desktop", "Categories=Utility;\n");
    layout.app("spy.desktop", "Categories=Secret;\n");
    layout.app("ghost.desktop", "Categories=Utility;\nNoDisplay=true\n");
    layout.app("konly.desktop", "Categories=Utility;\nOnlyShowIn=KDE;\n");
    layout
}

fn entry_names(tree: &menus::DesktopEntryTree, path: &str) -> Vec<String> {
    let folder = tree.lookup(path).expect("folder exists");
    let mut names: Vec<String> = tree
        .node(folder)
        .entries()
        .iter()
        .map(|entry| entry.name().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn resolves_system_menu_end_to_end() {
    let layout = setup();
    let mut config = layout.config();
    config.desktop = Some("GNOME".to_string());
    let mut cache = DesktopEntryTreeCache::new(config);

    let tree = cache.lookup("applications.menu").expect("lookup");
    assert_eq!(entry_names(&tree, "Accessories"), vec!["editor.desktop"]);
    assert!(tree.lookup("Hidden").is_none());
    assert_eq!(entry_names(&tree, "Leftovers"), vec!["calc.desktop"]);
    assert!(tree.lookup("Empty").is_none());

    let accessories = tree.lookup("Accessories").expect("Accessories");
    let directory = tree
        .node(accessories)
        .directory()
        .expect("directory entry");
    assert_eq!(directory.name(), "accessories.directory");
}

#[test]
fn user_copy_shadows_system_copy() {
    let layout = setup();
    layout.write(
        "home/config/menus/applications.menu",
        "<Menu><Name>Mine</Name><DefaultAppDirs/>\
         <Menu><Name>Everything</Name><Include><All/></Include></Menu></Menu>",
    );
    let mut cache = DesktopEntryTreeCache::new(layout.config());
    let tree = cache.lookup("applications.menu").expect("lookup");
    let root = tree.root().expect("root");
    assert_eq!(tree.node(root).name(), "Mine");
    assert!(entry_names(&tree, "Everything").contains(&"spy.desktop".to_string()));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let layout = setup();
    let mut cache = DesktopEntryTreeCache::new(layout.config());
    let missing = layout.temp.path().join("nope.menu");
    let error = cache.lookup_file(&missing).expect_err("missing file");
    assert!(error.is_io());
    assert!(matches!(
        cache.lookup("nothing-here.menu"),
        Err(MenuError::NotFound(_))
    ));
}

#[test]
fn raw_cache_invalidates_by_prefix() {
    let layout = Layout::new();
    let in_b = layout.write("a/b/one.menu", "<Menu><Name>One</Name></Menu>");
    let in_c = layout.write("a/c/two.menu", "<Menu><Name>Two</Name></Menu>");
    let in_b = fs::canonicalize(in_b).expect("canonical");
    let in_c = fs::canonicalize(in_c).expect("canonical");

    let raw = MenuFileCache::new();
    raw.load(&in_b).expect("load one");
    raw.load(&in_c).expect("load two");
    assert_eq!(raw.len(), 2);

    let prefix = in_b.parent().expect("parent").to_path_buf();
    assert_eq!(raw.invalidate_prefix(&prefix), 1);
    assert!(!raw.contains(&in_b));
    assert!(raw.contains(&in_c));
}

#[test]
fn edits_survive_a_fresh_cache() {
    let layout = setup();
    let mut config = layout.config();
    config.desktop = Some("GNOME".to_string());
    {
        let mut cache = DesktopEntryTreeCache::new(config.clone());
        cache.lookup("applications.menu").expect("lookup");
        cache.mkdir("applications.menu", "Accessories/Tools").expect("mkdir");
        cache
            .create_entry("applications.menu", "Accessories/Tools/notes.desktop", None)
            .expect("create entry");
        cache
            .delete_entry("applications.menu", "Accessories/editor.desktop")
            .expect("delete entry");
    }

    let user_file = layout.temp.path().join("home/config/menus/applications.menu");
    assert!(user_file.is_file());
    assert_no_temp_files(user_file.parent().expect("parent"));

    let mut cache = DesktopEntryTreeCache::new(config);
    let tree = cache.lookup("applications.menu").expect("lookup");
    assert_eq!(entry_names(&tree, "Accessories/Tools"), vec!["notes.desktop"]);
    assert_eq!(entry_names(&tree, "Accessories"), Vec::<String>::new());
    assert_eq!(entry_names(&tree, "Leftovers"), vec!["calc.desktop"]);
    assert!(tree.find_entry(tree.root().expect("root"), "editor.desktop").is_none());
}

fn assert_no_temp_files(dir: &Path) {
    let leftovers = fs::read_dir(dir)
        .expect("list dir")
        .flatten()
        .filter(|item| item.file_name().to_string_lossy().contains(".tmp-"))
        .count();
    assert_eq!(leftovers, 0);
}
