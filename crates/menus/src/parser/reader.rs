//! Streaming menu reader: a state machine driven by quick-xml events.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{MenuError, Result};
use crate::node::{MenuTree, NodeId, NodeKind, NodeTag};

use super::grammar;

/// Which dialect a menu-like file is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuDialect {
    /// `<Menu>` documents.
    Current,
    /// `<VFolderInfo>` documents, not handled by this crate.
    Legacy,
}

/// Parses a menu document. `source` only labels errors.
pub(crate) fn parse_document(
    text: &str,
    source: &Path,
    base_dir: &Path,
    name: &str,
) -> Result<MenuTree> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut state = ParseState::new(source, MenuTree::new(base_dir, name));
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => state.open(&start, reader.buffer_position())?,
            Ok(Event::Empty(start)) => {
                let position = reader.buffer_position();
                state.open(&start, position)?;
                state.close(position)?;
            }
            Ok(Event::End(_)) => state.close(reader.buffer_position())?,
            Ok(Event::Text(text)) => {
                let position = reader.buffer_position();
                let value = text.unescape().map_err(|error| {
                    MenuError::parse(source, format!("bad text at byte {position}: {error}"))
                })?;
                state.text(&value, position)?;
            }
            Ok(Event::CData(data)) => {
                let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                state.text(&value, reader.buffer_position())?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => {
                return Err(MenuError::parse(
                    source,
                    format!("XML error at byte {}: {error}", reader.buffer_position()),
                ));
            }
        }
        buf.clear();
    }
    state.finish()
}

/// Reads just far enough to see the first element and returns its name.
pub fn root_element_name(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|error| MenuError::io(path, error))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                return Ok(String::from_utf8_lossy(start.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(MenuError::NoRootElement(path.to_path_buf())),
            Ok(_) => {}
            Err(error) => {
                return Err(MenuError::parse(
                    path,
                    format!("XML error at byte {}: {error}", reader.buffer_position()),
                ));
            }
        }
        buf.clear();
    }
}

/// Classifies a file by its root element without parsing the rest.
pub fn detect_dialect(path: &Path) -> Result<MenuDialect> {
    match root_element_name(path)?.as_str() {
        "Menu" => Ok(MenuDialect::Current),
        "VFolderInfo" => Ok(MenuDialect::Legacy),
        other => Err(MenuError::UnknownRootElement {
            path: path.to_path_buf(),
            element: other.to_string(),
        }),
    }
}

struct ParseState<'a> {
    source: &'a Path,
    tree: MenuTree,
    /// Open elements; the synthetic root stays at the bottom.
    stack: Vec<NodeId>,
    saw_menu: bool,
}

impl<'a> ParseState<'a> {
    fn new(source: &'a Path, tree: MenuTree) -> Self {
        let root = tree.root();
        Self {
            source,
            tree,
            stack: vec![root],
            saw_menu: false,
        }
    }

    fn error(&self, position: usize, message: impl std::fmt::Display) -> MenuError {
        MenuError::parse(self.source, format!("{message} (at byte {position})"))
    }

    fn current(&self) -> NodeId {
        self.stack
            .last()
            .copied()
            .unwrap_or_else(|| self.tree.root())
    }

    fn open(&mut self, start: &BytesStart<'_>, position: usize) -> Result<()> {
        let element = std::str::from_utf8(start.name().as_ref())
            .map_err(|_| self.error(position, "element name is not valid UTF-8"))?
            .to_string();
        let parent = self.current();
        let parent_tag = self.tree.tag(parent);

        let kind = match parent_tag {
            NodeTag::Root => {
                if element != "Menu" {
                    if self.saw_menu {
                        return Err(self.error(position, format!("<{element}> not allowed here")));
                    }
                    return Err(MenuError::UnknownRootElement {
                        path: self.source.to_path_buf(),
                        element,
                    });
                }
                if self.saw_menu {
                    return Err(self.error(position, "multiple toplevel <Menu> elements"));
                }
                self.saw_menu = true;
                NodeKind::from_tag(NodeTag::Menu)
            }
            NodeTag::Passthrough => NodeKind::Passthrough { element },
            _ => match NodeTag::from_element_name(&element) {
                Some(tag) if grammar::child_allowed(parent_tag, tag) => NodeKind::from_tag(tag),
                None if parent_tag == NodeTag::Menu => NodeKind::Passthrough { element },
                _ => {
                    return Err(self.error(position, format!("<{element}> not allowed here")));
                }
            },
        };

        let kind = self.apply_attributes(kind, start, position)?;
        let id = self.tree.create(kind);
        self.tree.append_child(parent, id);
        self.stack.push(id);
        Ok(())
    }

    fn apply_attributes(
        &self,
        mut kind: NodeKind,
        start: &BytesStart<'_>,
        position: usize,
    ) -> Result<NodeKind> {
        let tag = kind.tag();
        let mut seen: Vec<String> = Vec::new();
        for attribute in start.attributes().with_checks(false) {
            let attribute = attribute
                .map_err(|error| self.error(position, format!("malformed attribute: {error}")))?;
            if tag == NodeTag::Passthrough {
                continue;
            }
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            if !grammar::attribute_allowed(tag, &key) {
                return Err(self.error(position, format!("attribute \"{key}\" not allowed here")));
            }
            if seen.contains(&key) {
                return Err(self.error(position, format!("attribute \"{key}\" repeated")));
            }
            let value = attribute
                .unescape_value()
                .map_err(|error| self.error(position, format!("bad attribute value: {error}")))?
                .into_owned();
            match &mut kind {
                NodeKind::LegacyDir { prefix } => *prefix = Some(value),
                NodeKind::Merge { merge_type } => *merge_type = Some(value),
                _ => {}
            }
            seen.push(key);
        }
        Ok(kind)
    }

    fn text(&mut self, value: &str, position: usize) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        let id = self.current();
        let tag = self.tree.tag(id);
        if !grammar::takes_content(tag) {
            let element = tag.element_name().unwrap_or("document");
            return Err(self.error(position, format!("text not allowed inside <{element}>")));
        }
        let content = match self.tree.content(id) {
            Some(existing) => format!("{existing}{value}"),
            None => value.to_string(),
        };
        self.tree.set_content(id, Some(content));
        Ok(())
    }

    fn close(&mut self, position: usize) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(self.error(position, "unexpected closing tag"));
        }
        let Some(id) = self.stack.pop() else {
            return Err(self.error(position, "unexpected closing tag"));
        };
        let tag = self.tree.tag(id);
        if grammar::requires_content(tag) && self.tree.content(id).map_or(true, str::is_empty) {
            let element = tag.element_name().unwrap_or("element");
            return Err(self.error(position, format!("<{element}> requires content")));
        }
        if tag == NodeTag::Move {
            self.split_move(id, position)?;
        }
        Ok(())
    }

    /// Leaves `id` with the first `<Old>`/`<New>` pair and moves every
    /// further pair into a fresh sibling `<Move>`, in order.
    fn split_move(&mut self, id: NodeId, position: usize) -> Result<()> {
        let children = self.tree.child_ids(id);
        let balanced = !children.is_empty()
            && children.len() % 2 == 0
            && children.chunks(2).all(|pair| {
                self.tree.tag(pair[0]) == NodeTag::Old && self.tree.tag(pair[1]) == NodeTag::New
            });
        if !balanced {
            return Err(self.error(position, "<Move> requires balanced <Old>/<New> pairs"));
        }

        let mut anchor = id;
        for pair in children.chunks(2).skip(1) {
            let extra = self.tree.create_tag(NodeTag::Move);
            self.tree.append_child(extra, pair[0]);
            self.tree.append_child(extra, pair[1]);
            self.tree.insert_after(anchor, extra);
            anchor = extra;
        }
        Ok(())
    }

    fn finish(self) -> Result<MenuTree> {
        if self.stack.len() > 1 {
            return Err(MenuError::parse(self.source, "unexpected end of document"));
        }
        if !self.saw_menu {
            return Err(MenuError::NoRootElement(self.source.to_path_buf()));
        }
        Ok(self.tree)
    }
}
