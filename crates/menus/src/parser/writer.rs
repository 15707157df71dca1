//! Serializes a raw menu tree back to XML.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{MenuError, Result};
use crate::node::{MenuTree, NodeId, NodeKind};

const DOCTYPE: &str = "Menu PUBLIC \"-//freedesktop//DTD Menu 1.0//EN\"\n \"http://www.freedesktop.org/standards/menu-spec/1.0/menu.dtd\"";

/// Renders `tree` as a menu document, DOCTYPE included.
pub fn write_menu(tree: &MenuTree) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut writer, Event::DocType(BytesText::from_escaped(DOCTYPE)))?;
    for child in tree.children(tree.root()) {
        write_node(&mut writer, tree, child)?;
    }
    let mut out = String::from_utf8(writer.into_inner())
        .map_err(|error| MenuError::Internal(format!("menu writer produced invalid UTF-8: {error}")))?;
    out.push('\n');
    Ok(out)
}

fn write_node(writer: &mut Writer<Vec<u8>>, tree: &MenuTree, id: NodeId) -> Result<()> {
    let kind = tree.kind(id);
    let element = match kind {
        NodeKind::Passthrough { element } => element.as_str(),
        other => match other.tag().element_name() {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let mut start = BytesStart::new(element);
    match kind {
        NodeKind::LegacyDir {
            prefix: Some(prefix),
        } => start.push_attribute(("prefix", prefix.as_str())),
        NodeKind::Merge {
            merge_type: Some(merge_type),
        } => start.push_attribute(("type", merge_type.as_str())),
        _ => {}
    }

    let content = tree.content(id).filter(|content| !content.is_empty());
    if content.is_none() && tree.first_child(id).is_none() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    if let Some(content) = content {
        emit(writer, Event::Text(BytesText::new(content)))?;
    }
    for child in tree.children(id) {
        write_node(writer, tree, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(element)))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|error| MenuError::Internal(format!("failed to write menu XML: {error}")))
}
