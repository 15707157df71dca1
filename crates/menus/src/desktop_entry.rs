//! Key/value reader for `.desktop` and `.directory` files.
//!
//! Only the `[Desktop Entry]` group is kept. Values are stored raw; the
//! typed accessors interpret them on demand.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{MenuError, Result};

const MAIN_GROUP: &str = "[Desktop Entry]";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopEntryFile {
    entries: HashMap<String, String>,
}

impl DesktopEntryFile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|error| MenuError::io(path, error))?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        let mut in_main_group = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_main_group = line == MAIN_GROUP;
                continue;
            }
            if !in_main_group {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                // First occurrence of a key wins.
                entries
                    .entry(key.trim().to_string())
                    .or_insert_with(|| value.trim().to_string());
            }
        }

        Self { entries }
    }

    /// Raw value with the basic escapes (`\s`, `\n`, `\t`, `\r`, `\\`) undone.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|value| unescape(value))
    }

    /// Tries `key[locale]`, then `key[lang_COUNTRY]` minus modifiers,
    /// then `key[lang]`, and finally plain `key`.
    pub fn get_locale_string(&self, key: &str, locale: Option<&str>) -> Option<String> {
        if let Some(locale) = locale {
            for candidate in locale_candidates(locale) {
                if let Some(value) = self.get_string(&format!("{key}[{candidate}]")) {
                    return Some(value);
                }
            }
        }
        self.get_string(key)
    }

    /// `;`-separated list. `\;` is a literal semicolon; the empty element
    /// left by a trailing terminator is dropped.
    pub fn get_strings(&self, key: &str) -> Option<Vec<String>> {
        self.entries.get(key).map(|value| split_list(value))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.entries
            .get(key)
            .map(|value| value == "true" || value == "1")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

fn locale_candidates(locale: &str) -> Vec<String> {
    let without_encoding = match locale.split_once('.') {
        Some((head, rest)) => match rest.split_once('@') {
            Some((_, modifier)) => format!("{head}@{modifier}"),
            None => head.to_string(),
        },
        None => locale.to_string(),
    };
    let mut candidates = vec![without_encoding.clone()];
    let (base, modifier) = match without_encoding.split_once('@') {
        Some((base, modifier)) => (base.to_string(), Some(modifier.to_string())),
        None => (without_encoding.clone(), None),
    };
    if modifier.is_some() {
        candidates.push(base.clone());
    }
    if let Some((lang, _country)) = base.split_once('_') {
        if let Some(modifier) = &modifier {
            candidates.push(format!("{lang}@{modifier}"));
        }
        candidates.push(lang.to_string());
    }
    candidates.dedup();
    candidates
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(';') => current.push(';'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            ';' => items.push(unescape(&std::mem::take(&mut current))),
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        items.push(unescape(&current));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# comment
[Desktop Entry]
Type=Application
Name=Text Editor
Name[de]=Texteditor
Name[sr@latin]=Uređivač
Categories=Utility;TextEditor;
Keywords=edit\\;write;notes
NoDisplay=false
Comment=Line\\sone

[Desktop Action new]
Name=New Window
";

    #[test]
    fn reads_only_main_group() {
        let entry = DesktopEntryFile::parse(SAMPLE);
        assert_eq!(entry.get_string("Name").as_deref(), Some("Text Editor"));
        assert_eq!(entry.get_string("Comment").as_deref(), Some("Line one"));
        assert_eq!(entry.get_bool("NoDisplay"), Some(false));
        assert_eq!(entry.get_bool("Hidden"), None);
    }

    #[test]
    fn lists_drop_trailing_terminator() {
        let entry = DesktopEntryFile::parse(SAMPLE);
        assert_eq!(
            entry.get_strings("Categories"),
            Some(vec!["Utility".to_string(), "TextEditor".to_string()])
        );
        assert_eq!(
            entry.get_strings("Keywords"),
            Some(vec!["edit;write".to_string(), "notes".to_string()])
        );
    }

    #[test]
    fn locale_lookup_falls_back() {
        let entry = DesktopEntryFile::parse(SAMPLE);
        assert_eq!(
            entry.get_locale_string("Name", Some("de_DE.UTF-8")).as_deref(),
            Some("Texteditor")
        );
        assert_eq!(
            entry.get_locale_string("Name", Some("sr_RS@latin")).as_deref(),
            Some("Uređivač")
        );
        assert_eq!(
            entry.get_locale_string("Name", Some("fr")).as_deref(),
            Some("Text Editor")
        );
        assert_eq!(entry.get_locale_string("Name", None).as_deref(), Some("Text Editor"));
    }
}
