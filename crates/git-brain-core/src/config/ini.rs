//! Hand-rolled parser and serializer for the brain/consumer descriptor
//! grammar: `[SECTION]` and `[SECTION:id]` headers, `key = value` entries,
//! `;`/`#` comment lines, case-sensitive keys, insertion order preserved.
//!
//! No crate in the ecosystem parses this exact dynamic-section grammar
//! (`[BRAIN:<id>]`), so this mirrors the style of the project's other
//! purpose-built line formats rather than adapting a generic INI crate.

/// One `key = value` entry as written, in original insertion order.
pub type Entry = (String, String);

/// A single `[NAME]` or `[NAME:id]` block and its ordered entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSection {
    /// The full header text between the brackets, e.g. `"EXPORT"` or
    /// `"BRAIN:our-lib"`.
    pub name: String,
    pub entries: Vec<Entry>,
}

impl IniSection {
    /// First value for `key`, if present (case-sensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The part of the section name after the first `:`, if any
    /// (e.g. `"our-lib"` for `"BRAIN:our-lib"`).
    pub fn id_suffix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(_, id)| id)
    }

    /// The part of the section name before the first `:`.
    pub fn base_name(&self) -> &str {
        self.name.split_once(':').map_or(&self.name, |(b, _)| b)
    }
}

/// A full descriptor file: an ordered list of sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    pub sections: Vec<IniSection>,
}

impl IniDocument {
    /// First section with an exact name match.
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// All sections whose base name (before any `:`) matches `base`, in
    /// document order — used for repeated `[BRAIN:id]` blocks.
    pub fn sections_with_base(&self, base: &str) -> impl Iterator<Item = &IniSection> {
        self.sections.iter().filter(move |s| s.base_name() == base)
    }
}

/// Parse error detail; the caller (config::brain/consumer) wraps this with
/// the file path into a [`crate::error::ConfigError::ParseFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Parse descriptor text into an [`IniDocument`].
pub fn parse(text: &str) -> Result<IniDocument, ParseError> {
    let mut doc = IniDocument::default();
    let mut current: Option<IniSection> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(inner) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(section) = current.take() {
                doc.sections.push(section);
            }
            current = Some(IniSection {
                name: inner.trim().to_string(),
                entries: Vec::new(),
            });
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(ParseError {
                line: line_no,
                message: format!("expected `key = value` or `[section]`, got: {raw_line}"),
            });
        };

        let Some(section) = current.as_mut() else {
            return Err(ParseError {
                line: line_no,
                message: "key = value entry appears before any [section] header".to_string(),
            });
        };

        section
            .entries
            .push((key.trim().to_string(), value.trim().to_string()));
    }

    if let Some(section) = current.take() {
        doc.sections.push(section);
    }

    Ok(doc)
}

/// Serialize an [`IniDocument`] back to descriptor text, preserving section
/// and key order exactly as stored.
pub fn serialize(doc: &IniDocument) -> String {
    let mut out = String::new();
    for section in &doc.sections {
        out.push('[');
        out.push_str(&section.name);
        out.push_str("]\n");
        for (key, value) in &section.entries {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
    }
    // Drop the trailing blank line between the last section and EOF.
    if out.ends_with("\n\n") {
        out.truncate(out.len() - 1);
    }
    out
}
