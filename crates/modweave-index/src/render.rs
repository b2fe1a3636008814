//! Text form of index artifacts and the registry that merges them
//!
//! An index renders as:
//!
//! ```text
//! index LibraryIndex_af680f51ba10b21c
//!   Bar
//!   Foo
//! end
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::error::IndexError;
use crate::generator::{IndexArtifact, INDEX_PREFIX};
use crate::naming::stable_name;

/// Name of the merged registry artifact
pub const REGISTRY_NAME: &str = "IndexRegistry";

const ELEMENT_INDENT: &str = "  ";

/// Render an artifact into its canonical text form
pub fn render_index<E>(artifact: &IndexArtifact<'_, E>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "index {}", artifact.name());
    for name in artifact.names() {
        let _ = writeln!(out, "{}{}", ELEMENT_INDENT, name);
    }
    out.push_str("end\n");
    out
}

/// An index artifact read back from its text form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIndex {
    pub name: String,
    pub names: Vec<String>,
}

/// Parse the text form produced by [`render_index`].
///
/// Element lines carry a two-space indent; only an unindented `end` closes the
/// index, so elements named `end` or `index` read back unchanged. The name is
/// checked against the listed element names, so a hand-edited or truncated
/// index is rejected.
pub fn parse_index(text: &str) -> Result<ParsedIndex, IndexError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end()))
        .filter(|(_, l)| !l.is_empty());

    let (line, header) = lines.next().ok_or(IndexError::Malformed {
        line: 1,
        message: "empty index".to_string(),
    })?;

    let name = header
        .strip_prefix("index ")
        .map(str::trim)
        .filter(|n| n.starts_with(INDEX_PREFIX))
        .ok_or_else(|| IndexError::Malformed {
            line,
            message: format!("expected `index {}<hash>`", INDEX_PREFIX),
        })?
        .to_string();

    let mut names = Vec::new();
    let mut closed = false;
    for (line, content) in lines {
        if closed {
            return Err(IndexError::Malformed {
                line,
                message: "content after `end`".to_string(),
            });
        }
        if content == "end" {
            closed = true;
            continue;
        }

        match content.strip_prefix(ELEMENT_INDENT) {
            Some(element) if !element.starts_with(char::is_whitespace) => {
                names.push(element.to_string());
            }
            _ => {
                return Err(IndexError::Malformed {
                    line,
                    message: "expected an element indented by two spaces or `end`".to_string(),
                })
            }
        }
    }

    if !closed {
        return Err(IndexError::Malformed {
            line: text.lines().count(),
            message: "missing `end`".to_string(),
        });
    }

    let expected = format!("{}{}", INDEX_PREFIX, stable_name(&names));
    if expected != name {
        return Err(IndexError::NameMismatch { name, expected });
    }

    Ok(ParsedIndex { name, names })
}

/// Merge of every index visible to an entry module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRegistry {
    indexes: BTreeMap<String, Vec<String>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an index. The same index seen twice is recorded once.
    pub fn add(&mut self, index: ParsedIndex) {
        self.indexes.insert(index.name, index.names);
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Every element name across all indexes, sorted and distinct
    pub fn elements(&self) -> BTreeSet<&str> {
        self.indexes
            .values()
            .flat_map(|names| names.iter().map(String::as_str))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "registry {}", REGISTRY_NAME);
        for (name, names) in &self.indexes {
            let _ = writeln!(out, "  {}: {}", name, names.join(", "));
        }
        out.push_str("elements\n");
        for element in self.elements() {
            let _ = writeln!(out, "  {}", element);
        }
        out.push_str("end\n");
        out
    }
}
