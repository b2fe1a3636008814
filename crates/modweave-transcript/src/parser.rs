//! Transcript parser
//!
//! Splits a transcript into its source and generated regions and each region
//! into per-module, per-file chunks. Text between markers accumulates into the
//! current file, one line at a time.

use std::collections::HashSet;

use crate::error::{ParseError, ParseErrorKind, ParseResult};
use crate::{
    Section, SourceFile, Span, Transcript, DEFAULT_FILE, FILE_MARKER, GENERATED_START_LINE,
    MODULE_MARKER, SOURCE_START_LINE,
};

/// A line of the transcript without its terminator
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    text: &'a str,
    span: Span,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;

    for raw in text.split_inclusive('\n') {
        let body = raw.strip_suffix('\n').unwrap_or(raw);
        let body = body.strip_suffix('\r').unwrap_or(body);
        lines.push(Line {
            text: body,
            span: Span::new(offset, offset + body.len()),
        });
        offset += raw.len();
    }

    lines
}

/// Parse a complete transcript.
///
/// Everything before the `// SOURCE` line is ignored. The source region runs
/// up to the `// GENERATED` line; without one the generated region is empty.
pub fn parse_transcript(text: &str) -> ParseResult<Transcript> {
    let lines = split_lines(text);

    let start = lines
        .iter()
        .position(|l| l.text.trim() == SOURCE_START_LINE)
        .ok_or_else(|| ParseError::new(ParseErrorKind::MissingSourceMarker, Span::new(0, 0)))?;

    let rest = &lines[start + 1..];
    let (source_lines, generated_lines) =
        match rest.iter().position(|l| l.text.trim() == GENERATED_START_LINE) {
            Some(split) => (&rest[..split], &rest[split + 1..]),
            None => (rest, &[][..]),
        };

    Ok(Transcript {
        source: parse_section(source_lines)?,
        generated: parse_section(generated_lines)?,
    })
}

fn parse_section(lines: &[Line<'_>]) -> ParseResult<Section> {
    let mut builder = SectionBuilder::new();

    for line in lines {
        let trimmed = line.text.trim();

        if let Some(rest) = trimmed.strip_prefix(MODULE_MARKER) {
            let (name, deps) = parse_module_marker(rest).map_err(|msg| {
                ParseError::new(ParseErrorKind::MalformedModuleMarker(msg), line.span)
            })?;
            builder.open_module(name, deps, line.span);
        } else if let Some(rest) = trimmed.strip_prefix(FILE_MARKER) {
            let name = parse_file_marker(rest).map_err(|msg| {
                ParseError::new(ParseErrorKind::MalformedFileMarker(msg), line.span)
            })?;
            builder.open_file(name, line.span);
        } else {
            builder.append(line.text);
        }
    }

    Ok(builder.finish())
}

/// Accumulates markers and text into a [`Section`]
struct SectionBuilder {
    section: Section,
    module: usize,
    /// `None` until the current module receives a file marker or text
    file: Option<usize>,
    /// (module, file) pairs introduced by an explicit file marker
    explicit: HashSet<(String, String)>,
}

impl SectionBuilder {
    fn new() -> Self {
        Self {
            section: Section::new(),
            module: 0,
            file: None,
            explicit: HashSet::new(),
        }
    }

    fn open_module(&mut self, name: String, deps: Vec<String>, span: Span) {
        let idx = match self.section.position(&name) {
            Some(idx) => idx,
            None => {
                let modules = self.section.modules_mut();
                let mut record = crate::ModuleRecord::new(name);
                record.span = span;
                modules.push(record);
                modules.len() - 1
            }
        };

        let record = &mut self.section.modules_mut()[idx];
        for dep in deps {
            record.add_dependency(dep);
        }

        self.module = idx;
        self.file = None;
    }

    fn open_file(&mut self, name: String, span: Span) {
        let record = &mut self.section.modules_mut()[self.module];
        self.explicit.insert((record.name.clone(), name.clone()));

        let idx = match record.files.iter().position(|f| f.name == name) {
            Some(idx) => idx,
            None => {
                let mut file = SourceFile::new(name, String::new());
                file.span = span;
                record.files.push(file);
                record.files.len() - 1
            }
        };
        self.file = Some(idx);
    }

    fn append(&mut self, text: &str) {
        let record = &mut self.section.modules_mut()[self.module];

        let idx = match self.file {
            Some(idx) => idx,
            None => match record.files.iter().position(|f| f.name == DEFAULT_FILE) {
                Some(idx) => idx,
                None => {
                    record.files.push(SourceFile::new(DEFAULT_FILE, String::new()));
                    record.files.len() - 1
                }
            },
        };
        self.file = Some(idx);

        let content = &mut record.files[idx].content;
        content.push_str(text);
        content.push('\n');
    }

    fn finish(mut self) -> Section {
        let explicit = &self.explicit;
        for record in self.section.modules_mut().iter_mut() {
            let module = record.name.clone();
            // Blank text before the first file marker does not make a file
            record.files.retain(|f| {
                explicit.contains(&(module.clone(), f.name.clone()))
                    || !f.content.trim().is_empty()
            });
        }
        self.section
    }
}

fn is_module_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parse the text after `// MODULE:` into a name and its dependency names
fn parse_module_marker(rest: &str) -> Result<(String, Vec<String>), String> {
    let (name_part, deps_part) = match rest.split_once('/') {
        Some((name, deps)) => (name, Some(deps)),
        None => (rest, None),
    };

    let name = name_part.trim();
    if !is_module_name(name) {
        return Err(format!("invalid module name `{}`", name));
    }

    let mut deps: Vec<String> = Vec::new();
    if let Some(deps_part) = deps_part {
        for dep in deps_part.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            if !is_module_name(dep) {
                return Err(format!("invalid dependency name `{}` for module `{}`", dep, name));
            }
            if !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        }
    }

    Ok((name.to_string(), deps))
}

/// Parse the text after `// FILE:` into a relative file path
fn parse_file_marker(rest: &str) -> Result<String, String> {
    let name = rest.trim();
    if name.is_empty() {
        return Err("missing file name".to_string());
    }

    let segments: Vec<&str> = name.split('/').collect();
    for segment in &segments {
        let valid = !segment.is_empty()
            && *segment != "."
            && *segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(format!("invalid file name `{}`", name));
        }
    }

    let last = segments[segments.len() - 1];
    match last.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < last.len() => Ok(name.to_string()),
        _ => Err(format!("file name `{}` has no extension", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_MODULE;

    #[test]
    fn test_single_default_module() {
        let text = "\
header text
// SOURCE
class Foo
// GENERATED
class FooGenerated
";
        let transcript = parse_transcript(text).unwrap();

        assert_eq!(transcript.source.modules().len(), 1);
        let module = transcript.source.default_module();
        assert_eq!(module.name, DEFAULT_MODULE);
        assert_eq!(module.files.len(), 1);
        assert_eq!(module.files[0].name, DEFAULT_FILE);
        assert_eq!(module.files[0].content, "class Foo\n");

        let generated = transcript.generated.default_module();
        assert_eq!(generated.files[0].content, "class FooGenerated\n");
    }

    #[test]
    fn test_modules_with_dependencies() {
        let text = "\
// SOURCE
// MODULE: lib-a
// FILE: A.kt
class A
// MODULE: lib-b / lib-a
// FILE: B.kt
class B
// MODULE: main / lib-a, lib-b
// FILE: Main.kt
fun main() {}
";
        let transcript = parse_transcript(text).unwrap();
        let names: Vec<_> = transcript
            .source
            .modules()
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec![DEFAULT_MODULE, "lib-a", "lib-b", "main"]);

        let main = transcript.source.module("main").unwrap();
        assert_eq!(main.dependencies, vec!["lib-a", "lib-b"]);
        assert_eq!(main.file("Main.kt").unwrap().content, "fun main() {}\n");

        // Default module exists but owns no files
        assert!(transcript.source.default_module().files.is_empty());
        // Generated region is empty apart from the default module
        assert_eq!(transcript.generated.modules().len(), 1);
    }

    #[test]
    fn test_multiple_files_per_module() {
        let text = "\
// SOURCE
// MODULE: a
// FILE: One.kt
one
// FILE: nested/Two.kt
two
two again
";
        let transcript = parse_transcript(text).unwrap();
        let a = transcript.source.module("a").unwrap();
        assert_eq!(a.files.len(), 2);
        assert_eq!(a.files[1].name, "nested/Two.kt");
        assert_eq!(a.files[1].content, "two\ntwo again\n");
    }

    #[test]
    fn test_reopened_module_merges_dependencies() {
        let text = "\
// SOURCE
// MODULE: x
// MODULE: y / x
// FILE: Y1.kt
y1
// MODULE: y / z, x
// FILE: Y2.kt
y2
// MODULE: z
";
        let transcript = parse_transcript(text).unwrap();
        let y = transcript.source.module("y").unwrap();
        assert_eq!(y.dependencies, vec!["x", "z"]);
        assert_eq!(y.files.len(), 2);
    }

    #[test]
    fn test_blank_default_file_dropped() {
        let text = "\
// SOURCE
// MODULE: a

// FILE: A.kt
a
";
        let transcript = parse_transcript(text).unwrap();
        let a = transcript.source.module("a").unwrap();
        assert_eq!(a.files.len(), 1);
        assert_eq!(a.files[0].name, "A.kt");
    }

    #[test]
    fn test_explicit_empty_file_kept() {
        let text = "\
// SOURCE
// FILE: Empty.kt
// FILE: Other.kt
other
";
        let transcript = parse_transcript(text).unwrap();
        let module = transcript.source.default_module();
        assert_eq!(module.files.len(), 2);
        assert_eq!(module.files[0].content, "");
    }

    #[test]
    fn test_missing_source_marker() {
        let err = parse_transcript("class Foo\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingSourceMarker);
    }

    #[test]
    fn test_malformed_module_marker_span() {
        let text = "// SOURCE\n// MODULE: bad name\n";
        let err = parse_transcript(text).unwrap_err();

        assert!(matches!(err.kind, ParseErrorKind::MalformedModuleMarker(_)));
        assert_eq!(&text[err.span.start..err.span.end], "// MODULE: bad name");
    }

    #[test]
    fn test_malformed_dependency_name() {
        let text = "// SOURCE\n// MODULE: a / b c\n";
        let err = parse_transcript(text).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MalformedModuleMarker(_)));
    }

    #[test]
    fn test_malformed_file_marker() {
        for marker in [
            "// FILE:",
            "// FILE: NoExtension",
            "// FILE: a//B.kt",
            "// FILE: .kt",
            "// FILE: ../x.kt",
            "// FILE: ../../escape.kt",
            "// FILE: pkg/./A.kt",
            "// FILE: pkg/../../A.kt",
        ] {
            let text = format!("// SOURCE\n{}\n", marker);
            let err = parse_transcript(&text).unwrap_err();
            assert!(
                matches!(err.kind, ParseErrorKind::MalformedFileMarker(_)),
                "marker {:?} gave {:?}",
                marker,
                err
            );
        }
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = "// SOURCE\r\n// MODULE: a\r\n// FILE: A.kt\r\nline\r\n";
        let transcript = parse_transcript(text).unwrap();
        let a = transcript.source.module("a").unwrap();
        assert_eq!(a.files[0].content, "line\n");
    }
}
