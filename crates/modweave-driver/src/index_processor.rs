//! Library index processor
//!
//! Every module publishes the declarations annotated with `@Indexed` as one
//! `LibraryIndex_<hash>.idx` file. A module built with `index.main=true` also
//! collects every index on its classpath into `IndexRegistry.idx`.

use std::fs;

use modweave_index::{
    parse_index, render_index, IndexArtifact, IndexGenerator, IndexRegistry, ParsedIndex,
    INDEX_PREFIX, REGISTRY_NAME,
};
use modweave_transcript::SourceFile;
use tracing::debug;

use crate::backends::{Filer, ProcessingEnv, Processor};
use crate::error::{ProcessorError, UnitError};
use crate::output::list_files;
use crate::unit::BuildArgs;

/// Build argument that marks the entry module
pub const MAIN_ARG: &str = "index.main";
pub const INDEX_EXTENSION: &str = "idx";
pub const ANNOTATION: &str = "@Indexed";

const DECLARATION_KEYWORDS: &[&str] = &[
    "class", "interface", "object", "enum", "struct", "trait", "fun", "fn",
];

/// Final arguments used when the caller supplies none
pub fn default_final_args() -> BuildArgs {
    BuildArgs::from([(MAIN_ARG.to_string(), "true".to_string())])
}

/// A declaration marked with `@Indexed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedElement {
    /// Qualified by the file's package, if any
    pub name: String,
    pub file: String,
    /// 1-based line of the declaration
    pub line: usize,
}

/// Find every `@Indexed` declaration in `sources`.
pub fn discover_elements(sources: &[SourceFile]) -> Vec<IndexedElement> {
    let mut elements = Vec::new();

    for source in sources {
        let mut package: Option<String> = None;
        let mut pending = false;

        for (idx, line) in source.content.lines().enumerate() {
            let trimmed = line.trim();

            if let Some(rest) = trimmed.strip_prefix("package ") {
                package = Some(rest.trim().trim_end_matches(';').trim().to_string());
                continue;
            }

            let candidate = match strip_annotation(trimmed) {
                Some(rest) => {
                    pending = true;
                    rest
                }
                None if pending => trimmed,
                None => continue,
            };

            // Blank lines and further annotations keep the marker pending
            if candidate.is_empty() || candidate.starts_with('@') {
                continue;
            }

            pending = false;
            if let Some(simple) = declared_name(candidate) {
                let name = match &package {
                    Some(pkg) if !pkg.is_empty() => format!("{}.{}", pkg, simple),
                    _ => simple,
                };
                elements.push(IndexedElement {
                    name,
                    file: source.name.clone(),
                    line: idx + 1,
                });
            }
        }
    }

    elements
}

/// Text after a leading `@Indexed` annotation, `None` when absent
fn strip_annotation(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(ANNOTATION)?;
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => None,
        _ => Some(rest.trim_start_matches("()").trim()),
    }
}

/// Name declared on `line`: the first identifier after a declaration keyword.
fn declared_name(line: &str) -> Option<String> {
    // Generic parameter lists never hold the declared name
    let mut plain = String::with_capacity(line.len());
    let mut depth = 0usize;
    for c in line.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => plain.push(c),
            _ => {}
        }
    }

    let mut seen_keyword = false;
    for word in plain.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if word.is_empty() {
            continue;
        }
        if DECLARATION_KEYWORDS.contains(&word) {
            seen_keyword = true;
        } else if seen_keyword {
            return Some(word.to_string());
        }
    }
    None
}

/// Writes index artifacts through a [`Filer`]
struct FilerIndexWriter<'f> {
    filer: &'f mut Filer,
    written: Option<ParsedIndex>,
}

impl IndexGenerator for FilerIndexWriter<'_> {
    type Element = IndexedElement;
    type Error = UnitError;

    fn element_name(&self, element: &IndexedElement) -> String {
        element.name.clone()
    }

    fn write_index(&mut self, artifact: &IndexArtifact<'_, IndexedElement>) -> Result<(), UnitError> {
        let mut originating: Vec<String> = artifact
            .originating()
            .iter()
            .map(|e| e.file.clone())
            .collect();
        originating.sort();
        originating.dedup();

        let file = format!("{}.{}", artifact.name(), INDEX_EXTENSION);
        self.filer.write(&file, &render_index(artifact), originating)?;

        self.written = Some(ParsedIndex {
            name: artifact.name().to_string(),
            names: artifact.names().to_vec(),
        });
        Ok(())
    }
}

/// The library index processor
#[derive(Debug, Default)]
pub struct IndexProcessor;

impl IndexProcessor {
    pub fn new() -> Self {
        Self
    }

    fn collect_registry(env: &ProcessingEnv<'_>, own: Option<ParsedIndex>) -> Result<IndexRegistry, ProcessorError> {
        let mut registry = IndexRegistry::new();

        for dir in env.classpath {
            let files = list_files(dir).map_err(|e| UnitError::io(dir, e))?;
            for file in files {
                let is_index = file.starts_with(INDEX_PREFIX)
                    && file.ends_with(&format!(".{}", INDEX_EXTENSION));
                if !is_index {
                    continue;
                }
                let path = dir.join(&file);
                let text = fs::read_to_string(&path).map_err(|e| UnitError::io(&path, e))?;
                registry.add(parse_index(&text)?);
            }
        }

        if let Some(own) = own {
            registry.add(own);
        }
        Ok(registry)
    }
}

impl Processor for IndexProcessor {
    fn name(&self) -> &str {
        "library-index"
    }

    fn process(&mut self, env: &ProcessingEnv<'_>, filer: &mut Filer) -> Result<(), ProcessorError> {
        let elements = discover_elements(env.sources);
        debug!(module = env.module, elements = elements.len(), "discovered elements");

        let mut writer = FilerIndexWriter {
            filer: &mut *filer,
            written: None,
        };
        writer.generate(&elements)?;
        let own = writer.written.take();

        if env.arg(MAIN_ARG) != Some("true") {
            return Ok(());
        }

        let registry = Self::collect_registry(env, own)?;
        if registry.is_empty() {
            return Ok(());
        }

        let originating = env.sources.iter().map(|s| s.name.clone()).collect();
        filer.write(
            &format!("{}.{}", REGISTRY_NAME, INDEX_EXTENSION),
            &registry.render(),
            originating,
        )?;
        Ok(())
    }
}
