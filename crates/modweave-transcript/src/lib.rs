//! # modweave transcript
//!
//! Data model for annotated multi-module transcripts and the parser that
//! produces it. A transcript carries a source region (the modules to build)
//! and a generated region (the output each module is expected to produce).

use std::fmt;

pub mod error;
pub mod parser;

pub use error::{ParseError, ParseErrorKind};
pub use parser::parse_transcript;

// =============================================================================
// Markers
// =============================================================================

/// Line that opens the source region.
pub const SOURCE_START_LINE: &str = "// SOURCE";
/// Line that opens the generated (expected output) region.
pub const GENERATED_START_LINE: &str = "// GENERATED";
/// Prefix of a module marker: `// MODULE: name[/dep1, dep2]`.
pub const MODULE_MARKER: &str = "// MODULE:";
/// Prefix of a file marker: `// FILE: Name.ext`.
pub const FILE_MARKER: &str = "// FILE:";

/// Module that exists in every region, even without a module marker.
pub const DEFAULT_MODULE: &str = "default-module";
/// File that receives text appearing before the first file marker of a module.
pub const DEFAULT_FILE: &str = "DefaultFile.kt";

// =============================================================================
// Core Types
// =============================================================================

/// Byte range into the transcript text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// One file owned by a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Relative path, `/` separated
    pub name: String,
    pub content: String,
    /// Span of the marker that introduced the file
    pub span: Span,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            span: Span::default(),
        }
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: ", self.name)?;
        write!(f, "{}", self.content)
    }
}

/// A module tag from the transcript with its declared dependencies and files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    /// Declared dependency names, in declaration order, without duplicates
    pub dependencies: Vec<String>,
    pub files: Vec<SourceFile>,
    /// Span of the first marker that introduced the module
    pub span: Span,
}

impl ModuleRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            files: Vec::new(),
            span: Span::default(),
        }
    }

    /// Builder-style dependency declaration, mostly for tests
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            self.add_dependency(dep.into());
        }
        self
    }

    /// Builder-style file addition, mostly for tests
    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push(SourceFile::new(name, content));
        self
    }

    pub fn add_dependency(&mut self, dep: String) {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }

    pub fn file(&self, name: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// One region of a transcript: an ordered list of modules.
///
/// The default module is always the first entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    modules: Vec<ModuleRecord>,
}

impl Section {
    /// A section holding only the (empty) default module
    pub fn new() -> Self {
        Self {
            modules: vec![ModuleRecord::new(DEFAULT_MODULE)],
        }
    }

    /// Build a section from explicit records, inserting the default module
    /// in front when it is not among them.
    pub fn from_modules(modules: Vec<ModuleRecord>) -> Self {
        let mut section = Self::new();
        for module in modules {
            match section.position(&module.name) {
                Some(idx) => section.modules[idx] = module,
                None => section.modules.push(module),
            }
        }
        section
    }

    pub fn modules(&self) -> &[ModuleRecord] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn default_module(&self) -> &ModuleRecord {
        &self.modules[0]
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name == name)
    }

    pub(crate) fn modules_mut(&mut self) -> &mut Vec<ModuleRecord> {
        &mut self.modules
    }
}

impl Default for Section {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub source: Section,
    pub generated: Section,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_always_has_default_module() {
        let section = Section::new();
        assert_eq!(section.modules().len(), 1);
        assert_eq!(section.default_module().name, DEFAULT_MODULE);
    }

    #[test]
    fn test_from_modules_keeps_default_first() {
        let section = Section::from_modules(vec![
            ModuleRecord::new("a"),
            ModuleRecord::new(DEFAULT_MODULE).with_file("X.kt", "x\n"),
        ]);

        let names: Vec<_> = section.modules().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec![DEFAULT_MODULE, "a"]);
        assert!(section.default_module().file("X.kt").is_some());
    }

    #[test]
    fn test_dependencies_deduplicated() {
        let module = ModuleRecord::new("c").depends_on(["a", "b", "a"]);
        assert_eq!(module.dependencies, vec!["a", "b"]);
    }
}
