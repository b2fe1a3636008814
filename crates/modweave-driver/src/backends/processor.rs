//! In-process backend: runs source processors over a module's files

use std::fs;
use std::path::{Path, PathBuf};

use modweave_transcript::{ModuleRecord, SourceFile};
use tracing::{debug, warn};

use crate::error::{ProcessorError, UnitError};
use crate::output::{join_relative, reset_dir};
use crate::unit::{BuildArgs, CompileUnit, ExitStatus, GeneratedFile, ResolvedDependencies};

/// What a processor sees of the module being compiled
#[derive(Debug)]
pub struct ProcessingEnv<'a> {
    pub module: &'a str,
    pub sources: &'a [SourceFile],
    pub args: &'a BuildArgs,
    /// Output directories of all transitive dependencies
    pub classpath: &'a [PathBuf],
}

impl ProcessingEnv<'_> {
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }
}

/// Writes generated files below a unit's output directory
#[derive(Debug)]
pub struct Filer {
    root: PathBuf,
    generated: Vec<GeneratedFile>,
}

impl Filer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            generated: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `content` to `relative` (a `/` separated path).
    ///
    /// Each path can be written once per round.
    pub fn write(&mut self, relative: &str, content: &str, originating: Vec<String>) -> Result<(), UnitError> {
        if self.generated.iter().any(|g| g.path == relative) {
            return Err(UnitError::DuplicateOutput(relative.to_string()));
        }

        let path = join_relative(&self.root, relative)
            .ok_or_else(|| UnitError::InvalidPath(relative.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| UnitError::io(parent, e))?;
        }
        fs::write(&path, content).map_err(|e| UnitError::io(&path, e))?;

        debug!(file = relative, bytes = content.len(), "generated file");
        self.generated.push(GeneratedFile {
            path: relative.to_string(),
            originating,
        });
        Ok(())
    }

    pub fn into_generated(self) -> Vec<GeneratedFile> {
        self.generated
    }
}

/// A source processor run inside the driver process
pub trait Processor {
    fn name(&self) -> &str;

    fn process(&mut self, env: &ProcessingEnv<'_>, filer: &mut Filer) -> Result<(), ProcessorError>;
}

/// Compilation unit backed by in-process processors
pub struct ProcessorUnit {
    name: String,
    dependency_names: Vec<String>,
    sources: Vec<SourceFile>,
    processors: Vec<Box<dyn Processor>>,
    output_dir: PathBuf,
    classpath: Vec<PathBuf>,
    generated: Vec<GeneratedFile>,
    compiled: bool,
}

impl ProcessorUnit {
    pub fn new(record: &ModuleRecord, output_dir: PathBuf, processors: Vec<Box<dyn Processor>>) -> Self {
        Self {
            name: record.name.clone(),
            dependency_names: record.dependencies.clone(),
            sources: record.files.clone(),
            processors,
            output_dir,
            classpath: Vec::new(),
            generated: Vec::new(),
            compiled: false,
        }
    }

    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }
}

impl CompileUnit for ProcessorUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependency_names(&self) -> &[String] {
        &self.dependency_names
    }

    fn resolve_dependencies(&mut self, resolved: ResolvedDependencies) {
        self.classpath = resolved.classpath;
    }

    fn compile(&mut self, args: &BuildArgs) -> Result<ExitStatus, UnitError> {
        self.compiled = false;
        reset_dir(&self.output_dir).map_err(|e| UnitError::io(&self.output_dir, e))?;

        let env = ProcessingEnv {
            module: &self.name,
            sources: &self.sources,
            args,
            classpath: &self.classpath,
        };
        let mut filer = Filer::new(&self.output_dir);

        for processor in self.processors.iter_mut() {
            match processor.process(&env, &mut filer) {
                Ok(()) => {}
                Err(ProcessorError::Unit(err)) => return Err(err),
                Err(err) => {
                    warn!(processor = processor.name(), error = %err, "processor reported an error");
                    self.generated = filer.into_generated();
                    return Ok(ExitStatus::CompilationError);
                }
            }
        }

        self.generated = filer.into_generated();
        self.compiled = true;
        Ok(ExitStatus::Ok)
    }

    fn is_compiled(&self) -> bool {
        self.compiled
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn generated_files(&self) -> &[GeneratedFile] {
        &self.generated
    }
}
