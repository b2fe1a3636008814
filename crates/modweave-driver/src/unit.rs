//! The compilation unit contract
//!
//! The scheduler only talks to modules through [`CompileUnit`]. Backends decide
//! what "compile" means: running in-process processors, or spawning an external
//! tool.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::UnitError;

/// Extra key/value arguments handed to a compile call
pub type BuildArgs = BTreeMap<String, String>;

/// Verdict of one compile call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    Ok,
    CompilationError,
    InternalError,
    ScriptError,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Ok => 0,
            ExitStatus::CompilationError => 1,
            ExitStatus::InternalError => 2,
            ExitStatus::ScriptError => 3,
        }
    }

    /// Map a process exit code. Unknown non-zero codes count as internal errors.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitStatus::Ok,
            1 => ExitStatus::CompilationError,
            3 => ExitStatus::ScriptError,
            _ => ExitStatus::InternalError,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ExitStatus::Ok
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Ok => write!(f, "OK"),
            ExitStatus::CompilationError => write!(f, "COMPILATION_ERROR"),
            ExitStatus::InternalError => write!(f, "INTERNAL_ERROR"),
            ExitStatus::ScriptError => write!(f, "SCRIPT_ERROR"),
        }
    }
}

/// A resolved direct dependency as seen by the depending unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyHandle {
    pub name: String,
    pub output_dir: PathBuf,
}

/// Dependencies of a unit after resolution against the full module set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDependencies {
    /// Declared dependencies, in declaration order
    pub direct: Vec<DependencyHandle>,
    /// Output directories of all transitive dependencies, nearest first
    pub classpath: Vec<PathBuf>,
}

/// A file produced by a compile call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the unit's output directory, `/` separated
    pub path: String,
    /// Source files the output was derived from
    pub originating: Vec<String>,
}

/// One module as the scheduler sees it
pub trait CompileUnit {
    fn name(&self) -> &str;

    /// Declared dependency names, unresolved
    fn dependency_names(&self) -> &[String];

    /// Called once, after every dependency name resolved
    fn resolve_dependencies(&mut self, resolved: ResolvedDependencies);

    /// Blocking compile. `Err` means the unit could not run at all.
    fn compile(&mut self, args: &BuildArgs) -> Result<ExitStatus, UnitError>;

    fn is_compiled(&self) -> bool;

    fn output_dir(&self) -> &Path;

    fn generated_files(&self) -> &[GeneratedFile] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        for status in [
            ExitStatus::Ok,
            ExitStatus::CompilationError,
            ExitStatus::InternalError,
            ExitStatus::ScriptError,
        ] {
            assert_eq!(ExitStatus::from_code(status.code()), status);
        }
        assert_eq!(ExitStatus::from_code(101), ExitStatus::InternalError);
        assert!(!ExitStatus::from_code(-1).is_ok());
    }
}
