//! Error types for scheduling, compilation units and runs

use std::fmt;
use std::io;
use std::path::PathBuf;

use modweave_index::IndexError;
use modweave_transcript::ParseError;
use thiserror::Error;

use crate::unit::ExitStatus;

/// Failure inside a compilation unit that is not a compiler verdict
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid classpath entry: {0}")]
    Classpath(String),

    #[error("file `{0}` was already generated in this round")]
    DuplicateOutput(String),

    #[error("path `{0}` escapes the module directory")]
    InvalidPath(String),
}

impl UnitError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error raised by an in-process processor
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("{0}")]
    Message(String),
}

/// A module that could not become ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedModule {
    pub module: String,
    /// Declared dependencies that never compiled
    pub waiting_on: Vec<String>,
}

impl fmt::Display for BlockedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (waiting on {})", self.module, self.waiting_on.join(", "))
    }
}

fn join_blocked(blocked: &[BlockedModule]) -> String {
    blocked
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal outcome of resolving or scheduling a module graph
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate module `{0}`")]
    DuplicateModule(String),

    #[error("module `{module}` depends on unknown module `{dependency}`")]
    UnresolvedDependency { module: String, dependency: String },

    #[error("module `{module}` depends on itself")]
    SelfDependency { module: String },

    #[error("dependency cycle detected: {}; blocked: {}", .cycle.join(" -> "), join_blocked(.blocked))]
    Cycle {
        /// One cycle among the blocked modules, first module repeated at the end
        cycle: Vec<String>,
        blocked: Vec<BlockedModule>,
    },

    #[error("no progress: {} reported OK without being compiled", .ready.join(", "))]
    NoProgress { ready: Vec<String> },

    #[error("module `{module}` failed to compile: {status}")]
    CompileFailed { module: String, status: ExitStatus },

    #[error("module `{module}`: {source}")]
    Unit {
        module: String,
        #[source]
        source: UnitError,
    },
}

impl BuildError {
    /// Errors detected before any compile call
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BuildError::DuplicateModule(_)
                | BuildError::UnresolvedDependency { .. }
                | BuildError::SelfDependency { .. }
        )
    }
}

/// Top-level error of a transcript run
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to prepare work directory {}: {source}", .path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read generated output of `{module}` at {}: {source}", .path.display())]
    Output {
        module: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
