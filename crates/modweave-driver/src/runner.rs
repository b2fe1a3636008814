//! Transcript run pipeline: parse → build units → schedule → verify

use std::fs;
use std::path::{Path, PathBuf};

use modweave_transcript::{parse_transcript, ModuleRecord, Transcript};
use tempfile::TempDir;
use tracing::{info, info_span};

use crate::backends::{CommandUnit, ProcessorUnit};
use crate::dep_graph::{BuildReport, ModuleGraph};
use crate::error::DriverError;
use crate::index_processor::{default_final_args, IndexProcessor};
use crate::unit::{BuildArgs, CompileUnit};
use crate::verify::{verify_outputs, Verification};

/// Environment variable naming the work directory
pub const WORK_DIR_ENV: &str = "MODWEAVE_WORK_DIR";

/// Settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Arguments for the final wave
    pub final_args: BuildArgs,
    /// Where module directories go; a temporary directory when `None`
    pub work_dir: Option<PathBuf>,
    /// Keep the temporary directory after the run
    pub keep_outputs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            final_args: default_final_args(),
            work_dir: None,
            keep_outputs: false,
        }
    }
}

/// Creates the compilation unit for one module record
pub trait UnitFactory {
    /// `module_dir` is a directory reserved for this module
    fn create(&self, record: &ModuleRecord, module_dir: &Path) -> Box<dyn CompileUnit>;
}

/// Units running the library index processor in-process
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexProcessorFactory;

impl UnitFactory for IndexProcessorFactory {
    fn create(&self, record: &ModuleRecord, module_dir: &Path) -> Box<dyn CompileUnit> {
        Box::new(ProcessorUnit::new(
            record,
            module_dir.join("generated"),
            vec![Box::new(IndexProcessor::new())],
        ))
    }
}

/// Units running an external command
#[derive(Debug, Clone)]
pub struct CommandFactory {
    pub program: String,
    pub args: Vec<String>,
}

impl UnitFactory for CommandFactory {
    fn create(&self, record: &ModuleRecord, module_dir: &Path) -> Box<dyn CompileUnit> {
        Box::new(CommandUnit::new(
            record,
            module_dir,
            self.program.clone(),
            self.args.clone(),
        ))
    }
}

/// Outcome of a run that compiled every module
#[derive(Debug)]
pub struct RunReport {
    pub build: BuildReport,
    pub verification: Verification,
    /// Set when outputs were kept on disk
    pub work_dir: Option<PathBuf>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.verification.is_success()
    }
}

/// Either a caller-provided directory or a temporary one
enum WorkDir {
    Fixed(PathBuf),
    Temp(TempDir),
}

impl WorkDir {
    fn new(config: &RunConfig) -> Result<Self, DriverError> {
        match &config.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|source| DriverError::WorkDir {
                    path: dir.clone(),
                    source,
                })?;
                Ok(WorkDir::Fixed(dir.clone()))
            }
            None => tempfile::Builder::new()
                .prefix("modweave-")
                .tempdir()
                .map(WorkDir::Temp)
                .map_err(|source| DriverError::WorkDir {
                    path: std::env::temp_dir(),
                    source,
                }),
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Fixed(dir) => dir,
            WorkDir::Temp(dir) => dir.path(),
        }
    }

    /// Path to report back, persisting a temporary directory when asked to
    fn finish(self, keep: bool) -> Option<PathBuf> {
        match self {
            WorkDir::Fixed(dir) => Some(dir),
            WorkDir::Temp(dir) if keep => Some(dir.into_path()),
            WorkDir::Temp(_) => None,
        }
    }
}

/// Build every source module of `transcript` and verify the generated region.
///
/// Configuration, cycle and compile failures are errors; verification
/// mismatches are reported in the returned [`RunReport`].
pub fn run_transcript(
    transcript: &Transcript,
    config: &RunConfig,
    factory: &dyn UnitFactory,
) -> Result<RunReport, DriverError> {
    let work_dir = WorkDir::new(config)?;
    let span = info_span!("run", work_dir = %work_dir.path().display());
    let _enter = span.enter();

    let mut graph = ModuleGraph::new();
    for record in transcript.source.modules() {
        let unit = factory.create(record, &work_dir.path().join(&record.name));
        graph.add_unit(unit)?;
    }

    let build = graph.schedule_and_build(&config.final_args)?;
    let verification = verify_outputs(graph.outputs(), &transcript.generated)?;
    info!(
        waves = build.waves.len(),
        matched = verification.matched,
        mismatches = verification.mismatches.len(),
        "run finished"
    );

    Ok(RunReport {
        build,
        verification,
        work_dir: work_dir.finish(config.keep_outputs),
    })
}

/// Read, parse and run a transcript file
pub fn run_file(path: &Path, config: &RunConfig, factory: &dyn UnitFactory) -> Result<RunReport, DriverError> {
    let text = fs::read_to_string(path).map_err(|source| DriverError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let transcript = parse_transcript(&text)?;
    run_transcript(&transcript, config, factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;

    const LIBRARY_AND_APP: &str = "\
// SOURCE
// MODULE: lib
// FILE: Lib.kt
@Indexed class Foo
// MODULE: app / lib
// FILE: App.kt
@Indexed class Bar
// GENERATED
// MODULE: lib
// FILE: LibraryIndex_6c8424debe71ac40.idx
index LibraryIndex_6c8424debe71ac40
  Foo
end
// MODULE: app
// FILE: LibraryIndex_16a8d0155f928da7.idx
index LibraryIndex_16a8d0155f928da7
  Bar
end
// FILE: IndexRegistry.idx
registry IndexRegistry
  LibraryIndex_16a8d0155f928da7: Bar
  LibraryIndex_6c8424debe71ac40: Foo
elements
  Bar
  Foo
end
";

    #[test]
    fn test_run_library_and_app() {
        let transcript = parse_transcript(LIBRARY_AND_APP).unwrap();
        let report = run_transcript(&transcript, &RunConfig::default(), &IndexProcessorFactory).unwrap();

        assert!(report.is_success(), "{:#?}", report.verification);
        assert_eq!(report.verification.matched, 3);
        assert!(report.work_dir.is_none());

        // default-module and lib have no unbuilt dependencies; app waits
        let waves: Vec<(Vec<String>, bool)> = report
            .build
            .waves
            .iter()
            .map(|w| (w.modules.clone(), w.is_final))
            .collect();
        assert_eq!(
            waves,
            vec![
                (vec!["default-module".to_string(), "lib".to_string()], false),
                (vec!["app".to_string()], true),
            ]
        );
    }

    #[test]
    fn test_run_without_final_args_skips_registry() {
        let transcript = parse_transcript(LIBRARY_AND_APP).unwrap();
        let config = RunConfig {
            final_args: BuildArgs::new(),
            ..RunConfig::default()
        };
        let report = run_transcript(&transcript, &config, &IndexProcessorFactory).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.verification.mismatches.len(), 1);
    }

    #[test]
    fn test_run_keeps_fixed_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = parse_transcript(LIBRARY_AND_APP).unwrap();
        let config = RunConfig {
            work_dir: Some(dir.path().join("work")),
            ..RunConfig::default()
        };

        let report = run_transcript(&transcript, &config, &IndexProcessorFactory).unwrap();
        let work_dir = report.work_dir.unwrap();
        assert!(work_dir
            .join("lib/generated/LibraryIndex_6c8424debe71ac40.idx")
            .is_file());
    }

    #[test]
    fn test_run_entry_reads_index_with_keyword_element() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = parse_transcript(
            "// SOURCE\n// MODULE: lib\n@Indexed class end\n// MODULE: app / lib\n@Indexed class index\n",
        )
        .unwrap();
        let config = RunConfig {
            work_dir: Some(dir.path().to_path_buf()),
            ..RunConfig::default()
        };

        let report = run_transcript(&transcript, &config, &IndexProcessorFactory).unwrap();
        assert_eq!(report.build.build_order().last(), Some("app"));

        let registry = fs::read_to_string(dir.path().join("app/generated/IndexRegistry.idx")).unwrap();
        assert!(registry.ends_with("elements\n  end\n  index\nend\n"), "{}", registry);
    }

    #[test]
    fn test_run_unresolved_dependency() {
        let transcript = parse_transcript("// SOURCE\n// MODULE: a / nowhere\n").unwrap();
        let err = run_transcript(&transcript, &RunConfig::default(), &IndexProcessorFactory).unwrap_err();

        assert!(matches!(
            err,
            DriverError::Build(BuildError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn test_run_file_missing() {
        let err = run_file(
            Path::new("/definitely/not/here.txt"),
            &RunConfig::default(),
            &IndexProcessorFactory,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Read { .. }));
    }
}
