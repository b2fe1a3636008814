//! External-tool backend: stages sources on disk and runs a command
//!
//! The command learns about the module through environment variables and
//! receives build arguments as `-A key=value` pairs. Its exit code is the
//! compile verdict; whatever it leaves in the output directory is the
//! generated output.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use modweave_transcript::{ModuleRecord, SourceFile};
use tracing::debug;

use crate::error::UnitError;
use crate::output::{join_relative, list_files, reset_dir};
use crate::unit::{BuildArgs, CompileUnit, ExitStatus, GeneratedFile, ResolvedDependencies};

pub const MODULE_ENV: &str = "MODWEAVE_MODULE";
pub const SOURCE_DIR_ENV: &str = "MODWEAVE_SOURCE_DIR";
pub const OUTPUT_DIR_ENV: &str = "MODWEAVE_OUTPUT_DIR";
pub const CLASSPATH_ENV: &str = "MODWEAVE_CLASSPATH";

/// Compilation unit backed by an external program
pub struct CommandUnit {
    name: String,
    dependency_names: Vec<String>,
    sources: Vec<SourceFile>,
    program: String,
    program_args: Vec<String>,
    source_dir: PathBuf,
    output_dir: PathBuf,
    classpath: Vec<PathBuf>,
    generated: Vec<GeneratedFile>,
    compiled: bool,
}

impl CommandUnit {
    /// `module_dir` receives `sources/` and `generated/` subdirectories
    pub fn new(record: &ModuleRecord, module_dir: &Path, program: impl Into<String>, program_args: Vec<String>) -> Self {
        Self {
            name: record.name.clone(),
            dependency_names: record.dependencies.clone(),
            sources: record.files.clone(),
            program: program.into(),
            program_args,
            source_dir: module_dir.join("sources"),
            output_dir: module_dir.join("generated"),
            classpath: Vec::new(),
            generated: Vec::new(),
            compiled: false,
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    fn stage_sources(&self) -> Result<(), UnitError> {
        reset_dir(&self.source_dir).map_err(|e| UnitError::io(&self.source_dir, e))?;

        for source in &self.sources {
            let path = join_relative(&self.source_dir, &source.name)
                .ok_or_else(|| UnitError::InvalidPath(source.name.clone()))?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| UnitError::io(parent, e))?;
            }
            fs::write(&path, &source.content).map_err(|e| UnitError::io(&path, e))?;
        }

        Ok(())
    }

    fn command(&self, args: &BuildArgs) -> Result<Command, UnitError> {
        let classpath =
            env::join_paths(&self.classpath).map_err(|e| UnitError::Classpath(e.to_string()))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.program_args);
        for (key, value) in args {
            cmd.arg("-A").arg(format!("{}={}", key, value));
        }
        cmd.env(MODULE_ENV, &self.name)
            .env(SOURCE_DIR_ENV, &self.source_dir)
            .env(OUTPUT_DIR_ENV, &self.output_dir)
            .env(CLASSPATH_ENV, classpath);
        Ok(cmd)
    }
}

impl CompileUnit for CommandUnit {
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
        self.stage_sources()?;
        reset_dir(&self.output_dir).map_err(|e| UnitError::io(&self.output_dir, e))?;

        let output = self
            .command(args)?
            .output()
            .map_err(|source| UnitError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        debug!(
            program = %self.program,
            stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
            "command finished"
        );

        // Killed by a signal: no exit code
        let status = match output.status.code() {
            Some(code) => ExitStatus::from_code(code),
            None => ExitStatus::InternalError,
        };

        self.generated = list_files(&self.output_dir)
            .map_err(|e| UnitError::io(&self.output_dir, e))?
            .into_iter()
            .map(|path| GeneratedFile {
                path,
                originating: Vec::new(),
            })
            .collect();
        self.compiled = status.is_ok();
        Ok(status)
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

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell_unit(module_dir: &Path, script: &str) -> CommandUnit {
        let record = ModuleRecord::new("lib")
            .with_file("A.kt", "class A\n")
            .with_file("pkg/B.kt", "class B\n");
        CommandUnit::new(
            &record,
            module_dir,
            "sh",
            vec!["-c".to_string(), script.to_string(), "modweave-test".to_string()],
        )
    }

    #[test]
    fn test_command_sees_staged_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = shell_unit(
            dir.path(),
            r#"cat "$MODWEAVE_SOURCE_DIR/A.kt" "$MODWEAVE_SOURCE_DIR/pkg/B.kt" > "$MODWEAVE_OUTPUT_DIR/All.kt""#,
        );

        let status = unit.compile(&BuildArgs::new()).unwrap();

        assert_eq!(status, ExitStatus::Ok);
        assert!(unit.is_compiled());
        let all = fs::read_to_string(unit.output_dir().join("All.kt")).unwrap();
        assert_eq!(all, "class A\nclass B\n");
        assert_eq!(unit.generated_files()[0].path, "All.kt");
    }

    #[test]
    fn test_command_receives_args_and_module() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = shell_unit(
            dir.path(),
            r#"echo "$MODWEAVE_MODULE $*" > "$MODWEAVE_OUTPUT_DIR/args.txt""#,
        );

        let args = BuildArgs::from([("index.main".to_string(), "true".to_string())]);
        unit.compile(&args).unwrap();

        let seen = fs::read_to_string(unit.output_dir().join("args.txt")).unwrap();
        assert_eq!(seen, "lib -A index.main=true\n");
    }

    #[test]
    fn test_command_classpath() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = shell_unit(
            dir.path(),
            r#"echo "$MODWEAVE_CLASSPATH" > "$MODWEAVE_OUTPUT_DIR/cp.txt""#,
        );
        unit.resolve_dependencies(ResolvedDependencies {
            direct: Vec::new(),
            classpath: vec![PathBuf::from("/x/a"), PathBuf::from("/x/b")],
        });

        unit.compile(&BuildArgs::new()).unwrap();
        let seen = fs::read_to_string(unit.output_dir().join("cp.txt")).unwrap();
        assert_eq!(seen, "/x/a:/x/b\n");
    }

    #[test]
    fn test_exit_code_maps_to_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = shell_unit(dir.path(), "exit 1");

        assert_eq!(
            unit.compile(&BuildArgs::new()).unwrap(),
            ExitStatus::CompilationError
        );
        assert!(!unit.is_compiled());
    }

    #[test]
    fn test_source_outside_module_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let module_dir = dir.path().join("work/a");
        let record = ModuleRecord::new("a").with_file("../../escape.kt", "class E\n");
        let mut unit = CommandUnit::new(&record, &module_dir, "true", Vec::new());

        assert!(matches!(
            unit.compile(&BuildArgs::new()),
            Err(UnitError::InvalidPath(ref path)) if path == "../../escape.kt"
        ));
        assert!(!dir.path().join("work/escape.kt").exists());
        assert!(!dir.path().join("escape.kt").exists());
    }

    #[test]
    fn test_missing_program_is_unit_error() {
        let dir = tempfile::tempdir().unwrap();
        let record = ModuleRecord::new("lib");
        let mut unit = CommandUnit::new(&record, dir.path(), "modweave-no-such-program", Vec::new());

        assert!(matches!(
            unit.compile(&BuildArgs::new()),
            Err(UnitError::Spawn { .. })
        ));
    }
}
