//! Transcript fixture tests.
//!
//! Each fixture under `tests/data` is built with the in-process index processor
//! and its generated region is verified against what the modules wrote.

use std::path::PathBuf;

use modweave_driver::{
    run_file, BuildArgs, BuildError, DriverError, IndexProcessorFactory, Mismatch, RunConfig,
    RunReport,
};
use modweave_transcript::ParseErrorKind;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

fn run(name: &str) -> Result<RunReport, DriverError> {
    run_file(&fixture(name), &RunConfig::default(), &IndexProcessorFactory)
}

fn waves(report: &RunReport) -> Vec<(Vec<&str>, bool)> {
    report
        .build
        .waves
        .iter()
        .map(|w| (w.modules.iter().map(String::as_str).collect(), w.is_final))
        .collect()
}

// =============================================================================
// Passing transcripts
// =============================================================================

#[test]
fn test_basic_single_module() {
    let report = run("basic.txt").unwrap();

    assert!(report.is_success(), "{:#?}", report.verification);
    assert_eq!(report.verification.matched, 2);
    assert_eq!(waves(&report), vec![(vec!["default-module"], true)]);
}

#[test]
fn test_independent_modules_share_final_wave() {
    let report = run("fanout.txt").unwrap();

    assert!(report.is_success(), "{:#?}", report.verification);
    assert_eq!(report.verification.matched, 4);
    assert_eq!(
        waves(&report),
        vec![(vec!["default-module", "a", "b", "c"], true)]
    );
}

#[test]
fn test_diamond_registry_sees_transitive_indexes() {
    let report = run("diamond.txt").unwrap();

    assert!(report.is_success(), "{:#?}", report.verification);
    assert_eq!(report.verification.matched, 4);
    assert_eq!(
        waves(&report),
        vec![
            (vec!["default-module", "base"], false),
            (vec!["left", "right"], false),
            (vec!["app"], true),
        ]
    );
}

#[test]
fn test_packages_qualify_element_names() {
    let report = run("packages.txt").unwrap();

    assert!(report.is_success(), "{:#?}", report.verification);
    assert_eq!(report.verification.matched, 2);
}

#[test]
fn test_same_transcript_same_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        work_dir: Some(dir.path().to_path_buf()),
        ..RunConfig::default()
    };

    let first = run_file(&fixture("diamond.txt"), &config, &IndexProcessorFactory).unwrap();
    let registry = dir.path().join("app/generated/IndexRegistry.idx");
    let before = std::fs::read_to_string(&registry).unwrap();

    let second = run_file(&fixture("diamond.txt"), &config, &IndexProcessorFactory).unwrap();
    let after = std::fs::read_to_string(&registry).unwrap();

    assert!(first.is_success() && second.is_success());
    assert_eq!(before, after);
}

// =============================================================================
// Failing transcripts
// =============================================================================

#[test]
fn test_mismatch_is_reported_not_raised() {
    let report = run("mismatch.txt").unwrap();

    assert!(!report.is_success());
    let mismatches = &report.verification.mismatches;
    assert!(mismatches.iter().any(|m| matches!(
        m,
        Mismatch::ContentMismatch { module, diff, .. }
            if module == "lib" && diff.contains("-   Bar") && diff.contains("+   Foo")
    )));
    // app is the entry module and writes a registry nobody expected
    assert!(mismatches.iter().any(|m| matches!(
        m,
        Mismatch::UnexpectedFile { module, file } if module == "app" && file == "IndexRegistry.idx"
    )));
}

#[test]
fn test_without_final_args_no_registry() {
    let config = RunConfig {
        final_args: BuildArgs::new(),
        ..RunConfig::default()
    };
    let report = run_file(&fixture("basic.txt"), &config, &IndexProcessorFactory).unwrap();

    assert_eq!(
        report.verification.mismatches,
        vec![Mismatch::MissingFile {
            module: "default-module".to_string(),
            file: "IndexRegistry.idx".to_string(),
        }]
    );
}

#[test]
fn test_cycle_after_progress() {
    let err = run("cycle.txt").unwrap_err();

    match err {
        DriverError::Build(BuildError::Cycle { cycle, blocked }) => {
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.contains(&"a".to_string()));
            assert!(cycle.contains(&"b".to_string()));
            let names: Vec<&str> = blocked.iter().map(|b| b.module.as_str()).collect();
            assert_eq!(names, vec!["a", "b"]);
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}

#[test]
fn test_unresolved_dependency_is_configuration_error() {
    let err = run("unresolved.txt").unwrap_err();

    match err {
        DriverError::Build(build) => {
            assert!(build.is_configuration_error());
            assert!(matches!(
                build,
                BuildError::UnresolvedDependency { ref module, ref dependency }
                    if module == "a" && dependency == "missing"
            ));
        }
        other => panic!("expected a build error, got {:?}", other),
    }
}

#[test]
fn test_malformed_transcript() {
    let err = run("malformed.txt").unwrap_err();

    match err {
        DriverError::Parse(parse) => {
            assert!(matches!(parse.kind, ParseErrorKind::MalformedModuleMarker(_)));
            assert!(parse.span.end > parse.span.start);
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}
