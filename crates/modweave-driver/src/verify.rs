//! Compare generated output against the expected transcript region

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use modweave_transcript::Section;
use tracing::warn;

use crate::error::DriverError;
use crate::output::{join_relative, list_files};

/// One difference between expected and generated output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// Expected in the transcript, not generated
    MissingFile { module: String, file: String },
    /// Generated, not expected
    UnexpectedFile { module: String, file: String },
    ContentMismatch { module: String, file: String, diff: String },
    /// The generated region names a module that was never built
    UnknownModule { module: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::MissingFile { module, file } => {
                write!(f, "{}/{}: expected file was not generated", module, file)
            }
            Mismatch::UnexpectedFile { module, file } => {
                write!(f, "{}/{}: generated file is not expected", module, file)
            }
            Mismatch::ContentMismatch { module, file, diff } => {
                write!(f, "{}/{}: content differs\n{}", module, file, diff)
            }
            Mismatch::UnknownModule { module } => {
                write!(f, "{}: expected output for a module that is not in the source region", module)
            }
        }
    }
}

/// Result of verifying every module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    pub mismatches: Vec<Mismatch>,
    /// Generated files that matched
    pub matched: usize,
}

impl Verification {
    pub fn is_success(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Verify each `(module, output_dir)` against the `expected` region.
///
/// A module absent from `expected` must generate nothing.
pub fn verify_outputs<'a, I>(outputs: I, expected: &Section) -> Result<Verification, DriverError>
where
    I: IntoIterator<Item = (&'a str, &'a Path)>,
{
    let mut verification = Verification::default();
    let mut built = HashSet::new();

    for (module, output_dir) in outputs {
        built.insert(module.to_string());

        let generated = list_files(output_dir).map_err(|source| DriverError::Output {
            module: module.to_string(),
            path: output_dir.to_path_buf(),
            source,
        })?;
        let expected_files = expected.module(module).map(|m| m.files.as_slice()).unwrap_or(&[]);

        for file in expected_files {
            if !generated.contains(&file.name) {
                verification.mismatches.push(Mismatch::MissingFile {
                    module: module.to_string(),
                    file: file.name.clone(),
                });
            }
        }

        for relative in &generated {
            let Some(expected_file) = expected_files.iter().find(|f| &f.name == relative) else {
                verification.mismatches.push(Mismatch::UnexpectedFile {
                    module: module.to_string(),
                    file: relative.clone(),
                });
                continue;
            };

            let Some(path) = join_relative(output_dir, relative) else {
                verification.mismatches.push(Mismatch::UnexpectedFile {
                    module: module.to_string(),
                    file: relative.clone(),
                });
                continue;
            };
            let bytes = fs::read(&path).map_err(|source| DriverError::Output {
                module: module.to_string(),
                path: path.clone(),
                source,
            })?;
            // Expected content is always UTF-8, so undecodable output never matches
            let (actual, decoded) = match String::from_utf8(bytes) {
                Ok(text) => (text, true),
                Err(err) => (String::from_utf8_lossy(err.as_bytes()).into_owned(), false),
            };

            let expected_text = normalize_content(&expected_file.content);
            let actual_text = normalize_content(&actual);
            if decoded && expected_text == actual_text {
                verification.matched += 1;
            } else {
                verification.mismatches.push(Mismatch::ContentMismatch {
                    module: module.to_string(),
                    file: relative.clone(),
                    diff: line_diff(&expected_text, &actual_text),
                });
            }
        }
    }

    for record in expected.modules() {
        if !built.contains(&record.name) && !record.files.is_empty() {
            verification.mismatches.push(Mismatch::UnknownModule {
                module: record.name.clone(),
            });
        }
    }

    for mismatch in &verification.mismatches {
        warn!(%mismatch, "verification mismatch");
    }
    Ok(verification)
}

/// Unify line endings and drop trailing blank lines
pub fn normalize_content(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    let mut lines: Vec<&str> = unified.split('\n').collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Line diff of `expected` against `actual`: ` ` common, `-` expected only,
/// `+` actual only.
pub fn line_diff(expected: &str, actual: &str) -> String {
    let old: Vec<&str> = expected.lines().collect();
    let new: Vec<&str> = actual.lines().collect();

    // lcs[i][j]: longest common subsequence of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            out.push(format!("  {}", old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push(format!("- {}", old[i]));
            i += 1;
        } else {
            out.push(format!("+ {}", new[j]));
            j += 1;
        }
    }
    out.extend(old[i..].iter().map(|l| format!("- {}", l)));
    out.extend(new[j..].iter().map(|l| format!("+ {}", l)));
    out.join("\n")
}
