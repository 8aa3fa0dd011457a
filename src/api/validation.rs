//! Purpose: Provide a stable, serializable manifest validation report model.
//! Exports: `ValidationReport`, `ValidationStatus`, `ValidationIssue`.
//! Role: Shared contract for `env doctor` diagnostics; plain eval validates nothing.
//! Invariants: Reports are additive-only; no manifest contents are embedded.
//! Invariants: Advisory issues never flip the status away from Ok.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::manifest::Environment;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationStatus {
    Ok,
    Invalid,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub reference: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationReport {
    pub env_ref: Option<String>,
    pub path: PathBuf,
    pub status: ValidationStatus,
    pub issues: Vec<ValidationIssue>,
    pub issue_count: usize,
    pub remediation_hints: Vec<String>,
}

impl ValidationReport {
    pub fn ok(path: PathBuf) -> Self {
        Self {
            env_ref: None,
            path,
            status: ValidationStatus::Ok,
            issues: Vec::new(),
            issue_count: 0,
            remediation_hints: Vec::new(),
        }
    }

    pub fn invalid(path: PathBuf, issue: ValidationIssue) -> Self {
        let remediation_hints = vec![
            "Manifest does not decode. Recreate it with `benchtop env create` or fix the JSON by hand.".to_string(),
        ];
        Self {
            env_ref: None,
            path,
            status: ValidationStatus::Invalid,
            issues: vec![issue],
            issue_count: 1,
            remediation_hints,
        }
    }

    pub fn with_env_ref(mut self, env_ref: impl Into<String>) -> Self {
        self.env_ref = Some(env_ref.into());
        self
    }

    fn push_issue(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
        self.issue_count = self.issues.len();
    }
}

/// Structural doctor pass over raw manifest bytes. Decode failures make the
/// report Invalid; duplicate references and an empty package set are
/// reported as advisory issues on an Ok report.
pub(crate) fn validate_manifest_bytes(path: &Path, bytes: &[u8]) -> ValidationReport {
    let env = match Environment::decode(bytes) {
        Ok(env) => env,
        Err(err) => {
            return ValidationReport::invalid(
                path.to_path_buf(),
                ValidationIssue {
                    code: "malformed-manifest".to_string(),
                    message: err.to_string(),
                    reference: None,
                },
            );
        }
    };

    let mut report = ValidationReport::ok(path.to_path_buf()).with_env_ref(env.name.clone());

    let mut seen = BTreeSet::new();
    for package in env.package_set() {
        let key = package.to_string();
        if !seen.insert(key.clone()) {
            report.push_issue(ValidationIssue {
                code: "duplicate-reference".to_string(),
                message: format!("package reference appears more than once: {key}"),
                reference: Some(key),
            });
        }
    }

    if env.package_set().is_empty() {
        report.push_issue(ValidationIssue {
            code: "empty-package-set".to_string(),
            message: "environment declares no packages; evaluation yields only implicit defaults"
                .to_string(),
            reference: None,
        });
    }

    report
}
