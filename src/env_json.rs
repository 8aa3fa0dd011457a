//! Purpose: Shared JSON envelope serializers for CLI stdout payloads.
//! Exports: `env_json`, `package_set_json`, `resolution_json`, `run_json`, `report_json`.
//! Role: Keep envelope shapes consistent across commands from one source.
//! Invariants: Stable key names/order for v0 payloads.
//! Invariants: Optional blocks are emitted only when the source data exists.

use std::path::Path;

use benchtop::api::{
    Environment, Resolution, Run, ValidationReport, ValidationStatus,
};
use serde_json::{Map, Value, json};

fn package_refs_json(env: &Environment) -> Value {
    let packages: Vec<Value> = env
        .package_set()
        .iter()
        .map(|p| json!({"collection": p.collection, "name": p.name}))
        .collect();
    Value::Array(packages)
}

pub(crate) fn env_json(env: &Environment, path: &Path) -> Value {
    let mut map = Map::new();
    map.insert("environment".to_string(), json!(env.name));
    map.insert("path".to_string(), json!(path.display().to_string()));
    map.insert("packages".to_string(), package_refs_json(env));
    Value::Object(map)
}

/// The evaluation output without a catalog: the package set, tagged with
/// the environment name, exactly as authored.
pub(crate) fn package_set_json(env: &Environment) -> Value {
    let mut map = Map::new();
    map.insert("environment".to_string(), json!(env.name));
    map.insert("packages".to_string(), package_refs_json(env));
    Value::Object(map)
}

pub(crate) fn resolution_json(resolution: &Resolution) -> Value {
    let packages: Vec<Value> = resolution
        .packages
        .iter()
        .map(|p| {
            let mut map = Map::new();
            map.insert("collection".to_string(), json!(p.reference.collection));
            map.insert("name".to_string(), json!(p.reference.name));
            map.insert("version".to_string(), json!(p.version));
            if let Some(summary) = &p.summary {
                map.insert("summary".to_string(), json!(summary));
            }
            Value::Object(map)
        })
        .collect();

    let mut map = Map::new();
    map.insert("environment".to_string(), json!(resolution.environment));
    map.insert("packages".to_string(), Value::Array(packages));
    Value::Object(map)
}

pub(crate) fn run_json(run: &Run) -> Value {
    let info = run.info();
    let mut inner = Map::new();
    inner.insert("label".to_string(), json!(info.label));
    inner.insert("time".to_string(), json!(info.time));
    inner.insert("path".to_string(), json!(run.dir().display().to_string()));
    if let Some(environment) = &info.environment {
        inner.insert("environment".to_string(), json!(environment));
    }
    if let Some(source) = &info.source {
        inner.insert(
            "source".to_string(),
            json!({"file": source.file, "sha256": source.sha256}),
        );
    }

    let mut map = Map::new();
    map.insert("run".to_string(), Value::Object(inner));
    map.insert("params".to_string(), Value::Object(run.params().clone()));
    Value::Object(map)
}

pub(crate) fn report_json(report: &ValidationReport) -> Value {
    let issues: Vec<Value> = report
        .issues
        .iter()
        .map(|issue| {
            let mut map = Map::new();
            map.insert("code".to_string(), json!(issue.code));
            map.insert("message".to_string(), json!(issue.message));
            if let Some(reference) = &issue.reference {
                map.insert("reference".to_string(), json!(reference));
            }
            Value::Object(map)
        })
        .collect();

    let mut map = Map::new();
    if let Some(env_ref) = &report.env_ref {
        map.insert("environment".to_string(), json!(env_ref));
    }
    map.insert("path".to_string(), json!(report.path.display().to_string()));
    let status = match report.status {
        ValidationStatus::Ok => "ok",
        ValidationStatus::Invalid => "invalid",
    };
    map.insert("status".to_string(), json!(status));
    map.insert("issue_count".to_string(), json!(report.issue_count));
    map.insert("issues".to_string(), Value::Array(issues));
    if !report.remediation_hints.is_empty() {
        map.insert(
            "remediation_hints".to_string(),
            json!(report.remediation_hints),
        );
    }
    Value::Object(map)
}
