// Run journal directories: timestamped creation, source snapshots,
// params persistence. One directory per run; run.json is written at
// create time and never rewritten afterwards.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::error::{Error, ErrorKind, io_error_kind};

const RUN_FILE: &str = "run.json";
const PARAMS_FILE: &str = "params.json";
const SNAPSHOT_STEM: &str = "source";

// Same-second runs are expected under test harnesses; a short suffix
// scan keeps creation collision-free without widening the timestamp.
const MAX_COLLISION_SUFFIX: u32 = 16;

/// A verbatim copy of the file that drove a run, plus its digest so the
/// copy can be checked against the original later.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSnapshot {
    pub file: String,
    pub sha256: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunInfo {
    pub label: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSnapshot>,
}

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub environment: Option<String>,
    pub source: Option<PathBuf>,
}

/// An open run journal. `info` is immutable after create; `params` is the
/// mutable map persisted by `save_params`.
#[derive(Debug)]
pub struct Run {
    dir: PathBuf,
    info: RunInfo,
    params: Map<String, Value>,
}

impl Run {
    /// Creates `<base>/<label>/<timestamp>/`, snapshots the source file if
    /// one was given, and writes `run.json`.
    pub fn create(base: &Path, label: &str, options: RunOptions) -> Result<Self, Error> {
        check_label(label)?;
        let label_dir = base.join(label);
        fs::create_dir_all(&label_dir).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to create run base directory")
                .with_path(&label_dir)
                .with_source(err)
        })?;

        let now = time::OffsetDateTime::now_utc();
        let stamp = dir_stamp(now);
        let dir = claim_run_dir(&label_dir, &stamp)?;

        let source = match &options.source {
            Some(path) => Some(snapshot_source(path, &dir)?),
            None => None,
        };

        let info = RunInfo {
            label: label.to_string(),
            time: format_rfc3339(now)?,
            environment: options.environment,
            source,
        };
        write_json(&dir.join(RUN_FILE), &serde_json::to_value(&info).map_err(json_internal)?)?;
        debug!(run = %dir.display(), label, "created run journal");

        Ok(Self {
            dir,
            info,
            params: Map::new(),
        })
    }

    /// Opens an existing run directory. A missing `params.json` is an empty
    /// map, not an error; a missing or malformed `run.json` is.
    pub fn open(dir: &Path) -> Result<Self, Error> {
        let info_path = dir.join(RUN_FILE);
        let bytes = fs::read(&info_path).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to read run metadata")
                .with_path(&info_path)
                .with_source(err)
        })?;
        let info: RunInfo = serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("malformed run metadata")
                .with_path(&info_path)
                .with_source(err)
        })?;

        let params_path = dir.join(PARAMS_FILE);
        let params = match fs::read(&params_path) {
            Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("malformed run params")
                    .with_path(&params_path)
                    .with_source(err)
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => {
                return Err(Error::new(io_error_kind(&err))
                    .with_message("failed to read run params")
                    .with_path(&params_path)
                    .with_source(err));
            }
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            info,
            params,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Joins `relative` under the run directory. With `ensure_dir`, the
    /// directory portion is created: the path itself when it has no
    /// extension, its parent otherwise.
    pub fn path(&self, relative: &Path, ensure_dir: bool) -> Result<PathBuf, Error> {
        if relative.is_absolute() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("run paths must be relative")
                .with_path(relative));
        }
        let joined = self.dir.join(relative);
        if ensure_dir {
            let dir = if joined.extension().is_none() {
                joined.as_path()
            } else {
                joined.parent().unwrap_or(&self.dir)
            };
            fs::create_dir_all(dir).map_err(|err| {
                Error::new(io_error_kind(&err))
                    .with_message("failed to create run subdirectory")
                    .with_path(dir)
                    .with_source(err)
            })?;
        }
        Ok(joined)
    }

    /// Merges one value into the params map. Persist with `save_params`.
    pub fn record(&mut self, key: impl Into<String>, value: Value) {
        self.params.insert(key.into(), value);
    }

    /// Writes `params.json`. Saving the same map twice produces identical
    /// bytes.
    pub fn save_params(&self) -> Result<(), Error> {
        write_json(&self.dir.join(PARAMS_FILE), &Value::Object(self.params.clone()))
    }
}

fn check_label(label: &str) -> Result<(), Error> {
    if label.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("run label is empty"));
    }
    if label.contains('/') || label.contains('\\') {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("run label contains a path separator: {label:?}")));
    }
    Ok(())
}

fn dir_stamp(now: time::OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}-{:02}-{:02}-{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn format_rfc3339(now: time::OffsetDateTime) -> Result<String, Error> {
    use time::format_description::well_known::Rfc3339;
    now.format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("timestamp format failed")
            .with_source(err)
    })
}

fn claim_run_dir(label_dir: &Path, stamp: &str) -> Result<PathBuf, Error> {
    let mut candidate = label_dir.join(stamp);
    let mut suffix = 1u32;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                suffix += 1;
                if suffix > MAX_COLLISION_SUFFIX {
                    return Err(Error::new(ErrorKind::AlreadyExists)
                        .with_message("run directory collision limit reached")
                        .with_path(&candidate));
                }
                candidate = label_dir.join(format!("{stamp}-{suffix}"));
            }
            Err(err) => {
                return Err(Error::new(io_error_kind(&err))
                    .with_message("failed to create run directory")
                    .with_path(&candidate)
                    .with_source(err));
            }
        }
    }
}

fn snapshot_source(source: &Path, run_dir: &Path) -> Result<SourceSnapshot, Error> {
    let bytes = fs::read(source).map_err(|err| {
        Error::new(io_error_kind(&err))
            .with_message("failed to read source file")
            .with_path(source)
            .with_source(err)
    })?;

    let file_name = match source.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{SNAPSHOT_STEM}.{ext}"),
        None => SNAPSHOT_STEM.to_string(),
    };
    let target = run_dir.join(&file_name);
    fs::write(&target, &bytes).map_err(|err| {
        Error::new(io_error_kind(&err))
            .with_message("failed to write source snapshot")
            .with_path(&target)
            .with_source(err)
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    let mut sha256 = String::with_capacity(64);
    for byte in digest {
        sha256.push_str(&format!("{byte:02x}"));
    }

    Ok(SourceSnapshot {
        file: file_name,
        sha256,
    })
}

fn write_json(path: &Path, value: &Value) -> Result<(), Error> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(json_internal)?;
    bytes.push(b'\n');
    fs::write(path, bytes).map_err(|err| {
        Error::new(io_error_kind(&err))
            .with_message("failed to write json file")
            .with_path(path)
            .with_source(err)
    })
}

fn json_internal(err: serde_json::Error) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message("json encode failed")
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::{Run, RunOptions};
    use crate::core::error::ErrorKind;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    #[test]
    fn create_writes_metadata_and_timestamped_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = Run::create(temp.path(), "trial", RunOptions::default()).expect("create");

        assert!(run.dir().starts_with(temp.path().join("trial")));
        let stamp = run.dir().file_name().unwrap().to_str().unwrap();
        // YYYY-MM-DD-HH-MM-SS
        assert_eq!(stamp.len(), 19, "stamp: {stamp}");

        let reopened = Run::open(run.dir()).expect("open");
        assert_eq!(reopened.info().label, "trial");
        assert!(reopened.info().time.ends_with('Z'));
        assert!(reopened.params().is_empty());
    }

    #[test]
    fn same_second_runs_get_distinct_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = Run::create(temp.path(), "trial", RunOptions::default()).expect("first");
        let second = Run::create(temp.path(), "trial", RunOptions::default()).expect("second");
        assert_ne!(first.dir(), second.dir());
    }

    #[test]
    fn params_round_trip_and_resave_identically() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut run = Run::create(temp.path(), "trial", RunOptions::default()).expect("create");
        run.record("learning_rate", json!(0.001));
        run.record("layers", json!([64, 64, 10]));
        run.save_params().expect("save");

        let first = fs::read(run.dir().join("params.json")).expect("read");
        run.save_params().expect("resave");
        let second = fs::read(run.dir().join("params.json")).expect("reread");
        assert_eq!(first, second);

        let reopened = Run::open(run.dir()).expect("open");
        assert_eq!(reopened.params()["learning_rate"], json!(0.001));
        assert_eq!(reopened.params()["layers"], json!([64, 64, 10]));
    }

    #[test]
    fn source_snapshot_is_copied_and_digested() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("train.py");
        fs::write(&script, b"print('hello')\n").expect("write script");

        let run = Run::create(
            temp.path().join("runs").as_path(),
            "trial",
            RunOptions {
                environment: Some("tensorflowEnv".to_string()),
                source: Some(script),
            },
        )
        .expect("create");

        let snapshot = run.info().source.as_ref().expect("snapshot");
        assert_eq!(snapshot.file, "source.py");
        assert_eq!(snapshot.sha256.len(), 64);
        let copied = fs::read(run.dir().join("source.py")).expect("read copy");
        assert_eq!(copied, b"print('hello')\n");
        assert_eq!(run.info().environment.as_deref(), Some("tensorflowEnv"));
    }

    #[test]
    fn path_ensures_directory_portion() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = Run::create(temp.path(), "trial", RunOptions::default()).expect("create");

        let figure = run
            .path(Path::new("figures/loss.png"), true)
            .expect("figure path");
        assert!(figure.parent().unwrap().is_dir());
        assert!(!figure.exists());

        let checkpoints = run
            .path(Path::new("checkpoints"), true)
            .expect("dir path");
        assert!(checkpoints.is_dir());
    }

    #[test]
    fn absolute_relative_path_is_usage_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = Run::create(temp.path(), "trial", RunOptions::default()).expect("create");
        let err = run.path(Path::new("/etc/passwd"), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn bad_label_is_usage_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        for bad in ["", "a/b", "a\\b"] {
            let err = Run::create(temp.path(), bad, RunOptions::default()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Usage, "case: {bad:?}");
        }
    }

    #[test]
    fn missing_run_metadata_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Run::open(temp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
