//! Purpose: Define the public API client surface for local manifest and run access.
//! Exports: `EnvRef`, `LocalClient`, and environment/run lifecycle operations.
//! Role: Stable boundary for the CLI and tests; mirrors CLI resolution rules.
//! Invariants: Named environment refs resolve under `<root>/envs` only.
//! Invariants: Manifest rewrites hold an exclusive lock for their duration.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::validation::{ValidationReport, validate_manifest_bytes};
use crate::core::catalog::Catalog;
use crate::core::error::{Error, ErrorKind, io_error_kind};
use crate::core::manifest::{Environment, PackageRef};
use crate::core::run::{Run, RunOptions};
use crate::env_paths::{
    ENV_SUFFIX, EnvNameResolveError, default_root_dir, envs_dir, resolve_named_env_path, runs_dir,
};

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EnvRef {
    Name(String),
    Path(PathBuf),
}

impl EnvRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn describe(&self) -> String {
        match self {
            EnvRef::Name(name) => name.clone(),
            EnvRef::Path(path) => path.to_string_lossy().to_string(),
        }
    }

    fn resolve_local_path(&self, envs_dir: &Path) -> ApiResult<PathBuf> {
        match self {
            EnvRef::Name(name) => resolve_name(name, envs_dir),
            EnvRef::Path(path) => Ok(path.clone()),
        }
    }
}

fn resolve_name(name: &str, envs_dir: &Path) -> ApiResult<PathBuf> {
    resolve_named_env_path(name, envs_dir).map_err(|err| match err {
        EnvNameResolveError::ContainsPathSeparator => Error::new(ErrorKind::Usage)
            .with_message(format!("environment name contains a path separator: {name:?}"))
            .with_hint("Pass a bare name for ~/.benchtop/envs, or an explicit manifest path."),
    })
}

#[derive(Clone, Debug)]
pub struct LocalClient {
    root_dir: PathBuf,
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalClient {
    pub fn new() -> Self {
        Self {
            root_dir: default_root_dir(),
        }
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn envs_dir(&self) -> PathBuf {
        envs_dir(&self.root_dir)
    }

    pub fn runs_dir(&self) -> PathBuf {
        runs_dir(&self.root_dir)
    }

    pub fn resolve_env_path(&self, env_ref: &EnvRef) -> ApiResult<PathBuf> {
        env_ref.resolve_local_path(&self.envs_dir())
    }

    /// Creates a new manifest. Refuses to overwrite an existing one.
    pub fn create_env(
        &self,
        name: &str,
        packages: Vec<PackageRef>,
    ) -> ApiResult<(Environment, PathBuf)> {
        let mut env = Environment::new(name)?;
        for package in packages {
            env.add_package(package);
        }

        let envs = self.envs_dir();
        fs::create_dir_all(&envs).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to create envs directory")
                .with_path(&envs)
                .with_source(err)
        })?;

        let path = resolve_name(name, &envs)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::new(ErrorKind::AlreadyExists)
                        .with_message(format!("environment {name:?} already exists"))
                        .with_path(&path)
                        .with_hint("Use `env add`/`env remove` to edit it, or pick another name.")
                } else {
                    Error::new(io_error_kind(&err))
                        .with_message("failed to create manifest")
                        .with_path(&path)
                        .with_source(err)
                }
            })?;
        file.write_all(&env.encode()).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to write manifest")
                .with_path(&path)
                .with_source(err)
        })?;
        debug!(path = %path.display(), "created environment manifest");
        Ok((env, path))
    }

    pub fn open_env(&self, env_ref: &EnvRef) -> ApiResult<(Environment, PathBuf)> {
        let path = self.resolve_env_path(env_ref)?;
        let bytes = fs::read(&path).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message(format!("environment {:?} not readable", env_ref.describe()))
                .with_path(&path)
                .with_source(err)
        })?;
        let env = Environment::decode(&bytes).map_err(|err| err.with_path(&path))?;
        Ok((env, path))
    }

    /// Rewrites an existing manifest in place under an exclusive lock.
    /// A concurrent writer holding the lock surfaces as `Busy`.
    pub fn save_env(&self, path: &Path, env: &Environment) -> ApiResult<()> {
        let file = OpenOptions::new().write(true).open(path).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to open manifest for rewrite")
                .with_path(path)
                .with_source(err)
        })?;
        file.try_lock_exclusive().map_err(|err| {
            if err.kind() == std::io::ErrorKind::WouldBlock {
                Error::new(ErrorKind::Busy)
                    .with_message("manifest is locked by another process")
                    .with_path(path)
            } else {
                Error::new(io_error_kind(&err))
                    .with_message("failed to lock manifest")
                    .with_path(path)
                    .with_source(err)
            }
        })?;

        let result = write_locked(&file, env);
        let _ = FileExt::unlock(&file);
        result.map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to rewrite manifest")
                .with_path(path)
                .with_source(err)
        })?;
        debug!(path = %path.display(), "rewrote environment manifest");
        Ok(())
    }

    /// Decodes every `*.env.json` under the envs directory, sorted by file
    /// name. A malformed manifest aborts the listing rather than being
    /// silently skipped.
    pub fn list_envs(&self) -> ApiResult<Vec<(Environment, PathBuf)>> {
        let envs = self.envs_dir();
        let entries = match fs::read_dir(&envs) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::new(io_error_kind(&err))
                    .with_message("failed to read envs directory")
                    .with_path(&envs)
                    .with_source(err));
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::new(io_error_kind(&err))
                    .with_message("failed to read envs directory entry")
                    .with_path(&envs)
                    .with_source(err)
            })?;
            let path = entry.path();
            let is_manifest = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(ENV_SUFFIX));
            if is_manifest {
                paths.push(path);
            }
        }
        paths.sort();

        let mut found = Vec::with_capacity(paths.len());
        for path in paths {
            let (env, path) = self.open_env(&EnvRef::path(path))?;
            found.push((env, path));
        }
        Ok(found)
    }

    pub fn load_catalog(&self, path: &Path) -> ApiResult<Catalog> {
        let bytes = fs::read(path).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("catalog not readable")
                .with_path(path)
                .with_source(err)
        })?;
        Catalog::decode(&bytes).map_err(|err| err.with_path(path))
    }

    /// Structural doctor pass. Missing manifests are an error; everything
    /// the file contains is judged by the report.
    pub fn doctor_env(&self, env_ref: &EnvRef) -> ApiResult<ValidationReport> {
        let path = self.resolve_env_path(env_ref)?;
        let bytes = fs::read(&path).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message(format!("environment {:?} not readable", env_ref.describe()))
                .with_path(&path)
                .with_source(err)
        })?;
        Ok(validate_manifest_bytes(&path, &bytes))
    }

    pub fn create_run(&self, label: &str, options: RunOptions) -> ApiResult<Run> {
        Run::create(&self.runs_dir(), label, options)
    }

    pub fn open_run(&self, dir: &Path) -> ApiResult<Run> {
        Run::open(dir)
    }

    /// Run directories for a label, sorted by name. Timestamped names make
    /// name order creation order.
    pub fn list_runs(&self, label: &str) -> ApiResult<Vec<PathBuf>> {
        let label_dir = self.runs_dir().join(label);
        let entries = fs::read_dir(&label_dir).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message(format!("no runs recorded for label {label:?}"))
                .with_path(&label_dir)
                .with_source(err)
        })?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::new(io_error_kind(&err))
                    .with_message("failed to read runs directory entry")
                    .with_path(&label_dir)
                    .with_source(err)
            })?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

fn write_locked(mut file: &std::fs::File, env: &Environment) -> std::io::Result<()> {
    file.set_len(0)?;
    file.write_all(&env.encode())?;
    file.sync_all()
}
