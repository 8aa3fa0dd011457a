//! Purpose: Define the stable public Rust API boundary for benchtop.
//! Exports: Core types and operations needed by the CLI and tests.
//! Role: Public, additive-only surface; hides internal storage modules.
//! Invariants: This module is the only public path to manifest/run primitives.
//! Invariants: Internal modules remain private and are not directly exposed.

mod client;
mod validation;

pub use crate::core::catalog::{Artifact, Catalog, Resolution, ResolvedPackage};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::manifest::{Environment, PackageRef};
pub use crate::core::run::{Run, RunInfo, RunOptions, SourceSnapshot};
pub use crate::env_paths::default_root_dir;
pub use client::{ApiResult, EnvRef, LocalClient};
pub use validation::{ValidationIssue, ValidationReport, ValidationStatus};
