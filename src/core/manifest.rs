// Environment descriptor decode/encode and package-set edits.
// Decode is strict: schema violations are Corrupt, never silently repaired.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

/// One entry in an environment's package set: a package name drawn from a
/// named package collection. Resolution to an installable artifact happens
/// elsewhere; the reference itself is pure data.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageRef {
    pub collection: String,
    pub name: String,
}

impl PackageRef {
    pub fn new(collection: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.name)
    }
}

impl FromStr for PackageRef {
    type Err = Error;

    /// Parses the CLI shorthand `collection/name`.
    fn from_str(input: &str) -> Result<Self, Error> {
        let mut parts = input.splitn(2, '/');
        let collection = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        if collection.is_empty() || name.is_empty() || name.contains('/') {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid package reference: {input:?}"))
                .with_hint("Use the form <collection>/<name>, e.g. python3Packages/numpy."));
        }
        Ok(Self::new(collection, name))
    }
}

/// The environment descriptor: a named environment and the package
/// references required to construct it. Order and duplicates are preserved
/// exactly as authored.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    #[serde(rename = "environment")]
    pub name: String,
    pub packages: Vec<PackageRef>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        check_env_name(&name, ErrorKind::Usage)?;
        Ok(Self {
            name,
            packages: Vec::new(),
        })
    }

    /// Decodes a manifest file. Any shape or syntax problem is `Corrupt`;
    /// nothing is dropped or defaulted.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let env: Environment = serde_json::from_slice(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("malformed environment manifest")
                .with_source(err)
        })?;
        check_env_name(&env.name, ErrorKind::Corrupt)?;
        for package in &env.packages {
            if package.collection.is_empty() || package.name.is_empty() {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("package reference with empty collection or name")
                    .with_reference(package.to_string()));
            }
        }
        Ok(env)
    }

    /// Canonical encoding: pretty JSON with a trailing newline.
    /// `decode(encode(env))` reproduces `env` exactly.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec_pretty(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// The declarative read the descriptor exists for: the package
    /// references required to construct the named environment. No
    /// validation, no resolution, no side effects.
    pub fn package_set(&self) -> &[PackageRef] {
        &self.packages
    }

    pub fn add_package(&mut self, package: PackageRef) {
        self.packages.push(package);
    }

    /// Removes the first occurrence of `package`. Absent refs are an error
    /// rather than a no-op so edits never succeed vacuously.
    pub fn remove_package(&mut self, package: &PackageRef) -> Result<(), Error> {
        let position = self.packages.iter().position(|p| p == package);
        match position {
            Some(index) => {
                self.packages.remove(index);
                Ok(())
            }
            None => Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("environment {:?} has no such package", self.name))
                .with_reference(package.to_string())),
        }
    }
}

fn check_env_name(name: &str, kind: ErrorKind) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::new(kind).with_message("environment name is empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::new(kind)
            .with_message(format!("environment name contains a path separator: {name:?}")));
    }
    Ok(())
}
