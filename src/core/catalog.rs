// Package collections and exact-name resolution of environment manifests.
// Deliberately flat: one ref maps to one artifact. No transitive
// dependencies, no version ranges, no solver.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::manifest::{Environment, PackageRef};

/// One installable artifact within a collection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A set of named package collections, each mapping package names to
/// artifacts. BTreeMaps keep listing output deterministic.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    pub collections: BTreeMap<String, BTreeMap<String, Artifact>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedPackage {
    pub reference: PackageRef,
    pub version: String,
    pub summary: Option<String>,
}

/// The outcome of resolving an environment against a catalog: every
/// reference mapped to its artifact, in authored order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub environment: String,
    pub packages: Vec<ResolvedPackage>,
}

impl Catalog {
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("malformed catalog")
                .with_source(err)
        })
    }

    pub fn lookup(&self, reference: &PackageRef) -> Result<&Artifact, Error> {
        let collection = self.collections.get(&reference.collection).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!(
                    "catalog has no collection {:?}",
                    reference.collection
                ))
                .with_reference(reference.to_string())
        })?;
        collection.get(&reference.name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!(
                    "collection {:?} has no package {:?}",
                    reference.collection, reference.name
                ))
                .with_reference(reference.to_string())
        })
    }

    /// Resolves every reference in the environment, in authored order,
    /// failing on the first reference the catalog cannot satisfy. An
    /// invalid reference is never skipped.
    pub fn resolve(&self, env: &Environment) -> Result<Resolution, Error> {
        let mut packages = Vec::with_capacity(env.package_set().len());
        for reference in env.package_set() {
            let artifact = self.lookup(reference)?;
            packages.push(ResolvedPackage {
                reference: reference.clone(),
                version: artifact.version.clone(),
                summary: artifact.summary.clone(),
            });
        }
        Ok(Resolution {
            environment: env.name.clone(),
            packages,
        })
    }
}
