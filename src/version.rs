//! # Versioned Asset Collections
//!
//! Policy definitions and policy set definitions can be published in several
//! versions under one name. A [`VersionedAssetCollection`] holds every known
//! version of one name and answers "which version do I get for this
//! specifier".
//!
//! ## Version Resolution
//!
//! - **No specifier**: the latest entry. That is the highest semantic
//!   version, or the unversioned entry when no versioned entry exists.
//! - **Exact version** (`1.2.0`, `v1.2.0`): that version only.
//! - **Wildcard constraint** (`1.*.*`, `1.2.*`, `*`): the highest version
//!   matching the fixed leading components.
//!
//! Versions are compared with the `semver` crate, so pre-releases sort below
//! their release.

use std::collections::BTreeMap;

use semver::{Version, VersionReq};

use crate::assets::VersionedAsset;
use crate::error::{BatchError, Error, Result};

/// Parse a version string, tolerating a leading `v`.
pub fn parse_version(version: &str) -> Result<Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Ok(Version::parse(trimmed)?)
}

/// A parsed version specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Exact(Version),
    Constraint(VersionReq),
}

impl VersionSpec {
    /// Parse an exact version or a wildcard constraint such as `1.*.*`.
    pub fn parse(spec: &str) -> Result<Self> {
        if let Ok(version) = parse_version(spec) {
            return Ok(VersionSpec::Exact(version));
        }

        let trimmed = spec.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let mut fixed = Vec::new();
        let mut wildcard_seen = false;
        for part in trimmed.split('.') {
            let is_wildcard = matches!(part, "*" | "x" | "X");
            if is_wildcard {
                wildcard_seen = true;
            } else if wildcard_seen || part.parse::<u64>().is_err() {
                return Err(Error::Validation {
                    message: format!("`{}` is not a valid version specifier", spec),
                });
            } else {
                fixed.push(part);
            }
        }
        if !wildcard_seen || fixed.len() > 2 {
            return Err(Error::Validation {
                message: format!("`{}` is not a valid version specifier", spec),
            });
        }

        let req = if fixed.is_empty() {
            VersionReq::STAR
        } else {
            VersionReq::parse(&format!("={}", fixed.join(".")))?
        };
        Ok(VersionSpec::Constraint(req))
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionSpec::Exact(exact) => exact == version,
            VersionSpec::Constraint(req) => req.matches(version),
        }
    }
}

/// Every known version of one versioned asset.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedAssetCollection<T> {
    name: String,
    versioned: BTreeMap<Version, T>,
    unversioned: Option<T>,
}

impl<T: VersionedAsset> VersionedAssetCollection<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versioned: BTreeMap::new(),
            unversioned: None,
        }
    }

    /// Build a collection holding a single asset.
    pub fn from_asset(asset: T) -> Result<Self> {
        let mut collection = Self::new(asset.name());
        collection.add(asset, false)?;
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert `asset` under its own version key.
    pub fn add(&mut self, asset: T, allow_overwrite: bool) -> Result<()> {
        self.check_name(&asset)?;
        match asset.version() {
            None => {
                if self.unversioned.is_some() && !allow_overwrite {
                    return Err(Error::conflict(T::KIND, &self.name, None));
                }
                self.unversioned = Some(asset);
            }
            Some(raw) => {
                let version = self.parse_asset_version(raw)?;
                if self.versioned.contains_key(&version) && !allow_overwrite {
                    return Err(Error::conflict(T::KIND, &self.name, Some(raw)));
                }
                self.versioned.insert(version, asset);
            }
        }
        Ok(())
    }

    /// Insert `asset` unless its version is already present.
    ///
    /// Returns whether a new entry was stored.
    pub fn add_if_absent(&mut self, asset: T) -> Result<bool> {
        self.check_name(&asset)?;
        match asset.version() {
            None => {
                if self.unversioned.is_some() {
                    return Ok(false);
                }
                self.unversioned = Some(asset);
            }
            Some(raw) => {
                let version = self.parse_asset_version(raw)?;
                if self.versioned.contains_key(&version) {
                    return Ok(false);
                }
                self.versioned.insert(version, asset);
            }
        }
        Ok(true)
    }

    /// Merge every version of `other` into this collection.
    ///
    /// All conflicting versions are reported together.
    pub fn upsert(&mut self, other: VersionedAssetCollection<T>, allow_overwrite: bool) -> Result<()> {
        if other.name != self.name {
            return Err(Error::Validation {
                message: format!(
                    "cannot merge {} `{}` into `{}`",
                    T::KIND,
                    other.name,
                    self.name
                ),
            });
        }

        let mut batch = BatchError::new(format!("merging {} `{}`", T::KIND, self.name));
        for asset in other.into_assets() {
            batch.record(self.add(asset, allow_overwrite));
        }
        batch.finish()
    }

    /// Resolve a version specifier, `None` meaning latest.
    pub fn get_version(&self, spec: Option<&str>) -> Result<&T> {
        match spec {
            None => self.latest().ok_or_else(|| Error::not_found(T::KIND, &self.name, None)),
            Some(raw) => self
                .find(raw)?
                .ok_or_else(|| Error::not_found(T::KIND, &self.name, Some(raw))),
        }
    }

    /// Like [`get_version`](Self::get_version), but a missing version is
    /// reported as [`Error::VersionNotFound`].
    pub fn get_version_strict(&self, spec: Option<&str>) -> Result<&T> {
        match spec {
            None => self.get_version(None),
            Some(raw) => self.find(raw)?.ok_or_else(|| Error::VersionNotFound {
                kind: T::KIND,
                name: self.name.clone(),
                version: raw.to_string(),
            }),
        }
    }

    pub fn contains_version(&self, spec: Option<&str>) -> bool {
        self.get_version(spec).is_ok()
    }

    /// The highest version, else the unversioned entry.
    pub fn latest(&self) -> Option<&T> {
        self.versioned
            .last_key_value()
            .map(|(_, asset)| asset)
            .or(self.unversioned.as_ref())
    }

    /// Known versions in ascending order; the unversioned entry is `None` and
    /// listed first.
    pub fn versions(&self) -> Vec<Option<String>> {
        let mut versions = Vec::with_capacity(self.len());
        if self.unversioned.is_some() {
            versions.push(None);
        }
        versions.extend(self.versioned.keys().map(|v| Some(v.to_string())));
        versions
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.unversioned.iter().chain(self.versioned.values())
    }

    pub fn into_assets(self) -> impl Iterator<Item = T> {
        self.unversioned.into_iter().chain(self.versioned.into_values())
    }

    pub fn len(&self) -> usize {
        self.versioned.len() + usize::from(self.unversioned.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, raw: &str) -> Result<Option<&T>> {
        let spec = VersionSpec::parse(raw)?;
        let found = match &spec {
            VersionSpec::Exact(version) => self.versioned.get(version),
            VersionSpec::Constraint(_) => self
                .versioned
                .iter()
                .rev()
                .find(|(version, _)| spec.matches(version))
                .map(|(_, asset)| asset),
        };
        Ok(found)
    }

    fn check_name(&self, asset: &T) -> Result<()> {
        if asset.name() != self.name {
            return Err(Error::Validation {
                message: format!(
                    "{} `{}` does not belong in collection `{}`",
                    T::KIND,
                    asset.name(),
                    self.name
                ),
            });
        }
        Ok(())
    }

    fn parse_asset_version(&self, raw: &str) -> Result<Version> {
        parse_version(raw).map_err(|_| Error::Validation {
            message: format!(
                "{} `{}` has invalid version `{}`",
                T::KIND,
                self.name,
                raw
            ),
        })
    }
}
