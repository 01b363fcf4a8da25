//! # Asset Registry
//!
//! The registry owns the four asset maps of the library:
//!
//! - policy definitions, keyed by name, each a [`VersionedAssetCollection`]
//! - policy set definitions, keyed by name, each a [`VersionedAssetCollection`]
//! - policy assignments, keyed by name
//! - role definitions, keyed by role name
//!
//! [`AssetStore`] is the plain data structure with the insertion rules.
//! [`AssetRegistry`] puts one reader/writer lock around it: every read takes
//! the shared lock, every mutation the exclusive lock, and the lock is held
//! for the whole read-copy or write. Reads hand back owned copies, so callers
//! can never alias registry state.
//!
//! ## Insertion Rules
//!
//! - Entries with an empty name are skipped.
//! - Versioned kinds merge into an existing collection. Every conflicting
//!   version in a batch is collected; the rest of the batch still lands.
//! - Unversioned kinds fail the call on the first name collision unless
//!   overwriting is allowed, in which case the newer value wins.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::assets::{
    Asset, AssetKind, PolicyAssignment, PolicyDefinition, PolicySetDefinition, RoleDefinition,
    VersionedAsset,
};
use crate::error::{BatchError, Error, Result};
use crate::version::VersionedAssetCollection;

type VersionedMap<T> = BTreeMap<String, VersionedAssetCollection<T>>;

/// The registry's asset maps, without locking.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    policy_definitions: VersionedMap<PolicyDefinition>,
    policy_set_definitions: VersionedMap<PolicySetDefinition>,
    policy_assignments: BTreeMap<String, PolicyAssignment>,
    role_definitions: BTreeMap<String, RoleDefinition>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_policy_definitions(
        &mut self,
        items: impl IntoIterator<Item = PolicyDefinition>,
        allow_overwrite: bool,
    ) -> Result<()> {
        add_versioned(&mut self.policy_definitions, items, allow_overwrite)
    }

    pub fn add_policy_set_definitions(
        &mut self,
        items: impl IntoIterator<Item = PolicySetDefinition>,
        allow_overwrite: bool,
    ) -> Result<()> {
        add_versioned(&mut self.policy_set_definitions, items, allow_overwrite)
    }

    pub fn add_policy_assignments(
        &mut self,
        items: impl IntoIterator<Item = PolicyAssignment>,
        allow_overwrite: bool,
    ) -> Result<()> {
        add_unversioned(&mut self.policy_assignments, items, allow_overwrite)
    }

    pub fn add_role_definitions(
        &mut self,
        items: impl IntoIterator<Item = RoleDefinition>,
        allow_overwrite: bool,
    ) -> Result<()> {
        add_unversioned(&mut self.role_definitions, items, allow_overwrite)
    }

    /// Store a policy definition unless that version is already present.
    pub fn add_policy_definition_if_absent(&mut self, item: PolicyDefinition) -> Result<bool> {
        add_versioned_if_absent(&mut self.policy_definitions, item)
    }

    /// Store a policy set definition unless that version is already present.
    pub fn add_policy_set_definition_if_absent(&mut self, item: PolicySetDefinition) -> Result<bool> {
        add_versioned_if_absent(&mut self.policy_set_definitions, item)
    }

    pub fn policy_definition(&self, name: &str, version: Option<&str>) -> Result<PolicyDefinition> {
        get_versioned(&self.policy_definitions, name, version)
    }

    pub fn policy_set_definition(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PolicySetDefinition> {
        get_versioned(&self.policy_set_definitions, name, version)
    }

    pub fn policy_assignment(&self, name: &str) -> Result<PolicyAssignment> {
        get_unversioned(&self.policy_assignments, name)
    }

    pub fn role_definition(&self, name: &str) -> Result<RoleDefinition> {
        get_unversioned(&self.role_definitions, name)
    }

    pub fn policy_definition_versions(&self, name: &str) -> Result<Vec<Option<String>>> {
        self.policy_definitions
            .get(name)
            .map(VersionedAssetCollection::versions)
            .ok_or_else(|| Error::not_found(AssetKind::PolicyDefinition, name, None))
    }

    pub fn policy_set_definition_versions(&self, name: &str) -> Result<Vec<Option<String>>> {
        self.policy_set_definitions
            .get(name)
            .map(VersionedAssetCollection::versions)
            .ok_or_else(|| Error::not_found(AssetKind::PolicySetDefinition, name, None))
    }

    pub fn policy_definition_exists(&self, name: &str, version: Option<&str>) -> bool {
        self.policy_definitions
            .get(name)
            .is_some_and(|c| c.contains_version(version))
    }

    pub fn policy_set_definition_exists(&self, name: &str, version: Option<&str>) -> bool {
        self.policy_set_definitions
            .get(name)
            .is_some_and(|c| c.contains_version(version))
    }

    pub fn policy_assignment_exists(&self, name: &str) -> bool {
        self.policy_assignments.contains_key(name)
    }

    pub fn role_definition_exists(&self, name: &str) -> bool {
        self.role_definitions.contains_key(name)
    }

    /// Whether any version of `name` exists for `kind`.
    pub fn exists(&self, kind: AssetKind, name: &str) -> bool {
        match kind {
            AssetKind::PolicyDefinition => self.policy_definition_exists(name, None),
            AssetKind::PolicySetDefinition => self.policy_set_definition_exists(name, None),
            AssetKind::PolicyAssignment => self.policy_assignment_exists(name),
            AssetKind::RoleDefinition => self.role_definition_exists(name),
        }
    }

    /// Sorted names of every asset of `kind`.
    pub fn names(&self, kind: AssetKind) -> Vec<String> {
        match kind {
            AssetKind::PolicyDefinition => self.policy_definitions.keys().cloned().collect(),
            AssetKind::PolicySetDefinition => {
                self.policy_set_definitions.keys().cloned().collect()
            }
            AssetKind::PolicyAssignment => self.policy_assignments.keys().cloned().collect(),
            AssetKind::RoleDefinition => self.role_definitions.keys().cloned().collect(),
        }
    }

    pub fn len(&self, kind: AssetKind) -> usize {
        match kind {
            AssetKind::PolicyDefinition => self.policy_definitions.len(),
            AssetKind::PolicySetDefinition => self.policy_set_definitions.len(),
            AssetKind::PolicyAssignment => self.policy_assignments.len(),
            AssetKind::RoleDefinition => self.role_definitions.len(),
        }
    }

    pub(crate) fn policy_assignments_iter(&self) -> impl Iterator<Item = &PolicyAssignment> {
        self.policy_assignments.values()
    }

    pub(crate) fn policy_set_definitions_iter(&self) -> impl Iterator<Item = &PolicySetDefinition> {
        self.policy_set_definitions
            .values()
            .flat_map(VersionedAssetCollection::iter)
    }
}

fn add_versioned<T: VersionedAsset>(
    map: &mut VersionedMap<T>,
    items: impl IntoIterator<Item = T>,
    allow_overwrite: bool,
) -> Result<()> {
    let mut batch = BatchError::new(format!("adding {}s", T::KIND));
    for item in items {
        if item.name().is_empty() {
            debug!("Skipping {} with an empty name", T::KIND);
            continue;
        }
        let name = item.name().to_string();
        let Some(incoming) = batch.record(VersionedAssetCollection::from_asset(item)) else {
            continue;
        };
        match map.get_mut(&name) {
            Some(existing) => {
                batch.record(existing.upsert(incoming, allow_overwrite));
            }
            None => {
                map.insert(name, incoming);
            }
        }
    }
    batch.finish()
}

fn add_versioned_if_absent<T: VersionedAsset>(map: &mut VersionedMap<T>, item: T) -> Result<bool> {
    if item.name().is_empty() {
        return Err(Error::Validation {
            message: format!("{} without a name", T::KIND),
        });
    }
    map.entry(item.name().to_string())
        .or_insert_with_key(|name| VersionedAssetCollection::new(name.clone()))
        .add_if_absent(item)
}

fn add_unversioned<T: Asset>(
    map: &mut BTreeMap<String, T>,
    items: impl IntoIterator<Item = T>,
    allow_overwrite: bool,
) -> Result<()> {
    for item in items {
        if item.name().is_empty() {
            debug!("Skipping {} with an empty name", T::KIND);
            continue;
        }
        if map.contains_key(item.name()) && !allow_overwrite {
            return Err(Error::conflict(T::KIND, item.name(), None));
        }
        map.insert(item.name().to_string(), item);
    }
    Ok(())
}

fn get_versioned<T: VersionedAsset>(
    map: &VersionedMap<T>,
    name: &str,
    version: Option<&str>,
) -> Result<T> {
    map.get(name)
        .ok_or_else(|| Error::not_found(T::KIND, name, version))?
        .get_version_strict(version)
        .cloned()
}

fn get_unversioned<T: Asset>(map: &BTreeMap<String, T>, name: &str) -> Result<T> {
    map.get(name)
        .cloned()
        .ok_or_else(|| Error::not_found(T::KIND, name, None))
}

/// The asset maps behind one reader/writer lock.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    store: RwLock<AssetStore>,
    allow_overwrite: bool,
}

impl AssetRegistry {
    pub fn new(allow_overwrite: bool) -> Self {
        Self {
            store: RwLock::new(AssetStore::new()),
            allow_overwrite,
        }
    }

    pub fn allow_overwrite(&self) -> bool {
        self.allow_overwrite
    }

    /// Take the shared lock.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, AssetStore>> {
        self.store
            .read()
            .map_err(|_| Error::lock_poisoned("asset registry (read)"))
    }

    /// Take the exclusive lock.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, AssetStore>> {
        self.store
            .write()
            .map_err(|_| Error::lock_poisoned("asset registry (write)"))
    }

    pub fn add_policy_definitions(&self, items: impl IntoIterator<Item = PolicyDefinition>) -> Result<()> {
        self.write()?
            .add_policy_definitions(items, self.allow_overwrite)
    }

    pub fn add_policy_set_definitions(
        &self,
        items: impl IntoIterator<Item = PolicySetDefinition>,
    ) -> Result<()> {
        self.write()?
            .add_policy_set_definitions(items, self.allow_overwrite)
    }

    pub fn add_policy_assignments(&self, items: impl IntoIterator<Item = PolicyAssignment>) -> Result<()> {
        self.write()?
            .add_policy_assignments(items, self.allow_overwrite)
    }

    pub fn add_role_definitions(&self, items: impl IntoIterator<Item = RoleDefinition>) -> Result<()> {
        self.write()?
            .add_role_definitions(items, self.allow_overwrite)
    }

    pub fn policy_definition(&self, name: &str, version: Option<&str>) -> Result<PolicyDefinition> {
        self.read()?.policy_definition(name, version)
    }

    pub fn policy_set_definition(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PolicySetDefinition> {
        self.read()?.policy_set_definition(name, version)
    }

    pub fn policy_assignment(&self, name: &str) -> Result<PolicyAssignment> {
        self.read()?.policy_assignment(name)
    }

    pub fn role_definition(&self, name: &str) -> Result<RoleDefinition> {
        self.read()?.role_definition(name)
    }

    pub fn policy_definition_versions(&self, name: &str) -> Result<Vec<Option<String>>> {
        self.read()?.policy_definition_versions(name)
    }

    pub fn policy_set_definition_versions(&self, name: &str) -> Result<Vec<Option<String>>> {
        self.read()?.policy_set_definition_versions(name)
    }

    pub fn names(&self, kind: AssetKind) -> Result<Vec<String>> {
        Ok(self.read()?.names(kind))
    }

    pub fn policy_definition_exists(&self, name: &str, version: Option<&str>) -> bool {
        self.read()
            .map(|store| store.policy_definition_exists(name, version))
            .unwrap_or(false)
    }

    pub fn policy_set_definition_exists(&self, name: &str, version: Option<&str>) -> bool {
        self.read()
            .map(|store| store.policy_set_definition_exists(name, version))
            .unwrap_or(false)
    }

    pub fn policy_assignment_exists(&self, name: &str) -> bool {
        self.read()
            .map(|store| store.policy_assignment_exists(name))
            .unwrap_or(false)
    }

    pub fn role_definition_exists(&self, name: &str) -> bool {
        self.read()
            .map(|store| store.role_definition_exists(name))
            .unwrap_or(false)
    }

    pub fn exists(&self, kind: AssetKind, name: &str) -> bool {
        self.read()
            .map(|store| store.exists(kind, name))
            .unwrap_or(false)
    }
}
