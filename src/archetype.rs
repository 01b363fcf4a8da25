//! # Archetypes
//!
//! An archetype is a named bundle of asset names, one set per asset kind. It
//! says "a management group of this shape gets these definitions, set
//! definitions, assignments and roles". Archetypes hold names only; the
//! assets themselves live in the registry.
//!
//! ## Base Archetypes
//!
//! [`generate_archetypes`] turns declarations into archetypes. Every member
//! must already be in the registry, otherwise the archetype is rejected as a
//! whole. After generation an archetype named [`EMPTY_ARCHETYPE`] with no
//! members exists, so there is always a minimal baseline to extend.
//!
//! ## Override Archetypes
//!
//! [`generate_override_archetypes`] derives new archetypes from existing ones.
//! Per asset kind the result is `(base ∪ add) − remove`, so a name both added
//! and removed ends up removed. Members being removed are validated against
//! the registry as well, which catches stale names.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::assets::AssetKind;
use crate::error::{Error, Result};
use crate::registry::AssetStore;

/// The archetype synthesized when a library does not declare one.
pub const EMPTY_ARCHETYPE: &str = "empty";

/// A named bundle of asset names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Archetype {
    pub name: String,
    pub policy_definitions: BTreeSet<String>,
    pub policy_set_definitions: BTreeSet<String>,
    pub policy_assignments: BTreeSet<String>,
    pub role_definitions: BTreeSet<String>,
}

impl Archetype {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn members(&self, kind: AssetKind) -> &BTreeSet<String> {
        match kind {
            AssetKind::PolicyDefinition => &self.policy_definitions,
            AssetKind::PolicySetDefinition => &self.policy_set_definitions,
            AssetKind::PolicyAssignment => &self.policy_assignments,
            AssetKind::RoleDefinition => &self.role_definitions,
        }
    }

    fn members_mut(&mut self, kind: AssetKind) -> &mut BTreeSet<String> {
        match kind {
            AssetKind::PolicyDefinition => &mut self.policy_definitions,
            AssetKind::PolicySetDefinition => &mut self.policy_set_definitions,
            AssetKind::PolicyAssignment => &mut self.policy_assignments,
            AssetKind::RoleDefinition => &mut self.role_definitions,
        }
    }

    /// True when all four member sets are empty.
    pub fn is_empty(&self) -> bool {
        AssetKind::ALL.iter().all(|kind| self.members(*kind).is_empty())
    }
}

/// An archetype as declared in a library file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArchetypeDeclaration {
    pub name: String,
    #[serde(default)]
    pub policy_definitions: BTreeSet<String>,
    #[serde(default)]
    pub policy_set_definitions: BTreeSet<String>,
    #[serde(default)]
    pub policy_assignments: BTreeSet<String>,
    #[serde(default)]
    pub role_definitions: BTreeSet<String>,
}

impl ArchetypeDeclaration {
    fn into_archetype(self) -> Archetype {
        Archetype {
            name: self.name,
            policy_definitions: self.policy_definitions,
            policy_set_definitions: self.policy_set_definitions,
            policy_assignments: self.policy_assignments,
            role_definitions: self.role_definitions,
        }
    }
}

/// A derived archetype as declared in a library file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArchetypeOverrideDeclaration {
    pub name: String,
    pub base_archetype: String,
    #[serde(default)]
    pub policy_definitions_to_add: BTreeSet<String>,
    #[serde(default)]
    pub policy_definitions_to_remove: BTreeSet<String>,
    #[serde(default)]
    pub policy_set_definitions_to_add: BTreeSet<String>,
    #[serde(default)]
    pub policy_set_definitions_to_remove: BTreeSet<String>,
    #[serde(default)]
    pub policy_assignments_to_add: BTreeSet<String>,
    #[serde(default)]
    pub policy_assignments_to_remove: BTreeSet<String>,
    #[serde(default)]
    pub role_definitions_to_add: BTreeSet<String>,
    #[serde(default)]
    pub role_definitions_to_remove: BTreeSet<String>,
}

impl ArchetypeOverrideDeclaration {
    fn to_add(&self, kind: AssetKind) -> &BTreeSet<String> {
        match kind {
            AssetKind::PolicyDefinition => &self.policy_definitions_to_add,
            AssetKind::PolicySetDefinition => &self.policy_set_definitions_to_add,
            AssetKind::PolicyAssignment => &self.policy_assignments_to_add,
            AssetKind::RoleDefinition => &self.role_definitions_to_add,
        }
    }

    fn to_remove(&self, kind: AssetKind) -> &BTreeSet<String> {
        match kind {
            AssetKind::PolicyDefinition => &self.policy_definitions_to_remove,
            AssetKind::PolicySetDefinition => &self.policy_set_definitions_to_remove,
            AssetKind::PolicyAssignment => &self.policy_assignments_to_remove,
            AssetKind::RoleDefinition => &self.role_definitions_to_remove,
        }
    }
}

/// Build base archetypes from `declarations` into `existing`.
///
/// Processing stops at the first invalid declaration. Archetypes committed
/// before it stay committed.
pub fn generate_archetypes(
    store: &AssetStore,
    existing: &mut BTreeMap<String, Archetype>,
    declarations: impl IntoIterator<Item = ArchetypeDeclaration>,
    allow_overwrite: bool,
) -> Result<()> {
    for declaration in declarations {
        if existing.contains_key(&declaration.name) && !allow_overwrite {
            return Err(Error::conflict("archetype", &declaration.name, None));
        }
        let archetype = declaration.into_archetype();
        for kind in AssetKind::ALL {
            for member in archetype.members(kind) {
                ensure_member(store, &archetype.name, kind, member)?;
            }
        }
        debug!("Generated archetype `{}`", archetype.name);
        existing.insert(archetype.name.clone(), archetype);
    }

    existing
        .entry(EMPTY_ARCHETYPE.to_string())
        .or_insert_with(|| Archetype::new(EMPTY_ARCHETYPE));
    Ok(())
}

/// Derive override archetypes from `declarations` into `existing`.
pub fn generate_override_archetypes(
    store: &AssetStore,
    existing: &mut BTreeMap<String, Archetype>,
    declarations: impl IntoIterator<Item = ArchetypeOverrideDeclaration>,
) -> Result<()> {
    for declaration in declarations {
        if existing.contains_key(&declaration.name) {
            return Err(Error::conflict("archetype", &declaration.name, None));
        }
        let base = existing
            .get(&declaration.base_archetype)
            .ok_or_else(|| Error::not_found("archetype", &declaration.base_archetype, None))?;

        let mut derived = Archetype::new(&declaration.name);
        for kind in AssetKind::ALL {
            let add = declaration.to_add(kind);
            let remove = declaration.to_remove(kind);
            for member in add.iter().chain(remove) {
                ensure_member(store, &declaration.name, kind, member)?;
            }
            *derived.members_mut(kind) = apply_override(base.members(kind), add, remove);
        }

        debug!(
            "Generated override archetype `{}` from `{}`",
            derived.name, declaration.base_archetype
        );
        existing.insert(derived.name.clone(), derived);
    }
    Ok(())
}

/// `(base ∪ add) − remove`
fn apply_override(
    base: &BTreeSet<String>,
    add: &BTreeSet<String>,
    remove: &BTreeSet<String>,
) -> BTreeSet<String> {
    base.union(add)
        .filter(|name| !remove.contains(*name))
        .cloned()
        .collect()
}

fn ensure_member(store: &AssetStore, archetype: &str, kind: AssetKind, member: &str) -> Result<()> {
    if store.exists(kind, member) {
        return Ok(());
    }
    Err(Error::Validation {
        message: format!(
            "archetype `{}` references {} `{}`, which is not in the library",
            archetype, kind, member
        ),
    })
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn name_set() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set("[a-e]", 0..5)
    }

    proptest! {
        #[test]
        fn prop_override_is_union_minus_remove(base in name_set(), add in name_set(), remove in name_set()) {
            let result = apply_override(&base, &add, &remove);

            for name in &result {
                prop_assert!(base.contains(name) || add.contains(name));
                prop_assert!(!remove.contains(name));
            }
            for name in base.iter().chain(&add) {
                prop_assert_eq!(result.contains(name), !remove.contains(name));
            }
        }
    }
}
