//! # Architectures
//!
//! An architecture is a named tree of management groups. Each management
//! group is bound to one or more archetypes and carries its own snapshot of
//! the assets those archetypes name.
//!
//! ## Construction
//!
//! Library files declare management groups as a flat list with parent ids.
//! [`build_architecture`] turns that list into a tree:
//!
//! 1.  **Reference checks**: ids must be unique, every declared parent must be
//!     a declared id, and a group that already exists cannot sit below one
//!     that is still to be created.
//! 2.  **Breadth-first admission**: pass 0 admits the groups without a
//!     parent. Pass `d` admits the groups whose parent was admitted in pass
//!     `d - 1`. Construction ends when a pass admits nothing.
//! 3.  **Snapshots**: on admission the group's archetypes are looked up and
//!     the latest version of every named asset is copied into the group.
//!
//! Admitting a group at [`MAX_MANAGEMENT_GROUP_DEPTH`] or deeper is a fatal
//! error, and so is a group that is never admitted, which can only happen
//! when parent ids form a cycle.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Deserialize;

use crate::archetype::Archetype;
use crate::assets::{PolicyAssignment, PolicyDefinition, PolicySetDefinition, RoleDefinition};
use crate::error::{Error, Result};
use crate::registry::AssetStore;

/// Deepest level a management group may occupy, exclusive. Roots are level 0.
pub const MAX_MANAGEMENT_GROUP_DEPTH: usize = 6;

/// An architecture as declared in a library file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArchitectureDeclaration {
    pub name: String,
    #[serde(default)]
    pub management_groups: Vec<ManagementGroupDeclaration>,
}

/// One management group as declared in a library file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ManagementGroupDeclaration {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub archetypes: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// The management group already exists and is not created.
    #[serde(default)]
    pub exists: bool,
}

/// Owned copies of the assets bound to one management group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAssets {
    pub policy_definitions: BTreeMap<String, PolicyDefinition>,
    pub policy_set_definitions: BTreeMap<String, PolicySetDefinition>,
    pub policy_assignments: BTreeMap<String, PolicyAssignment>,
    pub role_definitions: BTreeMap<String, RoleDefinition>,
}

impl NodeAssets {
    fn materialize<'a>(
        store: &AssetStore,
        archetypes: impl IntoIterator<Item = &'a Archetype>,
    ) -> Result<Self> {
        let mut assets = NodeAssets::default();
        for archetype in archetypes {
            for name in &archetype.policy_definitions {
                assets
                    .policy_definitions
                    .insert(name.clone(), store.policy_definition(name, None)?);
            }
            for name in &archetype.policy_set_definitions {
                assets
                    .policy_set_definitions
                    .insert(name.clone(), store.policy_set_definition(name, None)?);
            }
            for name in &archetype.policy_assignments {
                assets
                    .policy_assignments
                    .insert(name.clone(), store.policy_assignment(name)?);
            }
            for name in &archetype.role_definitions {
                assets
                    .role_definitions
                    .insert(name.clone(), store.role_definition(name)?);
            }
        }
        Ok(assets)
    }

    pub fn is_empty(&self) -> bool {
        self.policy_definitions.is_empty()
            && self.policy_set_definitions.is_empty()
            && self.policy_assignments.is_empty()
            && self.role_definitions.is_empty()
    }
}

/// A management group within an architecture.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagementGroup {
    id: String,
    display_name: String,
    parent_id: Option<String>,
    exists: bool,
    level: usize,
    archetypes: Vec<String>,
    children: BTreeSet<String>,
    assets: NodeAssets,
}

impl ManagementGroup {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Distance from the root of the architecture, roots being level 0.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn archetypes(&self) -> &[String] {
        &self.archetypes
    }

    /// Child ids, sorted.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    pub fn assets(&self) -> &NodeAssets {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut NodeAssets {
        &mut self.assets
    }
}

/// A validated tree of management groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Architecture {
    name: String,
    nodes: BTreeMap<String, ManagementGroup>,
}

impl Architecture {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn management_group(&self, id: &str) -> Option<&ManagementGroup> {
        self.nodes.get(id)
    }

    pub fn management_group_mut(&mut self, id: &str) -> Option<&mut ManagementGroup> {
        self.nodes.get_mut(id)
    }

    /// All management group ids, sorted.
    pub fn management_groups(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    pub fn roots(&self) -> Vec<&ManagementGroup> {
        self.nodes.values().filter(|n| n.parent_id.is_none()).collect()
    }

    pub fn children(&self, id: &str) -> Vec<&ManagementGroup> {
        self.nodes
            .get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| self.nodes.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every management group in depth-first pre-order, siblings by id.
    pub fn walk(&self) -> Vec<&ManagementGroup> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<&ManagementGroup> = self.roots().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            ordered.push(node);
            stack.extend(self.children(&node.id).into_iter().rev());
        }
        ordered
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Build one architecture from its declaration.
pub fn build_architecture(
    store: &AssetStore,
    archetypes: &BTreeMap<String, Archetype>,
    declaration: &ArchitectureDeclaration,
) -> Result<Architecture> {
    let structural = |message: String| Error::Structural {
        architecture: declaration.name.clone(),
        message,
    };

    if declaration.management_groups.is_empty() {
        return Err(structural("no management groups declared".to_string()));
    }

    let mut declared: BTreeMap<&str, &ManagementGroupDeclaration> = BTreeMap::new();
    for group in &declaration.management_groups {
        if declared.insert(group.id.as_str(), group).is_some() {
            return Err(structural(format!(
                "management group `{}` is declared more than once",
                group.id
            )));
        }
    }

    for group in declared.values() {
        let Some(parent_id) = group.parent_id.as_deref() else {
            continue;
        };
        let parent = declared.get(parent_id).ok_or_else(|| {
            structural(format!(
                "management group `{}` has unknown parent `{}`",
                group.id, parent_id
            ))
        })?;
        if group.exists && !parent.exists {
            return Err(structural(format!(
                "existing management group `{}` cannot be placed under `{}`, which is not yet created",
                group.id, parent_id
            )));
        }
    }

    let mut nodes: BTreeMap<String, ManagementGroup> = BTreeMap::new();
    let mut frontier: BTreeSet<&str> = BTreeSet::new();
    let mut level = 0;

    loop {
        let admitted: Vec<&ManagementGroupDeclaration> = declared
            .values()
            .filter(|group| !nodes.contains_key(&group.id))
            .filter(|group| match group.parent_id.as_deref() {
                None => level == 0,
                Some(parent) => frontier.contains(parent),
            })
            .copied()
            .collect();
        if admitted.is_empty() {
            break;
        }
        if level >= MAX_MANAGEMENT_GROUP_DEPTH {
            return Err(structural(format!(
                "management group `{}` exceeds the maximum depth of {}",
                admitted[0].id, MAX_MANAGEMENT_GROUP_DEPTH
            )));
        }

        for group in &admitted {
            let bound = group
                .archetypes
                .iter()
                .map(|name| {
                    archetypes
                        .get(name)
                        .ok_or_else(|| Error::not_found("archetype", name, None))
                })
                .collect::<Result<Vec<_>>>()?;
            let node = ManagementGroup {
                id: group.id.clone(),
                display_name: group.display_name.clone(),
                parent_id: group.parent_id.clone(),
                exists: group.exists,
                level,
                archetypes: group.archetypes.clone(),
                children: BTreeSet::new(),
                assets: NodeAssets::materialize(store, bound)?,
            };
            if let Some(parent) = group.parent_id.as_deref().and_then(|p| nodes.get_mut(p)) {
                parent.children.insert(group.id.clone());
            }
            nodes.insert(group.id.clone(), node);
        }

        debug!(
            "Architecture `{}`: admitted {} management group(s) at level {}",
            declaration.name,
            admitted.len(),
            level
        );
        frontier = admitted.into_iter().map(|g| g.id.as_str()).collect();
        level += 1;
    }

    let unreachable: Vec<&str> = declared
        .keys()
        .copied()
        .filter(|id| !nodes.contains_key(*id))
        .collect();
    if !unreachable.is_empty() {
        return Err(structural(format!(
            "management groups [{}] are not reachable from a root; their parents form a cycle",
            unreachable.join(", ")
        )));
    }

    Ok(Architecture {
        name: declaration.name.clone(),
        nodes,
    })
}

/// Build `declarations` into `existing`.
pub fn generate_architectures(
    store: &AssetStore,
    archetypes: &BTreeMap<String, Archetype>,
    existing: &mut BTreeMap<String, Architecture>,
    declarations: impl IntoIterator<Item = ArchitectureDeclaration>,
    allow_overwrite: bool,
) -> Result<()> {
    for declaration in declarations {
        if existing.contains_key(&declaration.name) && !allow_overwrite {
            return Err(Error::conflict("architecture", &declaration.name, None));
        }
        let architecture = build_architecture(store, archetypes, &declaration)?;
        debug!(
            "Generated architecture `{}` with {} management groups",
            architecture.name,
            architecture.len()
        );
        existing.insert(declaration.name, architecture);
    }
    Ok(())
}
