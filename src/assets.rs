//! # Governance Asset Models
//!
//! Typed models of the four asset kinds the library manages, in the shape the
//! directory service and the library files use (camelCase JSON with a
//! `properties` envelope). Fields the library never interprets are kept as
//! raw `serde_json::Value`s so that nothing is lost on the way through.
//!
//! Every asset implements [`Asset`], which gives it a kind and a registry
//! key. Policy definitions and policy set definitions are also
//! [`VersionedAsset`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The four asset kinds held by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    PolicyDefinition,
    PolicySetDefinition,
    PolicyAssignment,
    RoleDefinition,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [
        AssetKind::PolicyDefinition,
        AssetKind::PolicySetDefinition,
        AssetKind::PolicyAssignment,
        AssetKind::RoleDefinition,
    ];

    /// Whether assets of this kind are stored per version.
    pub fn is_versioned(self) -> bool {
        matches!(
            self,
            AssetKind::PolicyDefinition | AssetKind::PolicySetDefinition
        )
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssetKind::PolicyDefinition => "policy definition",
            AssetKind::PolicySetDefinition => "policy set definition",
            AssetKind::PolicyAssignment => "policy assignment",
            AssetKind::RoleDefinition => "role definition",
        };
        f.write_str(label)
    }
}

/// Common behaviour of every registry asset.
pub trait Asset: Clone + Send + Sync + 'static {
    const KIND: AssetKind;

    /// The key the registry stores this asset under.
    fn name(&self) -> &str;
}

/// An asset that may exist in several versions under one name.
pub trait VersionedAsset: Asset {
    /// The declared version, `None` for unversioned assets.
    fn version(&self) -> Option<&str>;
}

/// A policy definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub properties: PolicyDefinitionProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinitionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_rule: Option<Value>,
}

impl PolicyDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.properties.version = Some(version.into());
        self
    }
}

impl Asset for PolicyDefinition {
    const KIND: AssetKind = AssetKind::PolicyDefinition;

    fn name(&self) -> &str {
        &self.name
    }
}

impl VersionedAsset for PolicyDefinition {
    fn version(&self) -> Option<&str> {
        self.properties.version.as_deref()
    }
}

/// A policy set definition (initiative).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySetDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub properties: PolicySetDefinitionProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySetDefinitionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub policy_definitions: Vec<PolicyDefinitionReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_definition_groups: Vec<Value>,
}

/// One member of a policy set definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinitionReference {
    pub policy_definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_definition_reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_names: Vec<String>,
}

impl PolicySetDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.properties.version = Some(version.into());
        self
    }

    /// Add a member reference to a policy definition.
    pub fn with_member(mut self, policy_definition_id: impl Into<String>, version: Option<&str>) -> Self {
        self.properties
            .policy_definitions
            .push(PolicyDefinitionReference {
                policy_definition_id: policy_definition_id.into(),
                definition_version: version.map(str::to_string),
                ..Default::default()
            });
        self
    }
}

impl Asset for PolicySetDefinition {
    const KIND: AssetKind = AssetKind::PolicySetDefinition;

    fn name(&self) -> &str {
        &self.name
    }
}

impl VersionedAsset for PolicySetDefinition {
    fn version(&self) -> Option<&str> {
        self.properties.version.as_deref()
    }
}

/// A policy assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAssignment {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Value>,
    #[serde(default)]
    pub properties: PolicyAssignmentProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAssignmentProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub policy_definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// The value bound to one assignment parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub value: Value,
}

impl PolicyAssignment {
    pub fn new(name: impl Into<String>, policy_definition_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: PolicyAssignmentProperties {
                policy_definition_id: policy_definition_id.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl Asset for PolicyAssignment {
    const KIND: AssetKind = AssetKind::PolicyAssignment;

    fn name(&self) -> &str {
        &self.name
    }
}

/// A role definition.
///
/// Archetypes refer to role definitions by role name, so the registry key is
/// `properties.roleName`, falling back to `name` when it is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub properties: RoleDefinitionProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinitionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub role_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignable_scopes: Vec<String>,
}

impl RoleDefinition {
    pub fn new(name: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: RoleDefinitionProperties {
                role_name: Some(role_name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl Asset for RoleDefinition {
    const KIND: AssetKind = AssetKind::RoleDefinition;

    fn name(&self) -> &str {
        match self.properties.role_name.as_deref() {
            Some(role_name) if !role_name.is_empty() => role_name,
            _ => &self.name,
        }
    }
}

static POLICY_RESOURCE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/providers/Microsoft\.Authorization/(policyDefinitions|policySetDefinitions)/([^/]+)$")
        .expect("static regex")
});

/// A parsed policy resource id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResourceId {
    pub kind: AssetKind,
    pub name: String,
    /// True when the id is not scoped below a management group or
    /// subscription, which is how built-ins are addressed.
    pub built_in: bool,
}

impl PolicyResourceId {
    /// Parse a policy definition or policy set definition resource id.
    ///
    /// ```
    /// use alzlib::assets::{AssetKind, PolicyResourceId};
    ///
    /// let id = PolicyResourceId::parse(
    ///     "/providers/Microsoft.Authorization/policyDefinitions/0a914e76-4921-4c19-b460-a2d36003525a",
    /// )
    /// .unwrap();
    /// assert_eq!(id.kind, AssetKind::PolicyDefinition);
    /// assert!(id.built_in);
    /// ```
    pub fn parse(resource_id: &str) -> Result<Self> {
        let captures = POLICY_RESOURCE_ID
            .captures(resource_id)
            .ok_or_else(|| Error::Validation {
                message: format!("`{}` is not a policy resource id", resource_id),
            })?;

        let kind = if captures[1].eq_ignore_ascii_case("policyDefinitions") {
            AssetKind::PolicyDefinition
        } else {
            AssetKind::PolicySetDefinition
        };
        let prefix_len = captures.get(0).map(|m| m.start()).unwrap_or(0);

        Ok(Self {
            kind,
            name: captures[2].to_string(),
            built_in: prefix_len == 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_definition_keyed_by_role_name() {
        let role = RoleDefinition::new("c9a07a05-a1fc-53fe-a565-5eed25597c03", "Network-Management");
        assert_eq!(role.name(), "Network-Management");

        let mut unnamed = role.clone();
        unnamed.properties.role_name = None;
        assert_eq!(unnamed.name(), "c9a07a05-a1fc-53fe-a565-5eed25597c03");
    }

    #[test]
    fn test_policy_definition_deserialize() {
        let json = r#"{
            "name": "Deny-Public-IP",
            "type": "Microsoft.Authorization/policyDefinitions",
            "properties": {
                "displayName": "Deny public IPs",
                "mode": "Indexed",
                "version": "1.0.0",
                "parameters": { "effect": { "type": "String" } },
                "policyRule": { "if": {}, "then": {} }
            }
        }"#;
        let def: PolicyDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.name(), "Deny-Public-IP");
        assert_eq!(def.version(), Some("1.0.0"));
        assert!(def.properties.parameters.contains_key("effect"));
    }

    #[test]
    fn test_policy_set_definition_members() {
        let json = r#"{
            "name": "Enforce-Encryption",
            "properties": {
                "policyDefinitions": [
                    {
                        "policyDefinitionId": "/providers/Microsoft.Authorization/policyDefinitions/abc",
                        "policyDefinitionReferenceId": "abc-ref",
                        "definitionVersion": "1.*.*"
                    }
                ]
            }
        }"#;
        let set: PolicySetDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(set.version(), None);
        assert_eq!(set.properties.policy_definitions.len(), 1);
        assert_eq!(
            set.properties.policy_definitions[0].definition_version.as_deref(),
            Some("1.*.*")
        );
    }

    #[test]
    fn test_parse_builtin_resource_id() {
        let id = PolicyResourceId::parse(
            "/providers/Microsoft.Authorization/policySetDefinitions/Enforce-Encryption",
        )
        .unwrap();
        assert_eq!(id.kind, AssetKind::PolicySetDefinition);
        assert_eq!(id.name, "Enforce-Encryption");
        assert!(id.built_in);
    }

    #[test]
    fn test_parse_custom_resource_id() {
        let id = PolicyResourceId::parse(
            "/providers/Microsoft.Management/managementGroups/alz/providers/Microsoft.Authorization/policyDefinitions/Deny-Public-IP",
        )
        .unwrap();
        assert_eq!(id.kind, AssetKind::PolicyDefinition);
        assert_eq!(id.name, "Deny-Public-IP");
        assert!(!id.built_in);
    }

    #[test]
    fn test_parse_invalid_resource_id() {
        let result = PolicyResourceId::parse("/subscriptions/123/resourceGroups/rg");
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_asset_kind_display() {
        assert_eq!(AssetKind::PolicySetDefinition.to_string(), "policy set definition");
        assert!(AssetKind::PolicyDefinition.is_versioned());
        assert!(!AssetKind::RoleDefinition.is_versioned());
    }
}
