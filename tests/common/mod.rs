//! Shared test utilities for integration and E2E tests.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_alz_library("lib/alz");
//!     // ... test code
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::library;
    pub use super::TestFixture;
}

/// Library file contents for building fixtures.
#[allow(dead_code)]
pub mod library {
    pub const DENY_IP_DEFINITION: &str =
        r#"{"name": "Deny-IP", "properties": {"version": "1.0.0", "policyType": "Custom"}}"#;

    /// Refers to a built-in definition that no fixture library ships.
    pub const AUDIT_VMS_ASSIGNMENT: &str = r#"{
        "name": "Audit-VMs",
        "properties": {
            "policyDefinitionId": "/providers/Microsoft.Authorization/policyDefinitions/audit-vm-managed-disks"
        }
    }"#;

    pub const DENY_IP_ASSIGNMENT: &str = r#"{
        "name": "Deny-IP",
        "properties": {
            "policyDefinitionId": "/providers/Microsoft.Management/managementGroups/alz/providers/Microsoft.Authorization/policyDefinitions/Deny-IP"
        }
    }"#;

    pub const ROOT_ARCHETYPE: &str = r#"
name: root
policy_definitions:
  - Deny-IP
policy_assignments:
  - Deny-IP
  - Audit-VMs
"#;

    pub const LANDING_ZONES_ARCHETYPE: &str = r#"{"name": "landing_zones", "policy_assignments": ["Deny-IP"]}"#;

    pub const ALZ_ARCHITECTURE: &str = r#"
name: alz
management_groups:
  - id: alz
    display_name: Azure Landing Zones
    archetypes: [root]
  - id: platform
    display_name: Platform
    archetypes: [empty]
    parent_id: alz
  - id: landingzones
    display_name: Landing Zones
    archetypes: [landing_zones]
    parent_id: alz
  - id: corp
    display_name: Corp
    archetypes: [empty]
    parent_id: landingzones
"#;

    pub const DEFAULT_VALUES: &str = r#"{
        "defaults": [
            {
                "default_name": "ip_effect",
                "description": "Effect of the IP forwarding policy",
                "policy_assignments": [
                    {"policy_assignment_name": "Deny-IP", "parameter_names": ["effect"]}
                ]
            }
        ]
    }"#;

    pub const METADATA: &str = r#"{"name": "platform/alz", "display_name": "Azure Landing Zones"}"#;

    pub const CUSTOM_OVERRIDE: &str = r#"{
        "name": "root_custom",
        "base_archetype": "root",
        "policy_assignments_to_remove": ["Audit-VMs"]
    }"#;
}

/// A temporary workspace holding libraries and an `.alzlib.yaml`.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `.alzlib.yaml` configuration file with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.with_file(".alzlib.yaml", content)
    }

    /// Add a configuration listing `libraries` in order.
    pub fn with_libraries(self, libraries: &[&str]) -> Self {
        let mut config = String::from("libraries:\n");
        for library in libraries {
            config.push_str(&format!("  - path: {}\n", library));
        }
        self.with_config(&config)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Add the base library under `dir`.
    pub fn with_alz_library(self, dir: &str) -> Self {
        self.with_file(
            &format!("{dir}/policy_definitions/Deny-IP.alz_policy_definition.json"),
            library::DENY_IP_DEFINITION,
        )
        .with_file(
            &format!("{dir}/policy_assignments/Deny-IP.alz_policy_assignment.json"),
            library::DENY_IP_ASSIGNMENT,
        )
        .with_file(
            &format!("{dir}/policy_assignments/Audit-VMs.alz_policy_assignment.json"),
            library::AUDIT_VMS_ASSIGNMENT,
        )
        .with_file(
            &format!("{dir}/archetypes/root.alz_archetype_definition.yaml"),
            library::ROOT_ARCHETYPE,
        )
        .with_file(
            &format!("{dir}/archetypes/landing_zones.alz_archetype_definition.json"),
            library::LANDING_ZONES_ARCHETYPE,
        )
        .with_file(
            &format!("{dir}/architectures/alz.alz_architecture_definition.yaml"),
            library::ALZ_ARCHITECTURE,
        )
        .with_file(
            &format!("{dir}/alz_policy_default_values.json"),
            library::DEFAULT_VALUES,
        )
        .with_file(&format!("{dir}/alz_library_metadata.json"), library::METADATA)
        .with_file(&format!("{dir}/README.md"), "# ALZ library\n")
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join(".alzlib.yaml")
    }

    /// Create a command configured to run in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("alzlib");
        cmd.current_dir(self.path());
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
