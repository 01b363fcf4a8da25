//! Default policy assignment values.
//!
//! A default value gives one name to a parameter that several policy
//! assignments share, for example the Log Analytics workspace id. The table
//! maps each default name to the (assignment, parameter) pairs it sets.
//!
//! A pair belongs to at most one default name across everything that has
//! been loaded. Declaring it under a second name is a conflict.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};

/// The contents of an `alz_policy_default_values` library file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DefaultValuesDeclaration {
    #[serde(default)]
    pub defaults: Vec<DefaultValueDeclaration>,
}

/// One default name as declared in a library file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DefaultValueDeclaration {
    pub default_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub policy_assignments: Vec<AssignmentParameters>,
}

/// Parameters of one assignment covered by a default name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssignmentParameters {
    pub policy_assignment_name: String,
    #[serde(default)]
    pub parameter_names: Vec<String>,
}

/// The pairs set by one default name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultPolicyAssignmentValue {
    description: String,
    assignments: BTreeMap<String, BTreeSet<String>>,
}

impl DefaultPolicyAssignmentValue {
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Assignment names, sorted.
    pub fn assignment_names(&self) -> impl Iterator<Item = &str> {
        self.assignments.keys().map(String::as_str)
    }

    /// Parameter names this default sets on `assignment`, sorted.
    pub fn parameter_names(&self, assignment: &str) -> Vec<&str> {
        self.assignments
            .get(assignment)
            .map(|params| params.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn covers(&self, assignment: &str, parameter: &str) -> bool {
        self.assignments
            .get(assignment)
            .is_some_and(|params| params.contains(parameter))
    }
}

/// Every default name known to a library.
#[derive(Debug, Clone, Default)]
pub struct DefaultValues {
    values: BTreeMap<String, DefaultPolicyAssignmentValue>,
    owners: BTreeMap<(String, String), String>,
}

impl DefaultValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one default name.
    ///
    /// Nothing is changed when the declaration is rejected.
    pub fn add(&mut self, declaration: DefaultValueDeclaration, allow_overwrite: bool) -> Result<()> {
        let name = declaration.default_name;
        if name.is_empty() {
            return Err(Error::Validation {
                message: "default policy assignment value without a name".to_string(),
            });
        }
        if self.values.contains_key(&name) && !allow_overwrite {
            return Err(Error::conflict("default policy assignment value", &name, None));
        }

        let mut assignments: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in declaration.policy_assignments {
            assignments
                .entry(entry.policy_assignment_name)
                .or_default()
                .extend(entry.parameter_names);
        }

        for (assignment, params) in &assignments {
            for param in params {
                let key = (assignment.clone(), param.clone());
                match self.owners.get(&key) {
                    Some(owner) if *owner != name => {
                        return Err(Error::conflict(
                            format!("default `{}` for policy assignment parameter", owner),
                            &format!("{}/{}", assignment, param),
                            None,
                        ));
                    }
                    _ => {}
                }
            }
        }

        self.owners.retain(|_, owner| *owner != name);
        for (assignment, params) in &assignments {
            for param in params {
                self.owners
                    .insert((assignment.clone(), param.clone()), name.clone());
            }
        }
        debug!(
            "Added default policy assignment value `{}` covering {} assignment(s)",
            name,
            assignments.len()
        );
        self.values.insert(
            name,
            DefaultPolicyAssignmentValue {
                description: declaration.description,
                assignments,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DefaultPolicyAssignmentValue> {
        self.values.get(name)
    }

    /// The default name that sets `parameter` on `assignment`.
    pub fn owner(&self, assignment: &str, parameter: &str) -> Option<&str> {
        self.owners
            .get(&(assignment.to_string(), parameter.to_string()))
            .map(String::as_str)
    }

    /// Default names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
