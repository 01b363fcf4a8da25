//! # Library Processing
//!
//! A [`Processor`] turns one library's files into a [`ProcessorResult`]: the
//! assets it ships plus the archetype, override, architecture, default value
//! and metadata declarations that are built from them.
//!
//! ## File Classification
//!
//! [`LibraryProcessor`] looks at the last dot-separated part of each file
//! name before its `.json`, `.yaml` or `.yml` extension:
//!
//! | marker                        | parsed as                          |
//! |-------------------------------|------------------------------------|
//! | `alz_policy_definition`       | [`PolicyDefinition`]               |
//! | `alz_policy_set_definition`   | [`PolicySetDefinition`]            |
//! | `alz_policy_assignment`       | [`PolicyAssignment`]               |
//! | `alz_role_definition`         | [`RoleDefinition`]                 |
//! | `alz_archetype_definition`    | [`ArchetypeDeclaration`]           |
//! | `alz_archetype_override`      | [`ArchetypeOverrideDeclaration`]   |
//! | `alz_architecture_definition` | [`ArchitectureDeclaration`]        |
//! | `alz_policy_default_values`   | [`DefaultValuesDeclaration`]       |
//! | `alz_library_metadata`        | [`LibraryMetadataDeclaration`]     |
//!
//! Any other file is ignored.

use std::collections::BTreeSet;
use std::path::Path;

use log::{debug, trace};
use serde::de::DeserializeOwned;

use crate::archetype::{ArchetypeDeclaration, ArchetypeOverrideDeclaration};
use crate::architecture::ArchitectureDeclaration;
use crate::assets::{PolicyAssignment, PolicyDefinition, PolicySetDefinition, RoleDefinition};
use crate::defaults::{DefaultValueDeclaration, DefaultValuesDeclaration};
use crate::error::{Error, Result};
use crate::filesystem::LibraryFs;
use crate::metadata::LibraryMetadataDeclaration;

/// Everything one library source declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorResult {
    pub policy_definitions: Vec<PolicyDefinition>,
    pub policy_set_definitions: Vec<PolicySetDefinition>,
    pub policy_assignments: Vec<PolicyAssignment>,
    pub role_definitions: Vec<RoleDefinition>,
    pub archetypes: Vec<ArchetypeDeclaration>,
    pub archetype_overrides: Vec<ArchetypeOverrideDeclaration>,
    pub architectures: Vec<ArchitectureDeclaration>,
    pub default_values: Vec<DefaultValueDeclaration>,
    pub metadata: Option<LibraryMetadataDeclaration>,
}

/// Turns a library's files into a [`ProcessorResult`].
pub trait Processor: Send + Sync {
    fn process(&self, fs: &LibraryFs) -> Result<ProcessorResult>;
}

/// The library file kinds understood by [`LibraryProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    PolicyDefinition,
    PolicySetDefinition,
    PolicyAssignment,
    RoleDefinition,
    Archetype,
    ArchetypeOverride,
    Architecture,
    DefaultValues,
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

fn classify(path: &Path) -> Option<(FileKind, Format)> {
    let format = match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "json" => Format::Json,
        "yaml" | "yml" => Format::Yaml,
        _ => return None,
    };
    let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
    let marker = stem.rsplit('.').next()?;
    let kind = match marker {
        "alz_policy_definition" => FileKind::PolicyDefinition,
        "alz_policy_set_definition" => FileKind::PolicySetDefinition,
        "alz_policy_assignment" => FileKind::PolicyAssignment,
        "alz_role_definition" => FileKind::RoleDefinition,
        "alz_archetype_definition" => FileKind::Archetype,
        "alz_archetype_override" => FileKind::ArchetypeOverride,
        "alz_architecture_definition" => FileKind::Architecture,
        "alz_policy_default_values" => FileKind::DefaultValues,
        "alz_library_metadata" => FileKind::Metadata,
        _ => return None,
    };
    Some((kind, format))
}

/// The default processor for JSON and YAML library files.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryProcessor;

impl LibraryProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for LibraryProcessor {
    fn process(&self, fs: &LibraryFs) -> Result<ProcessorResult> {
        let mut result = ProcessorResult::default();

        for (path, file) in fs.files() {
            let Some((kind, format)) = classify(path) else {
                trace!("Ignoring {}", path.display());
                continue;
            };
            let text = file.as_str(path)?;

            match kind {
                FileKind::PolicyDefinition => result.policy_definitions.push(parse(path, format, text)?),
                FileKind::PolicySetDefinition => {
                    result.policy_set_definitions.push(parse(path, format, text)?)
                }
                FileKind::PolicyAssignment => result.policy_assignments.push(parse(path, format, text)?),
                FileKind::RoleDefinition => result.role_definitions.push(parse(path, format, text)?),
                FileKind::Archetype => result.archetypes.push(parse(path, format, text)?),
                FileKind::ArchetypeOverride => result.archetype_overrides.push(parse(path, format, text)?),
                FileKind::Architecture => result.architectures.push(parse(path, format, text)?),
                FileKind::DefaultValues => {
                    let declared: DefaultValuesDeclaration = parse(path, format, text)?;
                    result.default_values.extend(declared.defaults);
                }
                FileKind::Metadata => {
                    if result.metadata.is_some() {
                        return Err(Error::Processor {
                            path: path.display().to_string(),
                            message: "library declares more than one metadata file".to_string(),
                        });
                    }
                    result.metadata = Some(parse(path, format, text)?);
                }
            }
        }

        ensure_unique("archetype", result.archetypes.iter().map(|a| a.name.as_str()))?;
        ensure_unique(
            "archetype override",
            result.archetype_overrides.iter().map(|o| o.name.as_str()),
        )?;
        ensure_unique("architecture", result.architectures.iter().map(|a| a.name.as_str()))?;
        ensure_unique(
            "default policy assignment value",
            result.default_values.iter().map(|d| d.default_name.as_str()),
        )?;

        debug!(
            "Processed library {}: {} policy definitions, {} policy set definitions, {} policy assignments, {} role definitions, {} archetypes, {} overrides, {} architectures",
            fs.name(),
            result.policy_definitions.len(),
            result.policy_set_definitions.len(),
            result.policy_assignments.len(),
            result.role_definitions.len(),
            result.archetypes.len(),
            result.archetype_overrides.len(),
            result.architectures.len(),
        );
        Ok(result)
    }
}

fn parse<T: DeserializeOwned>(path: &Path, format: Format, text: &str) -> Result<T> {
    let parsed = match format {
        Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| Error::Processor {
        path: path.display().to_string(),
        message,
    })
}

fn ensure_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::conflict(kind, name, None));
        }
    }
    Ok(())
}
