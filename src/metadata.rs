//! # Library Metadata
//!
//! One [`Metadata`] record is kept for every library source that `init`
//! processed. It combines what the library says about itself (from its
//! `alz_library_metadata` file, when present) with a content fingerprint.
//!
//! The fingerprint is a SHA-256 digest over every file path and content in
//! path order. Two sources with the same fingerprint hold the same files, so
//! the second one is skipped.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::filesystem::LibraryFs;

/// The contents of an `alz_library_metadata` library file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryMetadataDeclaration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub dependencies: Vec<LibraryDependency>,
}

/// A library this library builds on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LibraryDependency {
    /// A library in the shared catalogue, by path and ref.
    Catalogue {
        path: String,
        #[serde(rename = "ref")]
        reference: String,
    },
    /// A library at an arbitrary location.
    Custom { custom_url: String },
}

/// Provenance of one processed library source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    source: String,
    declared: LibraryMetadataDeclaration,
    fingerprint: String,
}

impl Metadata {
    pub fn new(
        source: impl Into<String>,
        declared: Option<LibraryMetadataDeclaration>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            declared: declared.unwrap_or_default(),
            fingerprint: fingerprint.into(),
        }
    }

    /// The name of the source this record came from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The declared library name, falling back to the source name.
    pub fn name(&self) -> &str {
        if self.declared.name.is_empty() {
            &self.source
        } else {
            &self.declared.name
        }
    }

    pub fn display_name(&self) -> &str {
        &self.declared.display_name
    }

    pub fn description(&self) -> &str {
        &self.declared.description
    }

    pub fn path(&self) -> &str {
        &self.declared.path
    }

    pub fn dependencies(&self) -> &[LibraryDependency] {
        &self.declared.dependencies
    }

    /// Hex SHA-256 of the source's files.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Content fingerprint of a library's files.
pub fn fingerprint(fs: &LibraryFs) -> String {
    let mut hasher = Sha256::new();
    for (path, file) in fs.files() {
        let path = path.to_string_lossy();
        hasher.update((path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update((file.content.len() as u64).to_le_bytes());
        hasher.update(&file.content);
    }
    format!("{:x}", hasher.finalize())
}
