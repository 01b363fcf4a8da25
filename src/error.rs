//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for `alzlib`.
//! It uses the `thiserror` library to create a single `Error` enum covering
//! every failure mode of the library, with enough context (asset kind, name,
//! version, architecture, library) to make a failure actionable.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Variants map onto the error taxonomy of the
//!   library: configuration, conflict, not-found, validation, structural,
//!   external and aggregate failures.
//!
//! - **`BatchError`**: The outcome of a batch operation that collected more
//!   than one independent failure (for example merging many policy definition
//!   versions). Batch operations never stop at the first failure; they report
//!   the complete failure surface of one call.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.

use std::fmt;

use thiserror::Error;

use crate::assets::AssetKind;

/// Main error type for alzlib operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid options, or a collaborator that was never supplied.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// An asset, archetype, architecture or default value with the same
    /// identity already exists and overwriting is not allowed.
    #[error("Conflict: {kind} `{name}`{} already exists", fmt_version(version))]
    Conflict {
        kind: String,
        name: String,
        version: Option<String>,
    },

    /// The named item does not exist.
    #[error("Not found: {kind} `{name}`{}", fmt_version(version))]
    NotFound {
        kind: String,
        name: String,
        version: Option<String>,
    },

    /// The name exists but not the requested version.
    ///
    /// Kept apart from `NotFound` so callers can decide to fetch the missing
    /// version from the directory service.
    #[error("Version not found: {kind} `{name}` has no version matching `{version}`")]
    VersionNotFound {
        kind: AssetKind,
        name: String,
        version: String,
    },

    /// A dangling reference or malformed asset.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A management group hierarchy that cannot be built.
    #[error("Structural error in architecture `{architecture}`: {message}")]
    Structural {
        architecture: String,
        message: String,
    },

    /// A directory service call failed.
    #[error("External error during {operation}: {message}")]
    External { operation: String, message: String },

    /// The operation was cancelled or its deadline elapsed.
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Several independent failures collected from one batch operation.
    #[error("{0}")]
    Aggregate(BatchError),

    /// A failure while processing one library source.
    #[error("Library `{library}`: {source}")]
    Library {
        library: String,
        #[source]
        source: Box<Error>,
    },

    /// A library file could not be interpreted.
    #[error("Processor error in {path}: {message}")]
    Processor { path: String, message: String },

    /// An error indicating that a lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON parsing error, wrapped from `serde_json::Error`.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),

    /// A directory walk error, wrapped from `walkdir::Error`.
    #[error("Directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),
}

fn fmt_version(version: &Option<String>) -> String {
    version
        .as_ref()
        .map(|v| format!(" (version {})", v))
        .unwrap_or_default()
}

impl Error {
    /// Wrap this error with the identity of the library it came from.
    pub fn in_library(self, library: impl Into<String>) -> Self {
        Error::Library {
            library: library.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn conflict(kind: impl fmt::Display, name: &str, version: Option<&str>) -> Self {
        Error::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }

    pub(crate) fn not_found(kind: impl fmt::Display, name: &str, version: Option<&str>) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }

    pub(crate) fn lock_poisoned(context: &str) -> Self {
        Error::LockPoisoned {
            context: context.to_string(),
        }
    }

    /// True for `NotFound` and `VersionNotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::VersionNotFound { .. })
    }
}

/// Failures collected from a batch operation.
#[derive(Debug)]
pub struct BatchError {
    operation: String,
    errors: Vec<Error>,
}

impl BatchError {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            errors: Vec::new(),
        }
    }

    /// Record the outcome of one item.
    pub fn record<T>(&mut self, outcome: Result<T>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(Error::Aggregate(inner)) => {
                self.errors.extend(inner.errors);
                None
            }
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    pub fn push(&mut self, error: Error) {
        self.record::<()>(Err(error));
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn first(&self) -> Option<&Error> {
        self.errors.first()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing failed, the lone error when exactly one item
    /// failed, and an `Aggregate` otherwise.
    pub fn finish(mut self) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(Error::Aggregate(self)),
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed with {} errors", self.operation, self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_conflict() {
        let error = Error::conflict(AssetKind::PolicyDefinition, "deny-ip", Some("1.0.0"));
        let display = error.to_string();
        assert!(display.contains("Conflict"));
        assert!(display.contains("policy definition"));
        assert!(display.contains("deny-ip"));
        assert!(display.contains("(version 1.0.0)"));
    }

    #[test]
    fn test_error_display_not_found_without_version() {
        let error = Error::not_found("archetype", "corp", None);
        let display = error.to_string();
        assert!(display.contains("Not found: archetype `corp`"));
        assert!(!display.contains("version"));
    }

    #[test]
    fn test_error_display_structural() {
        let error = Error::Structural {
            architecture: "alz".to_string(),
            message: "no management groups declared".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("architecture `alz`"));
        assert!(display.contains("no management groups declared"));
    }

    #[test]
    fn test_error_in_library_keeps_source() {
        let error = Error::Validation {
            message: "bad".to_string(),
        }
        .in_library("platform");
        assert!(error.to_string().contains("Library `platform`"));
        let source = std::error::Error::source(&error).unwrap();
        assert!(source.to_string().contains("bad"));
    }

    #[test]
    fn test_batch_error_finish_empty_is_ok() {
        let batch = BatchError::new("merge");
        assert!(batch.finish().is_ok());
    }

    #[test]
    fn test_batch_error_finish_single_unwraps() {
        let mut batch = BatchError::new("merge");
        batch.push(Error::not_found("archetype", "a", None));
        let error = batch.finish().unwrap_err();
        assert!(matches!(error, Error::NotFound { .. }));
    }

    #[test]
    fn test_batch_error_collects_all_and_flattens() {
        let mut inner = BatchError::new("inner");
        inner.push(Error::conflict("policy definition", "a", Some("1.0.0")));
        inner.push(Error::conflict("policy definition", "a", Some("2.0.0")));

        let mut batch = BatchError::new("add policy definitions");
        assert_eq!(batch.record(Ok(1)), Some(1));
        batch.record::<()>(Err(Error::Aggregate(inner)));
        batch.push(Error::conflict("policy definition", "b", None));

        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.first(), Some(Error::Conflict { name, .. }) if name == "a"));
        let error = batch.finish().unwrap_err();
        let display = error.to_string();
        assert!(display.contains("add policy definitions failed with 3 errors"));
        assert!(display.contains("`b`"));
    }

    #[test]
    fn test_error_from_yaml_error() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: [unclosed").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(error.to_string().contains("YAML parsing error"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::not_found("archetype", "x", None).is_not_found());
        assert!(Error::VersionNotFound {
            kind: AssetKind::PolicyDefinition,
            name: "x".to_string(),
            version: "1.0.0".to_string(),
        }
        .is_not_found());
        assert!(!Error::lock_poisoned("registry").is_not_found());
    }
}
