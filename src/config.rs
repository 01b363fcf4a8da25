//! # Configuration
//!
//! Two layers of configuration exist:
//!
//! - **`AlzLibOptions`**: the knobs of the library itself, passed to
//!   [`AlzLib::new`](crate::AlzLib::new). `parallelism` bounds concurrent
//!   directory service requests; `allow_overwrite` lets later libraries
//!   replace assets, archetypes, architectures and default values declared
//!   by earlier ones.
//!
//! - **`WorkspaceConfig`**: the `.alzlib.yaml` file read by the `alzlib`
//!   binary. It lists the library directories to load, in order, and
//!   optionally overrides the options.
//!
//! ```yaml
//! options:
//!   parallelism: 4
//!   allow_overwrite: false
//! libraries:
//!   - path: ./lib/alz
//!   - path: ./lib/custom
//! ```
//!
//! Relative library paths are resolved against the directory holding the
//! configuration file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builtin::DEFAULT_PARALLELISM;
use crate::error::{Error, Result};
use crate::library::LocalLibrary;

/// Name of the workspace configuration file.
pub const CONFIG_FILE_NAME: &str = ".alzlib.yaml";

/// Options for an [`AlzLib`](crate::AlzLib) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlzLibOptions {
    /// Upper bound on concurrent directory service requests.
    pub parallelism: usize,
    /// Let later libraries replace what earlier libraries declared.
    pub allow_overwrite: bool,
}

impl Default for AlzLibOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            allow_overwrite: false,
        }
    }
}

impl AlzLibOptions {
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(Error::Configuration {
                message: "parallelism must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// One library entry of the workspace configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRef {
    pub path: PathBuf,
}

/// The contents of a `.alzlib.yaml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub options: AlzLibOptions,
    #[serde(default)]
    pub libraries: Vec<LibraryRef>,
}

impl WorkspaceConfig {
    /// Make relative library paths relative to `base` instead.
    pub fn resolve_paths(&mut self, base: &Path) {
        for library in &mut self.libraries {
            if library.path.is_relative() {
                library.path = base.join(&library.path);
            }
        }
    }

    /// The configured libraries as sources, in declaration order.
    pub fn library_sources(&self) -> Vec<LocalLibrary> {
        self.libraries
            .iter()
            .map(|library| LocalLibrary::new(&library.path))
            .collect()
    }
}

/// Parse a workspace configuration from YAML.
pub fn parse(yaml_content: &str) -> Result<WorkspaceConfig> {
    let config: WorkspaceConfig = serde_yaml::from_str(yaml_content)?;
    if config.libraries.is_empty() {
        return Err(Error::Configuration {
            message: "no libraries configured".to_string(),
        });
    }
    config.options.validate()?;
    Ok(config)
}

/// Read a workspace configuration file, resolving library paths against the
/// file's directory.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<WorkspaceConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut config = parse(&content)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    Ok(config)
}
