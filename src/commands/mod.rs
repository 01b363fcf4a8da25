//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the `alzlib`
//! command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic.
//!
//! Every command starts the same way: read the workspace configuration and
//! run [`AlzLib::init`] over its libraries. [`load`] does that.

pub mod check;
pub mod ls;
pub mod tree;

use std::path::Path;

use anyhow::{Context, Result};

use alzlib::{config, AlzLib};

/// Load the workspace configuration at `config_path` and initialise a library
/// from it.
pub fn load(config_path: &Path) -> Result<AlzLib> {
    let workspace = config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let alz = AlzLib::new(workspace.options.clone())?;
    alz.init(&workspace.library_sources())
        .context("Failed to load libraries")?;
    Ok(alz)
}
