//! # Check Command Implementation
//!
//! This module implements the `check` subcommand, which loads every library
//! listed in the workspace configuration and reports what was built.
//!
//! ## Functionality
//!
//! - **Library Validation**: all libraries are processed in order, so any
//!   dangling reference, conflict or malformed hierarchy is reported with the
//!   library it came from.
//! - **Summary**: asset counts per kind, archetypes and architectures.
//! - **Built-in Gaps**: the built-in definitions and set definitions that the
//!   loaded assets reference but the libraries do not ship. With `--strict`
//!   any gap makes the command fail.
//!
//! This command is a safe, read-only operation that does not modify any files.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use alzlib::assets::AssetKind;
use alzlib::config::CONFIG_FILE_NAME;

/// Load all libraries and report what was built
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the workspace configuration file.
    #[arg(short, long, value_name = "FILE", default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Fail when loaded assets reference built-ins that no library provides.
    #[arg(long)]
    pub strict: bool,
}

/// Execute the `check` command.
pub fn execute(args: CheckArgs) -> Result<()> {
    println!("Loading configuration from: {}", args.config.display());
    let alz = super::load(&args.config)?;

    for metadata in alz.metadata()? {
        println!("  library {} ({})", metadata.name(), &metadata.fingerprint()[..12]);
    }

    println!("\nAssets:");
    for kind in AssetKind::ALL {
        println!("  {}s: {}", kind, alz.asset_count(kind)?);
    }

    let archetypes = alz.archetypes()?;
    println!("\nArchetypes ({}): {}", archetypes.len(), archetypes.join(", "));
    let architectures = alz.architectures()?;
    println!(
        "Architectures ({}): {}",
        architectures.len(),
        architectures.join(", ")
    );

    let missing = alz.missing_builtins()?;
    if missing.is_empty() {
        println!("\n✅ All referenced definitions are present");
        return Ok(());
    }

    println!("\nMissing built-ins ({}):", missing.len());
    for request in &missing {
        match &request.version {
            Some(version) => println!("  - {} {} ({})", request.kind, request.name, version),
            None => println!("  - {} {}", request.kind, request.name),
        }
    }

    if args.strict {
        anyhow::bail!("{} referenced built-ins are missing", missing.len());
    }
    Ok(())
}
