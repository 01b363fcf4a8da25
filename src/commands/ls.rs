//! # Ls Command Implementation
//!
//! This module implements the `ls` subcommand, which lists the names of one
//! kind of item after loading every configured library. Names are printed
//! one per line in sorted order, which makes the output easy to pipe.

use anyhow::Result;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use alzlib::assets::AssetKind;
use alzlib::config::CONFIG_FILE_NAME;
use alzlib::AlzLib;

/// What to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ItemKind {
    PolicyDefinitions,
    PolicySetDefinitions,
    PolicyAssignments,
    RoleDefinitions,
    Archetypes,
    Architectures,
    DefaultValues,
}

/// List the names of one kind of item
#[derive(Args, Debug)]
pub struct LsArgs {
    /// The kind of item to list.
    #[arg(value_enum)]
    pub kind: ItemKind,

    /// Path to the workspace configuration file.
    #[arg(short, long, value_name = "FILE", default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Show only the number of items.
    #[arg(long)]
    pub count: bool,
}

/// Execute the `ls` command.
pub fn execute(args: LsArgs) -> Result<()> {
    let alz = super::load(&args.config)?;
    let names = list(&alz, args.kind)?;

    if args.count {
        println!("{}", names.len());
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

fn list(alz: &AlzLib, kind: ItemKind) -> Result<Vec<String>> {
    let names = match kind {
        ItemKind::PolicyDefinitions => alz.asset_names(AssetKind::PolicyDefinition)?,
        ItemKind::PolicySetDefinitions => alz.asset_names(AssetKind::PolicySetDefinition)?,
        ItemKind::PolicyAssignments => alz.asset_names(AssetKind::PolicyAssignment)?,
        ItemKind::RoleDefinitions => alz.asset_names(AssetKind::RoleDefinition)?,
        ItemKind::Archetypes => alz.archetypes()?,
        ItemKind::Architectures => alz.architectures()?,
        ItemKind::DefaultValues => alz.default_values()?,
    };
    Ok(names)
}
