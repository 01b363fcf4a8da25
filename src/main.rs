//! # alzlib CLI
//!
//! This is the binary entry point for the `alzlib` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Setting up logging.
//! - Executing the selected command and reporting its errors.
//!
//! The core logic lives in the `alzlib` library crate; the binary only loads
//! a workspace configuration and prints what the library built.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
