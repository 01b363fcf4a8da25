//! # alzlib
//!
//! This library assembles cloud-governance asset libraries into a validated,
//! in-memory model. It is used by the `alzlib` command-line tool but is meant
//! to be embedded in anything that needs to reason about management group
//! hierarchies and the policy and role assets bound to them.
//!
//! ## Quick Example
//!
//! ```
//! use alzlib::filesystem::LibraryFs;
//! use alzlib::{AlzLib, AlzLibOptions};
//!
//! let library = LibraryFs::new("example")
//!     .with_file(
//!         "Deny-IP.alz_policy_definition.json",
//!         r#"{"name": "Deny-IP", "properties": {"version": "1.0.0"}}"#,
//!     )
//!     .with_file(
//!         "root.alz_archetype_definition.json",
//!         r#"{"name": "root", "policy_definitions": ["Deny-IP"]}"#,
//!     )
//!     .with_file(
//!         "example.alz_architecture_definition.json",
//!         r#"{"name": "example", "management_groups": [{"id": "root", "archetypes": ["root"]}]}"#,
//!     );
//!
//! let alz = AlzLib::new(AlzLibOptions::default()).unwrap();
//! alz.init(&[library]).unwrap();
//!
//! let architecture = alz.architecture("example").unwrap();
//! let root = architecture.management_group("root").unwrap();
//! assert!(root.assets().policy_definitions.contains_key("Deny-IP"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Assets (`assets`, `version`, `registry`)**: policy definitions, policy
//!   set definitions, policy assignments and role definitions, stored by name
//!   and, where applicable, by version.
//! - **Archetypes (`archetype`)**: named bundles of asset names, and overrides
//!   that derive new bundles by adding and removing names.
//! - **Architectures (`architecture`)**: trees of management groups, each
//!   carrying its own copy of its archetypes' assets.
//! - **Built-ins (`builtin`)**: assets owned by the directory service,
//!   fetched on demand through a `DirectoryClient`.
//! - **Libraries (`library`, `filesystem`, `processor`)**: where declarations
//!   come from and how they are read.
//!
//! ## Execution Flow
//!
//! [`AlzLib::init`] processes library sources in order: assets are ingested,
//! then default values, then archetypes, override archetypes and
//! architectures are generated. [`AlzLib::missing_builtins`] reports what
//! the loaded assets reference but do not contain, and
//! [`AlzLib::resolve_builtins`] fetches it.

pub mod alzlib;
pub mod archetype;
pub mod architecture;
pub mod assets;
pub mod builtin;
pub mod config;
pub mod defaults;
pub mod error;
pub mod filesystem;
pub mod library;
pub mod metadata;
pub mod processor;
pub mod registry;
pub mod version;

pub use crate::alzlib::AlzLib;
pub use crate::config::AlzLibOptions;
pub use crate::error::{Error, Result};
