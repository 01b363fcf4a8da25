//! # The Library Orchestrator
//!
//! [`AlzLib`] owns everything loaded from library sources: the asset
//! registry, archetypes, architectures, default values and per-source
//! metadata. It is populated by [`AlzLib::init`] and, optionally, by
//! [`AlzLib::resolve_builtins`].
//!
//! ## Pipeline
//!
//! `init` processes its sources strictly in order. For each source:
//!
//! 1.  **Load and fingerprint**: snapshot the files and hash them. A source
//!     whose fingerprint was already processed is skipped.
//! 2.  **Process**: the [`Processor`] turns the files into declarations.
//! 3.  **Ingest assets** into the registry.
//! 4.  **Ingest default values**.
//! 5.  **Generate archetypes**, then **override archetypes**, then
//!     **architectures**.
//! 6.  **Record metadata**.
//!
//! A failure stops `init` and is returned as [`Error::Library`] naming the
//! source. Whatever the failing source had already changed stays changed;
//! discard the instance to start over.
//!
//! ## Locking
//!
//! Library state and the registry each sit behind their own reader/writer
//! lock. `init` takes both exclusively for its whole run, library state
//! first. Built-in resolution only takes short registry write locks per
//! insert, so lookups stay available while it waits on the directory
//! service.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::info;

use crate::archetype::{generate_archetypes, generate_override_archetypes, Archetype};
use crate::architecture::{generate_architectures, Architecture};
use crate::assets::{AssetKind, PolicyAssignment, PolicyDefinition, PolicySetDefinition, RoleDefinition};
use crate::builtin::{self, BuiltInRequest, BuiltInResolver, Cancellation, DirectoryClient};
use crate::config::AlzLibOptions;
use crate::defaults::{DefaultPolicyAssignmentValue, DefaultValues};
use crate::error::{Error, Result};
use crate::library::LibrarySource;
use crate::metadata::{self, Metadata};
use crate::processor::{LibraryProcessor, Processor};
use crate::registry::{AssetRegistry, AssetStore};

#[derive(Debug, Default)]
struct LibraryState {
    archetypes: BTreeMap<String, Archetype>,
    architectures: BTreeMap<String, Architecture>,
    defaults: DefaultValues,
    metadata: Vec<Metadata>,
}

/// Assets, archetypes and architectures assembled from library sources.
pub struct AlzLib {
    options: AlzLibOptions,
    registry: AssetRegistry,
    state: RwLock<LibraryState>,
    processor: Box<dyn Processor>,
    client: Option<Arc<dyn DirectoryClient>>,
}

impl fmt::Debug for AlzLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlzLib")
            .field("options", &self.options)
            .field("directory_client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

impl AlzLib {
    pub fn new(options: AlzLibOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            registry: AssetRegistry::new(options.allow_overwrite),
            options,
            state: RwLock::new(LibraryState::default()),
            processor: Box::new(LibraryProcessor::new()),
            client: None,
        })
    }

    /// Replace the default [`LibraryProcessor`].
    pub fn with_processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Box::new(processor);
        self
    }

    /// Enable [`resolve_builtins`](Self::resolve_builtins).
    pub fn add_directory_client(&mut self, client: Arc<dyn DirectoryClient>) {
        self.client = Some(client);
    }

    pub fn options(&self) -> &AlzLibOptions {
        &self.options
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Process `libraries` in order.
    pub fn init<L: LibrarySource>(&self, libraries: &[L]) -> Result<()> {
        let mut state = self.write_state()?;
        let mut store = self.registry.write()?;

        for library in libraries {
            let name = library.name();
            self.init_library(&mut state, &mut store, library)
                .map_err(|e| e.in_library(&name))?;
        }
        Ok(())
    }

    fn init_library(
        &self,
        state: &mut LibraryState,
        store: &mut AssetStore,
        library: &impl LibrarySource,
    ) -> Result<()> {
        let fs = library.load()?;
        let fingerprint = metadata::fingerprint(&fs);
        if let Some(seen) = state.metadata.iter().find(|m| m.fingerprint() == fingerprint) {
            info!(
                "Skipping library {}: same content as {}",
                library.name(),
                seen.source()
            );
            return Ok(());
        }

        info!("Processing library {}", library.name());
        let result = self.processor.process(&fs)?;
        let allow_overwrite = self.options.allow_overwrite;

        store.add_policy_definitions(result.policy_definitions, allow_overwrite)?;
        store.add_policy_set_definitions(result.policy_set_definitions, allow_overwrite)?;
        store.add_role_definitions(result.role_definitions, allow_overwrite)?;
        store.add_policy_assignments(result.policy_assignments, allow_overwrite)?;

        for declaration in result.default_values {
            state.defaults.add(declaration, allow_overwrite)?;
        }

        generate_archetypes(store, &mut state.archetypes, result.archetypes, allow_overwrite)?;
        generate_override_archetypes(store, &mut state.archetypes, result.archetype_overrides)?;
        generate_architectures(
            store,
            &state.archetypes,
            &mut state.architectures,
            result.architectures,
            allow_overwrite,
        )?;

        state
            .metadata
            .push(Metadata::new(library.name(), result.metadata, fingerprint));
        info!(
            "Library {} loaded: {} archetypes and {} architectures known",
            library.name(),
            state.archetypes.len(),
            state.architectures.len()
        );
        Ok(())
    }

    /// Fetch `requests` from the directory client into the registry.
    pub fn resolve_builtins(
        &self,
        requests: impl IntoIterator<Item = BuiltInRequest>,
        cancel: &Cancellation,
    ) -> Result<()> {
        let client = self.client.clone().ok_or_else(|| Error::Configuration {
            message: "no directory client configured".to_string(),
        })?;
        BuiltInResolver::new(client, self.options.parallelism)?.resolve(&self.registry, requests, cancel)
    }

    /// Built-ins referenced by loaded assets but missing from the registry.
    pub fn missing_builtins(&self) -> Result<Vec<BuiltInRequest>> {
        let store = self.registry.read()?;
        Ok(builtin::missing_builtins(&store))
    }

    /// Sorted names of every asset of `kind`.
    pub fn asset_names(&self, kind: AssetKind) -> Result<Vec<String>> {
        self.registry.names(kind)
    }

    pub fn asset_count(&self, kind: AssetKind) -> Result<usize> {
        Ok(self.registry.read()?.len(kind))
    }

    pub fn policy_definition(&self, name: &str, version: Option<&str>) -> Result<PolicyDefinition> {
        self.registry.policy_definition(name, version)
    }

    pub fn policy_set_definition(&self, name: &str, version: Option<&str>) -> Result<PolicySetDefinition> {
        self.registry.policy_set_definition(name, version)
    }

    pub fn policy_assignment(&self, name: &str) -> Result<PolicyAssignment> {
        self.registry.policy_assignment(name)
    }

    pub fn role_definition(&self, name: &str) -> Result<RoleDefinition> {
        self.registry.role_definition(name)
    }

    pub fn policy_definition_exists(&self, name: &str, version: Option<&str>) -> bool {
        self.registry.policy_definition_exists(name, version)
    }

    pub fn policy_set_definition_exists(&self, name: &str, version: Option<&str>) -> bool {
        self.registry.policy_set_definition_exists(name, version)
    }

    pub fn policy_assignment_exists(&self, name: &str) -> bool {
        self.registry.policy_assignment_exists(name)
    }

    pub fn role_definition_exists(&self, name: &str) -> bool {
        self.registry.role_definition_exists(name)
    }

    /// Sorted archetype names.
    pub fn archetypes(&self) -> Result<Vec<String>> {
        Ok(self.read_state()?.archetypes.keys().cloned().collect())
    }

    pub fn archetype(&self, name: &str) -> Result<Archetype> {
        self.read_state()?
            .archetypes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("archetype", name, None))
    }

    /// Sorted architecture names.
    pub fn architectures(&self) -> Result<Vec<String>> {
        Ok(self.read_state()?.architectures.keys().cloned().collect())
    }

    pub fn architecture(&self, name: &str) -> Result<Architecture> {
        self.read_state()?
            .architectures
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("architecture", name, None))
    }

    /// Sorted default value names.
    pub fn default_values(&self) -> Result<Vec<String>> {
        Ok(self.read_state()?.defaults.names())
    }

    pub fn default_value(&self, name: &str) -> Result<DefaultPolicyAssignmentValue> {
        self.read_state()?
            .defaults
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("default policy assignment value", name, None))
    }

    /// The default value name that sets `parameter` on `assignment`.
    pub fn default_value_for(&self, assignment: &str, parameter: &str) -> Result<Option<String>> {
        Ok(self
            .read_state()?
            .defaults
            .owner(assignment, parameter)
            .map(str::to_string))
    }

    /// Metadata of every processed source, in processing order.
    pub fn metadata(&self) -> Result<Vec<Metadata>> {
        Ok(self.read_state()?.metadata.clone())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, LibraryState>> {
        self.state
            .read()
            .map_err(|_| Error::lock_poisoned("library state (read)"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, LibraryState>> {
        self.state
            .write()
            .map_err(|_| Error::lock_poisoned("library state (write)"))
    }
}
