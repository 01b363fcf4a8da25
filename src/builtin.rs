//! # Built-In Resolution
//!
//! Archetypes and assignments frequently reference built-in policy
//! definitions and policy set definitions that are owned by the directory
//! service rather than by any library. The [`BuiltInResolver`] closes that
//! gap: given a batch of [`BuiltInRequest`]s it fetches whatever the registry
//! does not hold yet.
//!
//! ## Process
//!
//! 1.  **Deduplication and partitioning**: identical requests collapse, the
//!     rest split into policy definition and policy set definition requests.
//! 2.  **Policy definitions**: resolved in parallel on a rayon pool sized by
//!     the configured parallelism.
//!     - A pinned version pages through every published version. If the
//!       pinned version is not among them the request fails with `NotFound`
//!       and nothing is stored; otherwise every listed version is stored.
//!     - No version fetches the current built-in.
//! 3.  **Policy set definitions**: fetched the same way, then every member
//!     reference of the resolved set is resolved as a policy definition
//!     (pinned by the reference's `definitionVersion` when present). The set
//!     is stored only after all its members are. A member that cannot be
//!     resolved fails the whole set request and leaves the set out of the
//!     registry; cancellation and not-found member errors are reported as is.
//!
//! Requests already satisfied by the registry never reach the directory
//! service. Inserts take the registry's exclusive lock one at a time and are
//! idempotent, so two workers racing on the same name store it once.
//!
//! The first failure cancels outstanding work and is the error reported.
//! Nothing is retried.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPool;
use tokio_util::sync::CancellationToken;

use crate::assets::{AssetKind, PolicyDefinition, PolicyResourceId, PolicySetDefinition, VersionedAsset};
use crate::error::{Error, Result};
use crate::registry::{AssetRegistry, AssetStore};
use crate::version::{parse_version, VersionSpec};

/// Default number of concurrent directory service requests.
pub const DEFAULT_PARALLELISM: usize = 10;

/// A built-in asset that should be present in the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuiltInRequest {
    pub kind: AssetKind,
    pub name: String,
    pub version: Option<String>,
}

impl BuiltInRequest {
    pub fn policy_definition(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            kind: AssetKind::PolicyDefinition,
            name: name.into(),
            version: version.map(str::to_string),
        }
    }

    pub fn policy_set_definition(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            kind: AssetKind::PolicySetDefinition,
            name: name.into(),
            version: version.map(str::to_string),
        }
    }

    /// Build a request from a policy resource id.
    pub fn from_resource_id(resource_id: &str, version: Option<&str>) -> Result<Self> {
        let id = PolicyResourceId::parse(resource_id)?;
        Ok(Self {
            kind: id.kind,
            name: id.name,
            version: version.map(str::to_string),
        })
    }
}

/// One page of a version listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token for the next page, `None` on the last page.
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// The directory service operations the resolver needs.
///
/// Implementations must honour `cancel` and return [`Error::Cancelled`] once
/// it fires. They are never asked to write anything.
pub trait DirectoryClient: Send + Sync {
    /// The current built-in policy definition named `name`.
    fn get_policy_definition(&self, name: &str, cancel: &Cancellation) -> Result<PolicyDefinition>;

    /// One page of every published version of policy definition `name`.
    fn list_policy_definition_versions(
        &self,
        name: &str,
        continuation: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<Page<PolicyDefinition>>;

    /// The current built-in policy set definition named `name`.
    fn get_policy_set_definition(&self, name: &str, cancel: &Cancellation) -> Result<PolicySetDefinition>;

    /// One page of every published version of policy set definition `name`.
    fn list_policy_set_definition_versions(
        &self,
        name: &str,
        continuation: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<Page<PolicySetDefinition>>;
}

/// A cancellation signal with an optional deadline.
///
/// Clones share the same token. A child is cancelled when its parent is and
/// inherits its deadline, but cancelling a child leaves the parent untouched.
#[derive(Debug, Clone)]
pub struct Cancellation {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// The underlying token, for clients that wait on it asynchronously.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` once the signal has fired.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

/// Registry and directory operations for one built-in kind.
trait BuiltIn: VersionedAsset {
    fn fetch_current(client: &dyn DirectoryClient, name: &str, cancel: &Cancellation) -> Result<Self>;

    fn fetch_page(
        client: &dyn DirectoryClient,
        name: &str,
        continuation: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<Page<Self>>;

    fn lookup(store: &AssetStore, name: &str, version: Option<&str>) -> Result<Self>;

    fn store_if_absent(store: &mut AssetStore, item: Self) -> Result<bool>;
}

impl BuiltIn for PolicyDefinition {
    fn fetch_current(client: &dyn DirectoryClient, name: &str, cancel: &Cancellation) -> Result<Self> {
        client.get_policy_definition(name, cancel)
    }

    fn fetch_page(
        client: &dyn DirectoryClient,
        name: &str,
        continuation: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<Page<Self>> {
        client.list_policy_definition_versions(name, continuation, cancel)
    }

    fn lookup(store: &AssetStore, name: &str, version: Option<&str>) -> Result<Self> {
        store.policy_definition(name, version)
    }

    fn store_if_absent(store: &mut AssetStore, item: Self) -> Result<bool> {
        store.add_policy_definition_if_absent(item)
    }
}

impl BuiltIn for PolicySetDefinition {
    fn fetch_current(client: &dyn DirectoryClient, name: &str, cancel: &Cancellation) -> Result<Self> {
        client.get_policy_set_definition(name, cancel)
    }

    fn fetch_page(
        client: &dyn DirectoryClient,
        name: &str,
        continuation: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<Page<Self>> {
        client.list_policy_set_definition_versions(name, continuation, cancel)
    }

    fn lookup(store: &AssetStore, name: &str, version: Option<&str>) -> Result<Self> {
        store.policy_set_definition(name, version)
    }

    fn store_if_absent(store: &mut AssetStore, item: Self) -> Result<bool> {
        store.add_policy_set_definition_if_absent(item)
    }
}

/// Fetches missing built-ins from a [`DirectoryClient`] into a registry.
pub struct BuiltInResolver {
    client: Arc<dyn DirectoryClient>,
    pool: ThreadPool,
}

impl BuiltInResolver {
    pub fn new(client: Arc<dyn DirectoryClient>, parallelism: usize) -> Result<Self> {
        if parallelism == 0 {
            return Err(Error::Configuration {
                message: "parallelism must be at least 1".to_string(),
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|i| format!("alzlib-builtin-{}", i))
            .build()
            .map_err(|e| Error::Configuration {
                message: format!("cannot start resolver worker pool: {}", e),
            })?;
        Ok(Self { client, pool })
    }

    /// Make every request present in `registry`.
    pub fn resolve(
        &self,
        registry: &AssetRegistry,
        requests: impl IntoIterator<Item = BuiltInRequest>,
        cancel: &Cancellation,
    ) -> Result<()> {
        let requests: BTreeSet<BuiltInRequest> = requests.into_iter().collect();
        let (definitions, sets): (Vec<_>, Vec<_>) = requests
            .into_iter()
            .partition(|r| r.kind == AssetKind::PolicyDefinition);

        if let Some(bad) = sets
            .iter()
            .find(|r| r.kind != AssetKind::PolicySetDefinition)
        {
            return Err(Error::Validation {
                message: format!("{} `{}` cannot be fetched as a built-in", bad.kind, bad.name),
            });
        }

        info!(
            "Resolving {} policy definition and {} policy set definition built-ins",
            definitions.len(),
            sets.len()
        );

        self.run(&definitions, cancel, |request, token| {
            self.ensure::<PolicyDefinition>(registry, &request.name, request.version.as_deref(), token)
                .map(|_| ())
        })?;
        self.run(&sets, cancel, |request, token| {
            self.ensure_set(registry, request, token)
        })
    }

    /// Run `task` for every request on the worker pool, stopping early after
    /// the first failure.
    fn run<F>(&self, requests: &[BuiltInRequest], cancel: &Cancellation, task: F) -> Result<()>
    where
        F: Fn(&BuiltInRequest, &Cancellation) -> Result<()> + Sync,
    {
        if requests.is_empty() {
            return Ok(());
        }

        let abort = cancel.child();
        let errors: Mutex<Vec<Error>> = Mutex::new(Vec::new());

        self.pool.install(|| {
            requests.par_iter().for_each(|request| {
                if abort.is_cancelled() && !cancel.is_cancelled() {
                    // a sibling already failed
                    return;
                }
                if let Err(e) = task(request, &abort) {
                    if let Ok(mut collected) = errors.lock() {
                        collected.push(e);
                    }
                    abort.cancel();
                }
            });
        });

        let collected = errors
            .into_inner()
            .map_err(|_| Error::lock_poisoned("built-in resolver errors"))?;
        match collected.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }

    /// Resolve every member of a set definition, then store the set.
    ///
    /// The set only reaches the registry once all its members are present.
    fn ensure_set(
        &self,
        registry: &AssetRegistry,
        request: &BuiltInRequest,
        cancel: &Cancellation,
    ) -> Result<()> {
        let name = request.name.as_str();
        let version = request.version.as_deref();

        if let Some(present) = self.present::<PolicySetDefinition>(registry, name, version)? {
            return self.ensure_members(registry, &present, cancel);
        }

        let fetched = self.fetch::<PolicySetDefinition>(name, version, cancel)?;
        let mut staged = AssetStore::new();
        for item in &fetched {
            staged.add_policy_set_definition_if_absent(item.clone())?;
        }
        let set = staged.policy_set_definition(name, version)?;
        self.ensure_members(registry, &set, cancel)?;

        self.store(registry, name, version, fetched).map(|_| ())
    }

    fn ensure_members(
        &self,
        registry: &AssetRegistry,
        set: &PolicySetDefinition,
        cancel: &Cancellation,
    ) -> Result<()> {
        for member in &set.properties.policy_definitions {
            let id = PolicyResourceId::parse(&member.policy_definition_id)?;
            if id.kind != AssetKind::PolicyDefinition {
                return Err(Error::Validation {
                    message: format!(
                        "policy set definition `{}` references `{}`, which is not a policy definition",
                        set.name, member.policy_definition_id
                    ),
                });
            }
            self.ensure::<PolicyDefinition>(
                registry,
                &id.name,
                member.definition_version.as_deref(),
                cancel,
            )
            .map_err(|e| match e {
                Error::Cancelled { .. } | Error::NotFound { .. } | Error::VersionNotFound { .. } => e,
                other => Error::External {
                    operation: format!("resolving members of policy set definition `{}`", set.name),
                    message: other.to_string(),
                },
            })?;
        }
        Ok(())
    }

    /// Make `name` at `version` present and return the resolved copy.
    fn ensure<T: BuiltIn>(
        &self,
        registry: &AssetRegistry,
        name: &str,
        version: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<T> {
        if let Some(present) = self.present::<T>(registry, name, version)? {
            return Ok(present);
        }
        let fetched = self.fetch::<T>(name, version, cancel)?;
        self.store(registry, name, version, fetched)
    }

    fn present<T: BuiltIn>(
        &self,
        registry: &AssetRegistry,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<T>> {
        let store = registry.read()?;
        let found = T::lookup(&store, name, version).ok();
        if found.is_some() {
            debug!("{} `{}` already present, skipping fetch", T::KIND, name);
        }
        Ok(found)
    }

    /// Fetch `name` from the directory service without storing it.
    fn fetch<T: BuiltIn>(&self, name: &str, version: Option<&str>, cancel: &Cancellation) -> Result<Vec<T>> {
        let operation = format!("fetching {} `{}`", T::KIND, name);
        cancel.check(&operation)?;

        let fetched = match version {
            None => vec![T::fetch_current(self.client.as_ref(), name, cancel)?],
            Some(raw) => self.fetch_all_versions::<T>(name, raw, cancel)?,
        };
        for item in &fetched {
            if item.name() != name {
                return Err(Error::External {
                    operation,
                    message: format!("directory service returned `{}`", item.name()),
                });
            }
        }
        Ok(fetched)
    }

    fn store<T: BuiltIn>(
        &self,
        registry: &AssetRegistry,
        name: &str,
        version: Option<&str>,
        fetched: Vec<T>,
    ) -> Result<T> {
        let mut store = registry.write()?;
        let mut stored = 0;
        for item in fetched {
            if T::store_if_absent(&mut store, item)? {
                stored += 1;
            }
        }
        debug!("Stored {} new version(s) of {} `{}`", stored, T::KIND, name);
        T::lookup(&store, name, version)
    }

    /// Page through every published version, failing when none matches the
    /// requested specifier.
    fn fetch_all_versions<T: BuiltIn>(
        &self,
        name: &str,
        requested: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<T>> {
        let spec = VersionSpec::parse(requested)?;
        let mut items = Vec::new();
        let mut continuation: Option<String> = None;
        let mut seen_tokens = BTreeSet::new();

        loop {
            cancel.check(&format!("listing versions of {} `{}`", T::KIND, name))?;
            let page = T::fetch_page(self.client.as_ref(), name, continuation.as_deref(), cancel)?;
            items.extend(page.items);
            match page.next {
                Some(next) if seen_tokens.insert(next.clone()) => continuation = Some(next),
                Some(next) => {
                    warn!(
                        "Directory service repeated continuation token `{}` for {} `{}`",
                        next,
                        T::KIND,
                        name
                    );
                    break;
                }
                None => break,
            }
        }

        let published = items.iter().any(|item| {
            item.version()
                .and_then(|v| parse_version(v).ok())
                .is_some_and(|v| spec.matches(&v))
        });
        if !published {
            return Err(Error::not_found(T::KIND, name, Some(requested)));
        }
        Ok(items)
    }
}

/// Built-ins referenced by the registry's assignments and set definitions
/// that the registry does not hold.
pub fn missing_builtins(store: &AssetStore) -> Vec<BuiltInRequest> {
    let mut missing = BTreeSet::new();

    for assignment in store.policy_assignments_iter() {
        let properties = &assignment.properties;
        let Ok(id) = PolicyResourceId::parse(&properties.policy_definition_id) else {
            warn!(
                "Policy assignment `{}` has unrecognised policy definition id `{}`",
                assignment.name, properties.policy_definition_id
            );
            continue;
        };
        let version = properties.definition_version.as_deref();
        let present = match id.kind {
            AssetKind::PolicySetDefinition => store.policy_set_definition_exists(&id.name, version),
            _ => store.policy_definition_exists(&id.name, version),
        };
        if id.built_in && !present {
            missing.insert(BuiltInRequest {
                kind: id.kind,
                name: id.name,
                version: version.map(str::to_string),
            });
        }
    }

    for set in store.policy_set_definitions_iter() {
        for member in &set.properties.policy_definitions {
            let Ok(id) = PolicyResourceId::parse(&member.policy_definition_id) else {
                continue;
            };
            let version = member.definition_version.as_deref();
            if id.built_in && !store.policy_definition_exists(&id.name, version) {
                missing.insert(BuiltInRequest::policy_definition(id.name, version));
            }
        }
    }

    missing.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    const BUILTIN: &str = "/providers/Microsoft.Authorization/policyDefinitions/";

    /// Mock directory client serving published versions one per page.
    #[derive(Default)]
    struct MockDirectoryClient {
        definitions: HashMap<String, Vec<PolicyDefinition>>,
        sets: HashMap<String, Vec<PolicySetDefinition>>,
        calls: Mutex<Vec<String>>,
        failing: Vec<String>,
        cancel_after: Option<String>,
        delay: Option<Duration>,
    }

    impl MockDirectoryClient {
        fn with_definition(mut self, name: &str, versions: &[&str]) -> Self {
            self.definitions.insert(
                name.to_string(),
                versions
                    .iter()
                    .map(|v| PolicyDefinition::new(name).with_version(*v))
                    .collect(),
            );
            self
        }

        fn with_set(mut self, set: PolicySetDefinition) -> Self {
            self.sets.entry(set.name.clone()).or_default().push(set);
            self
        }

        fn failing(mut self, name: &str) -> Self {
            self.failing.push(name.to_string());
            self
        }

        /// Cancel the caller's token once `name` has been served.
        fn cancelling_after(mut self, name: &str) -> Self {
            self.cancel_after = Some(name.to_string());
            self
        }

        fn record(&self, call: String, name: &str, cancel: &Cancellation) -> Result<()> {
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            cancel.check(&call)?;
            self.calls.lock().unwrap().push(call.clone());
            if self.cancel_after.as_deref() == Some(name) {
                cancel.cancel();
            }
            if self.failing.iter().any(|f| f == name) {
                return Err(Error::External {
                    operation: call,
                    message: "service unavailable".to_string(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn page<T: VersionedAsset>(
            all: Option<&Vec<T>>,
            name: &str,
            continuation: Option<&str>,
        ) -> Result<Page<T>> {
            let all = all.ok_or_else(|| Error::not_found(T::KIND, name, None))?;
            let index: usize = continuation.map(|c| c.parse().unwrap()).unwrap_or(0);
            let next = (index + 1 < all.len()).then(|| (index + 1).to_string());
            Ok(Page {
                items: all.get(index).cloned().into_iter().collect(),
                next,
            })
        }

        fn current<T: VersionedAsset>(all: Option<&Vec<T>>, name: &str) -> Result<T> {
            all.and_then(|versions| {
                versions
                    .iter()
                    .max_by_key(|d| d.version().and_then(|v| parse_version(v).ok()))
                    .cloned()
            })
            .ok_or_else(|| Error::not_found(T::KIND, name, None))
        }
    }

    impl DirectoryClient for MockDirectoryClient {
        fn get_policy_definition(&self, name: &str, cancel: &Cancellation) -> Result<PolicyDefinition> {
            self.record(format!("get-definition {}", name), name, cancel)?;
            Self::current(self.definitions.get(name), name)
        }

        fn list_policy_definition_versions(
            &self,
            name: &str,
            continuation: Option<&str>,
            cancel: &Cancellation,
        ) -> Result<Page<PolicyDefinition>> {
            self.record(format!("list-definition {}", name), name, cancel)?;
            Self::page(self.definitions.get(name), name, continuation)
        }

        fn get_policy_set_definition(&self, name: &str, cancel: &Cancellation) -> Result<PolicySetDefinition> {
            self.record(format!("get-set {}", name), name, cancel)?;
            Self::current(self.sets.get(name), name)
        }

        fn list_policy_set_definition_versions(
            &self,
            name: &str,
            continuation: Option<&str>,
            cancel: &Cancellation,
        ) -> Result<Page<PolicySetDefinition>> {
            self.record(format!("list-set {}", name), name, cancel)?;
            Self::page(self.sets.get(name), name, continuation)
        }
    }

    fn resolver(client: &Arc<MockDirectoryClient>) -> BuiltInResolver {
        BuiltInResolver::new(client.clone(), 4).unwrap()
    }

    #[test]
    fn test_zero_parallelism_is_configuration_error() {
        let client = Arc::new(MockDirectoryClient::default());
        let result = BuiltInResolver::new(client, 0);
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_latest_definition_is_fetched_and_stored() {
        let client = Arc::new(MockDirectoryClient::default().with_definition("audit-vm", &["1.0.0", "2.0.0"]));
        let registry = AssetRegistry::new(false);

        resolver(&client)
            .resolve(
                &registry,
                [BuiltInRequest::policy_definition("audit-vm", None)],
                &Cancellation::new(),
            )
            .unwrap();

        assert_eq!(client.calls(), vec!["get-definition audit-vm"]);
        assert_eq!(
            registry.policy_definition_versions("audit-vm").unwrap(),
            vec![Some("2.0.0".to_string())]
        );
    }

    #[test]
    fn test_pinned_version_pages_through_all_versions() {
        let client = Arc::new(
            MockDirectoryClient::default().with_definition("audit-vm", &["1.0.0", "1.1.0", "2.0.0"]),
        );
        let registry = AssetRegistry::new(false);

        resolver(&client)
            .resolve(
                &registry,
                [BuiltInRequest::policy_definition("audit-vm", Some("1.1.0"))],
                &Cancellation::new(),
            )
            .unwrap();

        assert_eq!(client.calls().len(), 3);
        assert_eq!(registry.policy_definition_versions("audit-vm").unwrap().len(), 3);
        assert!(registry.policy_definition_exists("audit-vm", Some("1.1.0")));
    }

    #[test]
    fn test_unpublished_pinned_version_is_not_found_and_stores_nothing() {
        let client = Arc::new(MockDirectoryClient::default().with_definition("audit-vm", &["1.0.0"]));
        let registry = AssetRegistry::new(false);

        let result = resolver(&client).resolve(
            &registry,
            [BuiltInRequest::policy_definition("audit-vm", Some("3.0.0"))],
            &Cancellation::new(),
        );

        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert!(!registry.policy_definition_exists("audit-vm", None));
    }

    #[test]
    fn test_present_definition_skips_directory_service() {
        let client = Arc::new(MockDirectoryClient::default().with_definition("audit-vm", &["1.0.0"]));
        let registry = AssetRegistry::new(false);
        registry
            .add_policy_definitions([PolicyDefinition::new("audit-vm").with_version("1.0.0")])
            .unwrap();

        resolver(&client)
            .resolve(
                &registry,
                [
                    BuiltInRequest::policy_definition("audit-vm", None),
                    BuiltInRequest::policy_definition("audit-vm", Some("1.*.*")),
                ],
                &Cancellation::new(),
            )
            .unwrap();

        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_set_definition_resolves_members_transitively() {
        let set = PolicySetDefinition::new("enforce-tls")
            .with_member(format!("{}tls-app", BUILTIN), Some("1.*.*"))
            .with_member(format!("{}tls-sql", BUILTIN), None);
        let client = Arc::new(
            MockDirectoryClient::default()
                .with_definition("tls-app", &["1.0.0", "1.2.0", "2.0.0"])
                .with_definition("tls-sql", &["1.0.0"])
                .with_set(set),
        );
        let registry = AssetRegistry::new(false);

        resolver(&client)
            .resolve(
                &registry,
                [BuiltInRequest::policy_set_definition("enforce-tls", None)],
                &Cancellation::new(),
            )
            .unwrap();

        assert!(registry.policy_set_definition_exists("enforce-tls", None));
        assert!(registry.policy_definition_exists("tls-app", Some("1.2.0")));
        assert!(registry.policy_definition_exists("tls-sql", None));
    }

    #[test]
    fn test_set_definition_fails_when_member_cannot_be_resolved() {
        let set = PolicySetDefinition::new("enforce-tls").with_member(format!("{}tls-app", BUILTIN), None);
        let client = Arc::new(MockDirectoryClient::default().with_set(set).failing("tls-app"));
        let registry = AssetRegistry::new(false);

        let result = resolver(&client).resolve(
            &registry,
            [BuiltInRequest::policy_set_definition("enforce-tls", None)],
            &Cancellation::new(),
        );

        let error = result.unwrap_err();
        assert!(matches!(error, Error::External { .. }));
        assert!(error.to_string().contains("enforce-tls"));
        assert!(!registry.policy_set_definition_exists("enforce-tls", None));
    }

    #[test]
    fn test_set_with_unpublished_member_version_is_not_stored() {
        let set = PolicySetDefinition::new("enforce-tls").with_member(format!("{}tls-app", BUILTIN), Some("9.*.*"));
        let client = Arc::new(
            MockDirectoryClient::default()
                .with_definition("tls-app", &["1.0.0"])
                .with_set(set),
        );
        let registry = AssetRegistry::new(false);

        let result = resolver(&client).resolve(
            &registry,
            [BuiltInRequest::policy_set_definition("enforce-tls", None)],
            &Cancellation::new(),
        );

        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert!(!registry.policy_set_definition_exists("enforce-tls", None));
        assert!(!registry.policy_definition_exists("tls-app", None));
    }

    #[test]
    fn test_cancellation_while_resolving_members_is_reported() {
        let set = PolicySetDefinition::new("enforce-tls").with_member(format!("{}tls-app", BUILTIN), None);
        let client = Arc::new(
            MockDirectoryClient::default()
                .with_definition("tls-app", &["1.0.0"])
                .with_set(set)
                .cancelling_after("enforce-tls"),
        );
        let registry = AssetRegistry::new(false);

        let result = resolver(&client).resolve(
            &registry,
            [BuiltInRequest::policy_set_definition("enforce-tls", None)],
            &Cancellation::new(),
        );

        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(client.calls(), vec!["get-set enforce-tls"]);
        assert!(!registry.policy_set_definition_exists("enforce-tls", None));
    }

    #[test]
    fn test_set_member_already_local_is_not_fetched() {
        let set = PolicySetDefinition::new("enforce-tls").with_member(format!("{}tls-app", BUILTIN), None);
        let client = Arc::new(MockDirectoryClient::default().with_set(set));
        let registry = AssetRegistry::new(false);
        registry
            .add_policy_definitions([PolicyDefinition::new("tls-app")])
            .unwrap();

        resolver(&client)
            .resolve(
                &registry,
                [BuiltInRequest::policy_set_definition("enforce-tls", None)],
                &Cancellation::new(),
            )
            .unwrap();

        assert_eq!(client.calls(), vec!["get-set enforce-tls"]);
    }

    #[test]
    fn test_duplicate_requests_store_one_entry() {
        let client = Arc::new(MockDirectoryClient::default().with_definition("audit-vm", &["1.0.0"]));
        let registry = AssetRegistry::new(false);
        let requests = vec![BuiltInRequest::policy_definition("audit-vm", None); 16];

        resolver(&client)
            .resolve(&registry, requests, &Cancellation::new())
            .unwrap();

        assert_eq!(registry.policy_definition_versions("audit-vm").unwrap().len(), 1);
    }

    #[test]
    fn test_overlapping_concurrent_requests_are_idempotent() {
        let mut client = MockDirectoryClient::default().with_definition("audit-vm", &["1.0.0", "2.0.0"]);
        client.delay = Some(Duration::from_millis(20));
        let client = Arc::new(client);
        let registry = AssetRegistry::new(false);

        resolver(&client)
            .resolve(
                &registry,
                [
                    BuiltInRequest::policy_definition("audit-vm", None),
                    BuiltInRequest::policy_definition("audit-vm", Some("2.0.0")),
                    BuiltInRequest::policy_definition("audit-vm", Some("2.*.*")),
                ],
                &Cancellation::new(),
            )
            .unwrap();

        assert_eq!(
            registry.policy_definition_versions("audit-vm").unwrap(),
            vec![Some("1.0.0".to_string()), Some("2.0.0".to_string())]
        );
    }

    #[test]
    fn test_cancelled_token_stops_before_any_call() {
        let client = Arc::new(MockDirectoryClient::default().with_definition("audit-vm", &["1.0.0"]));
        let registry = AssetRegistry::new(false);
        let cancel = Cancellation::new();
        cancel.cancel();

        let result = resolver(&client).resolve(
            &registry,
            [BuiltInRequest::policy_definition("audit-vm", None)],
            &cancel,
        );

        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let token = Cancellation::with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
        assert!(token.child().is_cancelled());

        let parent = Cancellation::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_parent_cancellation_reaches_children_and_clones() {
        let parent = Cancellation::with_timeout(Duration::from_secs(3600));
        let child = parent.child();
        let clone = child.clone();
        assert_eq!(child.deadline(), parent.deadline());
        assert!(!clone.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(clone.token().is_cancelled());
        assert!(matches!(clone.check("listing"), Err(Error::Cancelled { .. })));
    }

    #[test]
    fn test_first_failure_is_reported() {
        let client = Arc::new(
            MockDirectoryClient::default()
                .with_definition("ok", &["1.0.0"])
                .failing("broken"),
        );
        let registry = AssetRegistry::new(false);

        let result = resolver(&client).resolve(
            &registry,
            [
                BuiltInRequest::policy_definition("broken", None),
                BuiltInRequest::policy_definition("ok", None),
            ],
            &Cancellation::new(),
        );

        let error = result.unwrap_err();
        assert!(matches!(error, Error::External { .. }));
        assert!(error.to_string().contains("broken"));
    }

    #[test]
    fn test_unversioned_kind_request_is_rejected() {
        let client = Arc::new(MockDirectoryClient::default());
        let registry = AssetRegistry::new(false);
        let request = BuiltInRequest {
            kind: AssetKind::RoleDefinition,
            name: "Owner".to_string(),
            version: None,
        };

        let result = resolver(&client).resolve(&registry, [request], &Cancellation::new());
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_missing_builtins_lists_unresolved_references() {
        let registry = AssetRegistry::new(false);
        registry
            .add_policy_assignments([
                crate::assets::PolicyAssignment::new("Audit-VM", format!("{}audit-vm", BUILTIN)),
                crate::assets::PolicyAssignment::new(
                    "Deny-IP",
                    "/providers/Microsoft.Management/managementGroups/alz/providers/Microsoft.Authorization/policyDefinitions/Deny-IP",
                ),
            ])
            .unwrap();
        registry
            .add_policy_set_definitions([
                PolicySetDefinition::new("local-set").with_member(format!("{}tls-app", BUILTIN), Some("1.*.*"))
            ])
            .unwrap();

        let missing = missing_builtins(&registry.read().unwrap());
        assert_eq!(
            missing,
            vec![
                BuiltInRequest::policy_definition("audit-vm", None),
                BuiltInRequest::policy_definition("tls-app", Some("1.*.*")),
            ]
        );
    }
}
