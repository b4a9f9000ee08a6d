//! Process-wide catalog of action types.
//!
//! The registry keeps two indices updated together under one lock: a global
//! `name -> type` index and a `(target system, name) -> type` index. The last
//! registration for a name wins in both.
//!
//! Discovery pulls candidates from a discovery hook (keyed by package name)
//! or from a [`ModuleLoader`], applies the requested target system to
//! candidates that did not declare one, and registers each candidate on its
//! own: a malformed candidate is logged and skipped.

use crate::error::DiscoveryError;
use crate::loader::{CatalogLoader, ModuleLoader, ModuleSource};
use dcc_mcp_core::{ActionInfo, ActionType, Dependencies, RegistrationError};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Discovery hook: returns the action types of a package for an optional
/// target system. The registry registers what the hook returns.
pub type DiscoveryHook = Arc<dyn Fn(&ActionRegistry, Option<&str>) -> Vec<ActionType> + Send + Sync>;

#[derive(Default)]
struct Tables {
    actions: BTreeMap<String, ActionType>,
    by_target: BTreeMap<String, BTreeMap<String, ActionType>>,
}

/// Catalog of registered action types.
pub struct ActionRegistry {
    tables: RwLock<Tables>,
    hooks: RwLock<HashMap<String, DiscoveryHook>>,
    loader: RwLock<Arc<dyn ModuleLoader>>,
}

static GLOBAL_REGISTRY: Mutex<Option<Arc<ActionRegistry>>> = Mutex::new(None);

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.len())
            .field("target_systems", &self.target_systems())
            .finish()
    }
}

impl ActionRegistry {
    /// Create an empty registry using a [`CatalogLoader`].
    pub fn new() -> Self {
        Self::with_loader(Arc::new(CatalogLoader::new()))
    }

    /// Create an empty registry using `loader` for discovery.
    pub fn with_loader(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            hooks: RwLock::new(HashMap::new()),
            loader: RwLock::new(loader),
        }
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> Arc<ActionRegistry> {
        let mut slot = GLOBAL_REGISTRY
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slot.get_or_insert_with(|| {
            debug!("Created process-wide action registry");
            Arc::new(ActionRegistry::new())
        }))
    }

    /// Clear the process-wide registry. With `full_reset` the instance itself
    /// is released and the next [`ActionRegistry::global`] builds a new one.
    pub fn reset_global(full_reset: bool) {
        let mut slot = GLOBAL_REGISTRY
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(registry) = slot.as_ref() {
            registry.reset();
        }
        if full_reset {
            *slot = None;
            debug!("Released process-wide action registry");
        }
    }

    /// Clear every registered type. Discovery hooks and the loader are kept.
    pub fn reset(&self) {
        *self.write_tables() = Tables::default();
        debug!("Cleared action registry");
    }

    pub fn loader(&self) -> Arc<dyn ModuleLoader> {
        Arc::clone(&self.loader.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_loader(&self, loader: Arc<dyn ModuleLoader>) {
        *self.loader.write().unwrap_or_else(PoisonError::into_inner) = loader;
    }

    /// Register an action type.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - the type is now indexed globally and by target system
    /// * `Ok(false)` - the type is abstract or has no execution hook and was
    ///   silently refused
    /// * `Err(RegistrationError)` - the type breaks the naming rules
    pub fn register(&self, action: ActionType) -> Result<bool, RegistrationError> {
        action.check_conformance()?;

        if action.is_abstract() {
            debug!(action = %action.name(), "Skipping abstract action type");
            return Ok(false);
        }
        if !action.has_execute_hook() {
            debug!(
                action = %action.name(),
                "Skipping action type without an execution hook"
            );
            return Ok(false);
        }

        let name = action.name().to_string();
        let target_system = action.target_system().map(str::to_string);
        {
            let mut tables = self.write_tables();
            if let Some(target) = &target_system {
                tables
                    .by_target
                    .entry(target.clone())
                    .or_default()
                    .insert(name.clone(), action.clone());
            }
            tables.actions.insert(name.clone(), action);
        }
        debug!(
            action = %name,
            target_system = target_system.as_deref().unwrap_or("-"),
            "Registered action"
        );
        Ok(true)
    }

    /// Remove a type from both indices. Returns true if it was present.
    pub fn unregister(&self, name: &str, target_system: Option<&str>) -> bool {
        let mut tables = self.write_tables();
        let mut removed = false;
        match target_system {
            Some(target) => {
                if let Some(scoped) = tables.by_target.get_mut(target) {
                    removed = scoped.remove(name).is_some();
                    if scoped.is_empty() {
                        tables.by_target.remove(target);
                    }
                }
                let global_matches = tables
                    .actions
                    .get(name)
                    .is_some_and(|a| a.target_system() == Some(target));
                if global_matches {
                    tables.actions.remove(name);
                }
            }
            None => {
                if let Some(action) = tables.actions.remove(name) {
                    removed = true;
                    if let Some(target) = action.target_system()
                        && let Some(scoped) = tables.by_target.get_mut(target)
                        && scoped.get(name).is_some_and(|a| a.same_type(&action))
                    {
                        scoped.remove(name);
                    }
                }
                tables.by_target.retain(|_, scoped| !scoped.is_empty());
            }
        }
        removed
    }

    /// Look up a type.
    ///
    /// With a target system the lookup is scoped to it and never falls back
    /// to the global index. Without one, the global index is used.
    pub fn get(&self, name: &str, target_system: Option<&str>) -> Option<ActionType> {
        let tables = self.read_tables();
        match target_system {
            Some(target) => tables.by_target.get(target)?.get(name).cloned(),
            None => tables.actions.get(name).cloned(),
        }
    }

    /// Listing records, filtered by target system and tag.
    ///
    /// An unknown target system yields an empty list.
    pub fn list(&self, target_system: Option<&str>, tag: Option<&str>) -> Vec<ActionInfo> {
        self.collect(target_system, |action| {
            tag.is_none_or(|tag| action.descriptor().has_tag(tag))
                .then(|| action.info())
        })
    }

    /// Registered names, filtered by target system.
    pub fn list_names(&self, target_system: Option<&str>) -> Vec<String> {
        self.collect(target_system, |action| Some(action.name().to_string()))
    }

    /// Copy of the scoped index for one target system.
    pub fn types_for(&self, target_system: &str) -> BTreeMap<String, ActionType> {
        self.read_tables()
            .by_target
            .get(target_system)
            .cloned()
            .unwrap_or_default()
    }

    /// Target systems with at least one registered type.
    pub fn target_systems(&self) -> Vec<String> {
        self.read_tables().by_target.keys().cloned().collect()
    }

    /// Number of types in the global index.
    pub fn len(&self) -> usize {
        self.read_tables().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_tables().actions.is_empty()
    }

    /// Route discovery of `package` to `hook` instead of the loader.
    pub fn register_discovery_hook<F>(&self, package: impl Into<String>, hook: F)
    where
        F: Fn(&ActionRegistry, Option<&str>) -> Vec<ActionType> + Send + Sync + 'static,
    {
        let package = package.into();
        debug!(package = %package, "Registered discovery hook");
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(package, Arc::new(hook));
    }

    pub fn clear_discovery_hooks(&self) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Cleared discovery hooks");
    }

    pub fn has_discovery_hook(&self, package: &str) -> bool {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(package)
    }

    /// Discover and register the action types of a package.
    ///
    /// Returns the types that were registered.
    pub fn discover_package(
        &self,
        package: &str,
        target_system: Option<&str>,
        dependencies: &Dependencies,
    ) -> Vec<ActionType> {
        let hook = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(package)
            .cloned();
        if let Some(hook) = hook {
            debug!(package = %package, "Using discovery hook");
            let registered = hook(self, target_system)
                .into_iter()
                .filter_map(|action| self.register_candidate(Ok(action), target_system, None))
                .collect();
            return self.log_discovered(package, registered);
        }
        self.discover(
            &ModuleSource::Package(package.to_string()),
            target_system,
            dependencies,
        )
    }

    /// Discover and register the action types found at `path`.
    ///
    /// Discovered types record `path` as their source.
    pub fn discover_path(
        &self,
        path: &Path,
        target_system: Option<&str>,
        dependencies: &Dependencies,
    ) -> Vec<ActionType> {
        self.discover(
            &ModuleSource::Path(path.to_path_buf()),
            target_system,
            dependencies,
        )
    }

    /// Load `source` through the loader and register its candidates.
    ///
    /// A load failure is logged and yields an empty list.
    pub fn discover(
        &self,
        source: &ModuleSource,
        target_system: Option<&str>,
        dependencies: &Dependencies,
    ) -> Vec<ActionType> {
        let loader = self.loader();
        let module = match loader.load(source, dependencies, target_system) {
            Ok(module) => module,
            Err(e) => {
                warn!(source = %source, error = %e, "Failed to load action module");
                return Vec::new();
            }
        };
        debug!(source = %source, module = %module.name(), "Loaded action module");

        let origin = match source {
            ModuleSource::Path(path) => Some(path.display().to_string()),
            ModuleSource::Package(_) => None,
        };
        let registered = module
            .actions()
            .into_iter()
            .filter_map(|candidate| {
                self.register_candidate(candidate, target_system, origin.as_deref())
            })
            .collect();
        self.log_discovered(&source.to_string(), registered)
    }

    fn register_candidate(
        &self,
        candidate: Result<ActionType, DiscoveryError>,
        target_system: Option<&str>,
        origin: Option<&str>,
    ) -> Option<ActionType> {
        let mut action = match candidate {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "Skipping action candidate");
                return None;
            }
        };
        if let Some(target) = target_system
            && action.target_system().is_none()
        {
            action = action.with_target_system(target);
        }
        if let Some(origin) = origin {
            action = action.with_source(origin);
        }
        match self.register(action.clone()) {
            Ok(true) => Some(action),
            Ok(false) => None,
            Err(e) => {
                let e = DiscoveryError::from(e);
                warn!(
                    action = %action.name(),
                    error = %e,
                    code = e.error_code(),
                    "Skipping non-conforming action candidate"
                );
                None
            }
        }
    }

    fn log_discovered(&self, source: &str, registered: Vec<ActionType>) -> Vec<ActionType> {
        info!(source = %source, count = registered.len(), "Discovered actions");
        registered
    }

    fn collect<T>(
        &self,
        target_system: Option<&str>,
        mut project: impl FnMut(&ActionType) -> Option<T>,
    ) -> Vec<T> {
        let tables = self.read_tables();
        match target_system {
            Some(target) => tables
                .by_target
                .get(target)
                .map(|scoped| scoped.values().filter_map(&mut project).collect())
                .unwrap_or_default(),
            None => tables.actions.values().filter_map(project).collect(),
        }
    }

    fn read_tables(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::loader::{ActionModule, StaticModule};
    use dcc_mcp_core::ActionOutput;
    use rstest::rstest;

    fn action(name: &str, target: Option<&str>) -> ActionType {
        let builder = ActionType::builder(name).execute_fn(|_, _| Ok(ActionOutput::empty()));
        match target {
            Some(target) => builder.target_system(target).build(),
            None => builder.build(),
        }
    }

    #[test]
    fn test_scoped_and_global_lookup() {
        let registry = ActionRegistry::new();
        let maya = action("CreateSphere", Some("maya"));
        let houdini = action("CreateSphere", Some("houdini"));

        assert!(registry.register(maya.clone()).unwrap());
        assert!(registry.register(houdini.clone()).unwrap());

        assert!(registry.get("CreateSphere", Some("maya")).unwrap().same_type(&maya));
        assert!(
            registry
                .get("CreateSphere", Some("houdini"))
                .unwrap()
                .same_type(&houdini)
        );
        // last registration wins globally
        assert!(registry.get("CreateSphere", None).unwrap().same_type(&houdini));
        // scoped lookup never falls back
        assert!(registry.get("CreateSphere", Some("blender")).is_none());
        assert_eq!(registry.target_systems(), vec!["houdini", "maya"]);
    }

    #[rstest]
    #[case::abstract_type(ActionType::builder("Base").abstract_type().execute_fn(|_, _| Ok(ActionOutput::empty())).build())]
    #[case::no_execute_hook(ActionType::builder("Base").target_system("maya").build())]
    fn test_refused_types_never_listed(#[case] refused: ActionType) {
        let registry = ActionRegistry::new();
        assert!(!registry.register(refused).unwrap());
        assert!(registry.get("Base", None).is_none());
        assert!(registry.get("Base", Some("maya")).is_none());
        assert!(registry.list(None, None).is_empty());
        assert!(registry.list(Some("maya"), None).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_non_conforming_type_is_an_error() {
        let registry = ActionRegistry::new();
        let err = registry.register(action("bad name", None)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ACTION_NAME");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_filters() {
        let registry = ActionRegistry::new();
        registry
            .register(
                ActionType::builder("CreateSphere")
                    .target_system("maya")
                    .tag("geometry")
                    .execute_fn(|_, _| Ok(ActionOutput::empty()))
                    .build(),
            )
            .unwrap();
        registry.register(action("SaveScene", Some("maya"))).unwrap();
        registry.register(action("Render", Some("houdini"))).unwrap();

        assert_eq!(registry.list(None, None).len(), 3);
        assert_eq!(registry.list(Some("maya"), None).len(), 2);
        let tagged = registry.list(Some("maya"), Some("geometry"));
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].name, "CreateSphere");
        assert!(registry.list(Some("nuke"), None).is_empty());
        assert_eq!(
            registry.list_names(Some("maya")),
            vec!["CreateSphere", "SaveScene"]
        );
        assert_eq!(registry.types_for("houdini").len(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = ActionRegistry::new();
        registry.register(action("CreateSphere", Some("maya"))).unwrap();
        assert!(registry.unregister("CreateSphere", None));
        assert!(registry.get("CreateSphere", Some("maya")).is_none());
        assert!(registry.target_systems().is_empty());
        assert!(!registry.unregister("CreateSphere", None));
    }

    #[test]
    fn test_discovery_hook_applies_target_default() {
        let registry = ActionRegistry::new();
        registry.register_discovery_hook("maya_tools", |_, _| {
            vec![
                action("CreateSphere", None),
                action("HoudiniOnly", Some("houdini")),
            ]
        });

        let discovered = registry.discover_package("maya_tools", Some("maya"), &Dependencies::new());
        assert_eq!(discovered.len(), 2);
        assert!(registry.get("CreateSphere", Some("maya")).is_some());
        // declared target system is kept
        assert!(registry.get("HoudiniOnly", Some("houdini")).is_some());
        assert!(registry.get("HoudiniOnly", Some("maya")).is_none());

        registry.clear_discovery_hooks();
        assert!(!registry.has_discovery_hook("maya_tools"));
    }

    struct FixedLoader(Arc<StaticModule>);

    impl ModuleLoader for FixedLoader {
        fn load(
            &self,
            source: &ModuleSource,
            _dependencies: &Dependencies,
            _target_system: Option<&str>,
        ) -> Result<Arc<dyn ActionModule>, LoadError> {
            match source {
                ModuleSource::Path(_) => Ok(self.0.clone()),
                ModuleSource::Package(name) => Err(LoadError::PackageNotFound(name.clone())),
            }
        }
    }

    #[test]
    fn test_bad_candidate_does_not_abort_batch() {
        let module = StaticModule::new("mixed")
            .with_action(action("First", None))
            .with_invalid("Broken", "import failed")
            .with_action(action("bad name", None))
            .with_action(ActionType::builder("NoHook").build())
            .with_action(action("Last", None));
        let registry = ActionRegistry::with_loader(Arc::new(FixedLoader(Arc::new(module))));

        let discovered = registry.discover_path(
            Path::new("/tools/maya"),
            Some("maya"),
            &Dependencies::new(),
        );
        let names: Vec<_> = discovered.iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["First", "Last"]);
        assert_eq!(
            registry.get("Last", Some("maya")).unwrap().descriptor().source.as_deref(),
            Some("/tools/maya")
        );
    }

    #[test]
    fn test_load_failure_yields_nothing() {
        let registry = ActionRegistry::with_loader(Arc::new(FixedLoader(Arc::new(
            StaticModule::new("empty"),
        ))));
        assert!(
            registry
                .discover_package("missing", None, &Dependencies::new())
                .is_empty()
        );
    }

    #[test]
    fn test_reset_keeps_hooks() {
        let registry = ActionRegistry::new();
        registry.register(action("CreateSphere", Some("maya"))).unwrap();
        registry.register_discovery_hook("pkg", |_, _| Vec::new());
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.target_systems().is_empty());
        assert!(registry.has_discovery_hook("pkg"));
    }

    #[test]
    fn test_global_reset() {
        let global = ActionRegistry::global();
        global.register(action("GlobalSphere", Some("maya"))).unwrap();
        assert!(ActionRegistry::global().get("GlobalSphere", Some("maya")).is_some());

        ActionRegistry::reset_global(false);
        let kept = ActionRegistry::global();
        assert!(Arc::ptr_eq(&global, &kept));
        assert!(kept.is_empty());

        ActionRegistry::reset_global(true);
        let rebuilt = ActionRegistry::global();
        assert!(!Arc::ptr_eq(&global, &rebuilt));
        assert!(rebuilt.is_empty());
    }
}
