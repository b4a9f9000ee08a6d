//! Module loading seam used by discovery.
//!
//! A module is anything that can hand the registry a list of action types.
//! Modules are produced by a [`ModuleLoader`] from a [`ModuleSource`], and
//! receive their injected [`Dependencies`] and the requested target system
//! at load time through their entry point, never by mutation after the fact.
//!
//! [`CatalogLoader`] is the bundled loader:
//!
//! - packages are entry-point functions registered by name;
//! - paths point at JSON manifests (a file, or a directory of `*.json`
//!   files) whose entries refer to handlers registered by id.
//!
//! A manifest looks like:
//!
//! ```json
//! {
//!   "name": "maya_geometry",
//!   "actions": [
//!     { "handler": "create_sphere", "name": "CreateSphere", "target_system": "maya",
//!       "description": "Create a polygon sphere", "tags": ["geometry"] }
//!   ]
//! }
//! ```

use crate::error::{DiscoveryError, LoadError};
use dcc_mcp_core::{ActionType, Dependencies};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Where a module comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleSource {
    Path(PathBuf),
    Package(String),
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Path(path) => write!(f, "{}", path.display()),
            ModuleSource::Package(name) => f.write_str(name),
        }
    }
}

/// A loaded unit exposing action types.
pub trait ActionModule: Send + Sync {
    fn name(&self) -> &str;

    /// Candidates exposed by this module. A malformed candidate is an `Err`
    /// and does not prevent the others from being registered.
    fn actions(&self) -> Vec<Result<ActionType, DiscoveryError>>;
}

/// Produces initialized modules from a source.
pub trait ModuleLoader: Send + Sync {
    fn load(
        &self,
        source: &ModuleSource,
        dependencies: &Dependencies,
        target_system: Option<&str>,
    ) -> Result<Arc<dyn ActionModule>, LoadError>;
}

/// A module whose candidates are known up front.
#[derive(Debug, Default)]
pub struct StaticModule {
    name: String,
    candidates: Vec<Candidate>,
}

#[derive(Debug)]
enum Candidate {
    Valid(ActionType),
    Invalid { name: String, reason: String },
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidates: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ActionType) -> Self {
        self.candidates.push(Candidate::Valid(action));
        self
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = ActionType>) -> Self {
        self.candidates
            .extend(actions.into_iter().map(Candidate::Valid));
        self
    }

    /// Add a candidate that fails discovery with `reason`.
    pub fn with_invalid(mut self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.candidates.push(Candidate::Invalid {
            name: name.into(),
            reason: reason.into(),
        });
        self
    }
}

impl ActionModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Vec<Result<ActionType, DiscoveryError>> {
        self.candidates
            .iter()
            .map(|candidate| match candidate {
                Candidate::Valid(action) => Ok(action.clone()),
                Candidate::Invalid { name, reason } => Err(DiscoveryError::InvalidCandidate {
                    name: name.clone(),
                    reason: reason.clone(),
                }),
            })
            .collect()
    }
}

/// Entry point of a package: builds the package's action types from the
/// injected dependencies and the requested target system.
pub type PackageEntryPoint =
    Arc<dyn Fn(&Dependencies, Option<&str>) -> Vec<ActionType> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    actions: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    handler: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    target_system: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

/// Module built from one or more manifest files.
struct ManifestModule {
    name: String,
    candidates: Vec<ManifestCandidate>,
}

enum ManifestCandidate {
    Resolved(ActionType),
    UnknownHandler { action: String, handler: String },
    /// A manifest in a scanned directory that could not be read or parsed.
    Unloadable(LoadError),
}

impl ActionModule for ManifestModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Vec<Result<ActionType, DiscoveryError>> {
        self.candidates
            .iter()
            .map(|candidate| match candidate {
                ManifestCandidate::Resolved(action) => Ok(action.clone()),
                ManifestCandidate::UnknownHandler { action, handler } => {
                    Err(DiscoveryError::UnknownHandler {
                        action: action.clone(),
                        handler: handler.clone(),
                    })
                }
                ManifestCandidate::Unloadable(err) => Err(DiscoveryError::Load(err.clone())),
            })
            .collect()
    }
}

/// Loader backed by in-process catalogs of package entry points and
/// manifest handlers.
#[derive(Default)]
pub struct CatalogLoader {
    packages: RwLock<HashMap<String, PackageEntryPoint>>,
    handlers: RwLock<HashMap<String, ActionType>>,
}

impl CatalogLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package entry point.
    pub fn register_package<F>(&self, name: impl Into<String>, entry_point: F)
    where
        F: Fn(&Dependencies, Option<&str>) -> Vec<ActionType> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(package = %name, "Registered package entry point");
        self.packages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(entry_point));
    }

    /// Register a handler that manifests can refer to by `id`.
    pub fn register_handler(&self, id: impl Into<String>, action: ActionType) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), action);
    }

    pub fn packages(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .packages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn load_package(
        &self,
        name: &str,
        dependencies: &Dependencies,
        target_system: Option<&str>,
    ) -> Result<Arc<dyn ActionModule>, LoadError> {
        let entry_point = self
            .packages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::PackageNotFound(name.to_string()))?;
        let actions = entry_point(dependencies, target_system);
        Ok(Arc::new(StaticModule::new(name).with_actions(actions)))
    }

    /// A single file that fails to load fails the module. Inside a
    /// directory, each broken manifest becomes a failed candidate and its
    /// siblings still load.
    fn load_path(&self, path: &Path) -> Result<Arc<dyn ActionModule>, LoadError> {
        if !path.exists() {
            return Err(LoadError::PathNotFound(path.to_path_buf()));
        }

        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut candidates = Vec::new();
        let mut module_name = None;
        if path.is_dir() {
            for file in manifest_files(path)? {
                match read_manifest(&file) {
                    Ok(manifest) => {
                        module_name = module_name.or(manifest.name);
                        candidates.extend(
                            manifest
                                .actions
                                .into_iter()
                                .map(|entry| resolve_entry(&handlers, entry)),
                        );
                    }
                    Err(e) => candidates.push(ManifestCandidate::Unloadable(e)),
                }
            }
        } else {
            let manifest = read_manifest(path)?;
            module_name = manifest.name;
            candidates.extend(
                manifest
                    .actions
                    .into_iter()
                    .map(|entry| resolve_entry(&handlers, entry)),
            );
        }

        Ok(Arc::new(ManifestModule {
            name: module_name.unwrap_or_else(|| path.display().to_string()),
            candidates,
        }))
    }
}

impl fmt::Debug for CatalogLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogLoader")
            .field("packages", &self.packages())
            .finish()
    }
}

impl ModuleLoader for CatalogLoader {
    fn load(
        &self,
        source: &ModuleSource,
        dependencies: &Dependencies,
        target_system: Option<&str>,
    ) -> Result<Arc<dyn ActionModule>, LoadError> {
        match source {
            ModuleSource::Package(name) => self.load_package(name, dependencies, target_system),
            ModuleSource::Path(path) => self.load_path(path),
        }
    }
}

/// `*.json` files directly inside `dir`, sorted by name.
fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source: Arc::new(source),
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_manifest(file: &Path) -> Result<Manifest, LoadError> {
    let text = std::fs::read_to_string(file).map_err(|source| LoadError::Io {
        path: file.to_path_buf(),
        source: Arc::new(source),
    })?;
    serde_json::from_str(&text).map_err(|source| LoadError::InvalidManifest {
        path: file.to_path_buf(),
        source: Arc::new(source),
    })
}

fn resolve_entry(handlers: &HashMap<String, ActionType>, entry: ManifestEntry) -> ManifestCandidate {
    let Some(base) = handlers.get(&entry.handler) else {
        return ManifestCandidate::UnknownHandler {
            action: entry.name.unwrap_or_else(|| entry.handler.clone()),
            handler: entry.handler,
        };
    };
    ManifestCandidate::Resolved(base.derive_with(|descriptor| {
        if let Some(name) = entry.name {
            descriptor.name = name;
        }
        if entry.target_system.is_some() {
            descriptor.target_system = entry.target_system;
        }
        if let Some(description) = entry.description {
            descriptor.description = description;
        }
        if let Some(category) = entry.category {
            descriptor.category = category;
        }
        descriptor.tags.extend(entry.tags);
        if let Some(version) = entry.version {
            descriptor.version = version;
        }
        if entry.author.is_some() {
            descriptor.author = entry.author;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcc_mcp_core::ActionOutput;
    use std::io::Write;

    fn handler(name: &str) -> ActionType {
        ActionType::builder(name)
            .execute_fn(|_, _| Ok(ActionOutput::empty()))
            .build()
    }

    #[test]
    fn test_package_entry_point_receives_dependencies() {
        let loader = CatalogLoader::new();
        loader.register_package("maya_tools", |deps, target| {
            let prefix = deps.get::<String>("prefix").map(|p| p.to_string());
            assert_eq!(target, Some("maya"));
            vec![handler(&format!("{}Sphere", prefix.unwrap_or_default()))]
        });

        let deps = Dependencies::new().with("prefix", "Create".to_string());
        let module = loader
            .load(&ModuleSource::Package("maya_tools".into()), &deps, Some("maya"))
            .unwrap();
        let actions = module.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].as_ref().unwrap().name(), "CreateSphere");
    }

    #[test]
    fn test_unknown_package() {
        let err = CatalogLoader::new()
            .load(
                &ModuleSource::Package("missing".into()),
                &Dependencies::new(),
                None,
            )
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "PACKAGE_NOT_FOUND");
    }

    #[test]
    fn test_manifest_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("geometry.json")).unwrap();
        write!(
            file,
            r#"{{"name": "geometry", "actions": [
                {{"handler": "sphere", "name": "CreateSphere", "target_system": "maya", "tags": ["geometry"]}},
                {{"handler": "missing", "name": "Broken"}}
            ]}}"#
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = CatalogLoader::new();
        loader.register_handler("sphere", handler("sphere"));
        let module = loader
            .load(
                &ModuleSource::Path(dir.path().to_path_buf()),
                &Dependencies::new(),
                None,
            )
            .unwrap();

        assert_eq!(module.name(), "geometry");
        let actions = module.actions();
        assert_eq!(actions.len(), 2);
        let sphere = actions[0].as_ref().unwrap();
        assert_eq!(sphere.name(), "CreateSphere");
        assert_eq!(sphere.target_system(), Some("maya"));
        assert!(sphere.descriptor().has_tag("geometry"));
        assert_eq!(
            actions[1].as_ref().unwrap_err().error_code(),
            "UNKNOWN_HANDLER"
        );
    }

    #[test]
    fn test_invalid_manifest_and_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let loader = CatalogLoader::new();
        let deps = Dependencies::new();
        let err = loader
            .load(&ModuleSource::Path(path), &deps, None)
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "INVALID_MANIFEST");

        let err = loader
            .load(&ModuleSource::Path(dir.path().join("nope")), &deps, None)
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "PATH_NOT_FOUND");
    }

    #[test]
    fn test_broken_manifest_does_not_hide_siblings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_broken.json"), "{ not json").unwrap();
        std::fs::write(
            dir.path().join("b_scene.json"),
            r#"{"actions": [{"handler": "save", "name": "SaveScene"}]}"#,
        )
        .unwrap();

        let loader = CatalogLoader::new();
        loader.register_handler("save", handler("save"));
        let module = loader
            .load(
                &ModuleSource::Path(dir.path().to_path_buf()),
                &Dependencies::new(),
                None,
            )
            .unwrap();

        let actions = module.actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0].as_ref().unwrap_err().error_code(),
            "INVALID_MANIFEST"
        );
        assert_eq!(actions[1].as_ref().unwrap().name(), "SaveScene");
    }

    #[test]
    fn test_static_module_invalid_candidate() {
        let module = StaticModule::new("mixed")
            .with_action(handler("Good"))
            .with_invalid("Bad", "no execute hook");
        let actions = module.actions();
        assert!(actions[0].is_ok());
        match &actions[1] {
            Err(DiscoveryError::InvalidCandidate { name, reason }) => {
                assert_eq!(name, "Bad");
                assert_eq!(reason, "no execute hook");
            }
            other => panic!("unexpected candidate {other:?}"),
        }
    }
}
