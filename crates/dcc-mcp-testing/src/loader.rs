//! In-memory module loader for discovery tests.

use dcc_mcp_actions::{ActionModule, LoadError, ModuleLoader, ModuleSource, StaticModule};
use dcc_mcp_core::Dependencies;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// One call to [`InMemoryModuleLoader::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRecord {
    pub source: ModuleSource,
    pub target_system: Option<String>,
    /// Names of the dependencies handed to the loader, sorted.
    pub dependencies: Vec<String>,
}

/// Serves predefined modules by package name or path and records every load.
#[derive(Debug, Default)]
pub struct InMemoryModuleLoader {
    modules: RwLock<HashMap<ModuleSource, Arc<StaticModule>>>,
    loads: Mutex<Vec<LoadRecord>>,
}

impl InMemoryModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(self, name: impl Into<String>, module: StaticModule) -> Self {
        self.insert(ModuleSource::Package(name.into()), module);
        self
    }

    pub fn with_path(self, path: impl Into<PathBuf>, module: StaticModule) -> Self {
        self.insert(ModuleSource::Path(path.into()), module);
        self
    }

    /// Add or replace a module after construction.
    pub fn insert(&self, source: ModuleSource, module: StaticModule) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source, Arc::new(module));
    }

    pub fn loads(&self) -> Vec<LoadRecord> {
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ModuleLoader for InMemoryModuleLoader {
    fn load(
        &self,
        source: &ModuleSource,
        dependencies: &Dependencies,
        target_system: Option<&str>,
    ) -> Result<Arc<dyn ActionModule>, LoadError> {
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LoadRecord {
                source: source.clone(),
                target_system: target_system.map(str::to_string),
                dependencies: dependencies.names().map(str::to_string).collect(),
            });

        let module = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned();
        match (module, source) {
            (Some(module), _) => Ok(module),
            (None, ModuleSource::Package(name)) => Err(LoadError::PackageNotFound(name.clone())),
            (None, ModuleSource::Path(path)) => Err(LoadError::PathNotFound(path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_loads_and_misses() {
        let loader = InMemoryModuleLoader::new().with_package("maya_tools", StaticModule::new("maya_tools"));
        let deps = Dependencies::new().with("scene", 1_u32);

        let module = loader
            .load(&ModuleSource::Package("maya_tools".into()), &deps, Some("maya"))
            .unwrap();
        assert_eq!(module.name(), "maya_tools");

        let err = loader
            .load(&ModuleSource::Path("/missing".into()), &deps, None)
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "PATH_NOT_FOUND");

        let loads = loader.loads();
        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0].target_system.as_deref(), Some("maya"));
        assert_eq!(loads[0].dependencies, vec!["scene"]);
    }
}
