//! Process-wide cache of action managers keyed `"<target system>:<name>"`.

use crate::config::ManagerConfig;
use crate::error::ConfigError;
use crate::manager::ActionManager;
use dcc_mcp_core::IdentifierRules;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

static MANAGERS: Mutex<BTreeMap<String, Arc<ActionManager>>> = Mutex::new(BTreeMap::new());

/// Cached get-or-create. `config` is only used when the manager is created.
pub fn get_action_manager(
    target_system: &str,
    name: &str,
    config: ManagerConfig,
) -> Result<Arc<ActionManager>, ConfigError> {
    create_action_manager(target_system, name, config, false)
}

/// Get-or-create, or with `force_new` build a fresh manager that bypasses
/// the cache and leaves any cached entry untouched.
pub fn create_action_manager(
    target_system: &str,
    name: &str,
    config: ManagerConfig,
    force_new: bool,
) -> Result<Arc<ActionManager>, ConfigError> {
    if force_new {
        debug!(target_system = %target_system, manager = %name, "Creating uncached action manager");
        return ActionManager::new(target_system, name, config).map(Arc::new);
    }

    let key = cache_key(target_system, name);
    let mut managers = MANAGERS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(manager) = managers.get(&key) {
        debug!(key = %key, "Returning cached action manager");
        return Ok(Arc::clone(manager));
    }
    let manager = Arc::new(ActionManager::new(target_system, name, config)?);
    managers.insert(key, Arc::clone(&manager));
    Ok(manager)
}

/// Keys of the cached managers.
pub fn cached_managers() -> Vec<String> {
    MANAGERS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect()
}

/// Drop every cached manager. Returns how many were dropped.
pub fn clear_action_managers() -> usize {
    let mut managers = MANAGERS.lock().unwrap_or_else(PoisonError::into_inner);
    let count = managers.len();
    managers.clear();
    debug!(count, "Cleared action manager cache");
    count
}

/// Identifiers are normalized first, so `" maya "` and `"maya"` share an entry.
fn cache_key(target_system: &str, name: &str) -> String {
    let target_system = IdentifierRules::TARGET_SYSTEM
        .validate(target_system)
        .unwrap_or_else(|_| target_system.to_string());
    let name = IdentifierRules::MANAGER_NAME
        .validate(name)
        .unwrap_or_else(|_| name.to_string());
    format!("{target_system}:{name}")
}
