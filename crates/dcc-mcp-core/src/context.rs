//! Context values and injected dependencies visible to an action instance.

use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Mapping of shared JSON values (environment, call-scoped data).
pub type ContextMap = serde_json::Map<String, Value>;

/// Merge `overlay` onto `base`. Keys in `overlay` win on collision.
pub fn merge_context(base: &ContextMap, overlay: &ContextMap) -> ContextMap {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Named, type-erased values handed to module entry points and actions.
///
/// Cloning is cheap: entries are reference counted.
#[derive(Clone, Default)]
pub struct Dependencies {
    entries: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.entries.insert(name.into(), Arc::new(value));
    }

    /// Insert an already shared value without re-wrapping it.
    pub fn insert_arc<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.entries.insert(name.into(), value);
    }

    /// Typed lookup. Returns `None` if absent or stored under another type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .get(name)
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries from `other` override entries with the same name.
    pub fn extend(&mut self, other: &Dependencies) {
        for (name, value) in &other.entries {
            self.entries.insert(name.clone(), Arc::clone(value));
        }
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Everything an action instance can see besides its validated input.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub values: ContextMap,
    pub dependencies: Dependencies,
}

impl ActionContext {
    pub fn new(values: ContextMap, dependencies: Dependencies) -> Self {
        Self {
            values,
            dependencies,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Typed lookup of an injected dependency.
    pub fn dependency<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.dependencies.get(name)
    }
}
