use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Version given to actions that do not declare one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Type-level metadata of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Unique within a target-system scope
    pub name: String,
    /// Target system this action operates against, if declared
    pub target_system: Option<String>,
    pub description: String,
    pub category: String,
    pub tags: BTreeSet<String>,
    pub version: String,
    pub author: Option<String>,
    /// Names of dependencies the action expects to be injected
    pub dependencies: Vec<String>,
    /// Abstract types are never registered
    pub is_abstract: bool,
    /// Where the type was discovered, set by path discovery
    pub source: Option<String>,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_system: None,
            description: String::new(),
            category: String::new(),
            tags: BTreeSet::new(),
            version: DEFAULT_VERSION.to_string(),
            author: None,
            dependencies: Vec::new(),
            is_abstract: false,
            source: None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Name qualified by target system, `maya:CreateSphere`.
    pub fn qualified_name(&self) -> String {
        match &self.target_system {
            Some(system) => format!("{}:{}", system, self.name),
            None => self.name.clone(),
        }
    }
}

/// Read-only record returned by registry listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub name: String,
    pub internal_name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub target_system: Option<String>,
    pub version: String,
    pub author: Option<String>,
    pub dependencies: Vec<String>,
    pub source: Option<String>,
    pub input_schema: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = ActionDescriptor::new("CreateSphere");
        assert_eq!(descriptor.version, DEFAULT_VERSION);
        assert!(!descriptor.is_abstract);
        assert_eq!(descriptor.qualified_name(), "CreateSphere");
    }

    #[test]
    fn test_qualified_name() {
        let mut descriptor = ActionDescriptor::new("CreateSphere");
        descriptor.target_system = Some("maya".to_string());
        assert_eq!(descriptor.qualified_name(), "maya:CreateSphere");
    }
}
