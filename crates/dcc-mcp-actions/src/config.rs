//! # Manager Configuration
//!
//! Settings for an [`ActionManager`](crate::ActionManager), built in code or
//! loaded from environment variables.
//!
//! ## Environment Variables
//!
//! - `DCC_MCP_ACTION_PATHS` - Search paths, separated like `PATH` (default: none)
//! - `DCC_MCP_AUTO_REFRESH` - Re-discover actions before calls when due (default: true)
//! - `DCC_MCP_REFRESH_INTERVAL` - Minimum time between refreshes, e.g. `30s`, `5m` (default: 60s)
//! - `DCC_MCP_SCOPE_FALLBACK` - Fall back to unscoped lookup when the manager's
//!   target system has no action of that name (default: false)

use crate::error::ConfigError;
use crate::events::EventBus;
use crate::registry::ActionRegistry;
use dcc_mcp_core::{ContextMap, Dependencies};
use serde_json::Value;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_ACTION_PATHS: &str = "DCC_MCP_ACTION_PATHS";
pub const ENV_AUTO_REFRESH: &str = "DCC_MCP_AUTO_REFRESH";
pub const ENV_REFRESH_INTERVAL: &str = "DCC_MCP_REFRESH_INTERVAL";
pub const ENV_SCOPE_FALLBACK: &str = "DCC_MCP_SCOPE_FALLBACK";

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Resolved manager settings.
#[derive(Clone)]
pub struct ManagerConfig {
    /// Directories scanned for action manifests on every refresh.
    pub search_paths: Vec<PathBuf>,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
    /// Fall back to the unscoped registry lookup in `call_action`.
    pub scope_fallback: bool,
    /// Initial entries of the manager context. Overrides the defaults.
    pub context: ContextMap,
    /// Values injected into every action context and loader entry point.
    pub dependencies: Dependencies,
    /// Registry to use instead of the process-wide one.
    pub registry: Option<Arc<ActionRegistry>>,
    /// Event bus to use instead of the process-wide one.
    pub event_bus: Option<Arc<EventBus>>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfigBuilder::default().build()
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("search_paths", &self.search_paths)
            .field("auto_refresh", &self.auto_refresh)
            .field("refresh_interval", &self.refresh_interval)
            .field("scope_fallback", &self.scope_fallback)
            .field("context", &self.context)
            .field("dependencies", &self.dependencies)
            .field("registry", &self.registry.is_some())
            .field("event_bus", &self.event_bus.is_some())
            .finish()
    }
}

impl ManagerConfig {
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ManagerConfigBuilder::from_env()?.build())
    }
}

/// Builder for [`ManagerConfig`] with environment variable support
#[derive(Clone)]
pub struct ManagerConfigBuilder {
    config: ManagerConfig,
}

impl Default for ManagerConfigBuilder {
    fn default() -> Self {
        Self {
            config: ManagerConfig {
                search_paths: Vec::new(),
                auto_refresh: true,
                refresh_interval: DEFAULT_REFRESH_INTERVAL,
                scope_fallback: false,
                context: ContextMap::new(),
                dependencies: Dependencies::new(),
                registry: None,
                event_bus: None,
            },
        }
    }
}

impl ManagerConfigBuilder {
    /// Create a new builder with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(paths) = lookup(ENV_ACTION_PATHS) {
            builder = builder.search_paths(env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()));
        }
        if let Some(auto_refresh) = parse_bool(ENV_AUTO_REFRESH, lookup(ENV_AUTO_REFRESH))? {
            builder = builder.auto_refresh(auto_refresh);
        }
        if let Some(interval) = parse_duration(ENV_REFRESH_INTERVAL, lookup(ENV_REFRESH_INTERVAL))? {
            builder = builder.refresh_interval(interval);
        }
        if let Some(fallback) = parse_bool(ENV_SCOPE_FALLBACK, lookup(ENV_SCOPE_FALLBACK))? {
            builder = builder.scope_fallback(fallback);
        }

        Ok(builder)
    }

    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.search_paths.push(path.into());
        self
    }

    pub fn search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config
            .search_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn auto_refresh(mut self, enabled: bool) -> Self {
        self.config.auto_refresh = enabled;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    pub fn scope_fallback(mut self, enabled: bool) -> Self {
        self.config.scope_fallback = enabled;
        self
    }

    pub fn context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.context.insert(key.into(), value);
        self
    }

    pub fn dependency<T: std::any::Any + Send + Sync>(
        mut self,
        name: impl Into<String>,
        value: T,
    ) -> Self {
        self.config.dependencies.insert(name, value);
        self
    }

    pub fn registry(mut self, registry: Arc<ActionRegistry>) -> Self {
        self.config.registry = Some(registry);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.config.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> ManagerConfig {
        self.config
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(val) = value else {
        return Ok(None);
    };
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidEnvVar {
            key: key.to_string(),
            message: format!("invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"),
        }),
    }
}

fn parse_duration(key: &str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(val) = value else {
        return Ok(None);
    };
    let trimmed = val.trim();
    // bare numbers are seconds
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Some(Duration::from_secs(secs)));
    }
    humantime::parse_duration(trimmed)
        .map(Some)
        .map_err(|e| ConfigError::InvalidEnvVar {
            key: key.to_string(),
            message: format!("invalid duration '{val}': {e}"),
        })
}
