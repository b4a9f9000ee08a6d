//! # DCC-MCP Actions
//!
//! Runtime pieces that turn registered action types into callable actions:
//!
//! - [`ActionRegistry`]: catalog of action types, indexed globally and per
//!   target system, with discovery from packages, paths and hooks
//! - [`Middleware`] / [`MiddlewareChain`]: composable wrappers around
//!   execution, built into an immutable [`Pipeline`]
//! - [`EventBus`]: fault-isolated publish/subscribe for lifecycle events
//! - [`ActionManager`]: per-target-system execution with context merging,
//!   events and refresh, plus a process-wide manager cache
//!
//! Call-facing operations return [`ActionResult`] and never panic.

/// Process-wide manager cache.
pub mod cache;
/// Manager configuration and environment loading.
pub mod config;
/// Loader, discovery and configuration errors.
pub mod error;
/// Publish/subscribe event bus.
pub mod events;
/// Module loaders and discovery units.
pub mod loader;
/// Action manager and adapters.
pub mod manager;
/// Middleware chain and built-in middleware.
pub mod middleware;
/// Action type registry.
pub mod registry;

pub use cache::{cached_managers, clear_action_managers, create_action_manager, get_action_manager};
pub use config::{ManagerConfig, ManagerConfigBuilder};
pub use error::{ConfigError, DiscoveryError, LoadError};
pub use events::{Event, EventBus, SubscriberError, SubscriberResult, SubscriptionId};
pub use loader::{
    ActionModule, CatalogLoader, ModuleLoader, ModuleSource, PackageEntryPoint, StaticModule,
};
pub use manager::{
    ActionAdapter, ActionManager, after_execute_event, before_execute_event, error_event,
};
pub use middleware::{
    LoggingMiddleware, Middleware, MiddlewareChain, Next, PerformanceMiddleware, Pipeline,
};
pub use registry::{ActionRegistry, DiscoveryHook};

pub use dcc_mcp_core::ActionResult;
