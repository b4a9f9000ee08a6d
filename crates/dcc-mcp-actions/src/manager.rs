//! Per-target-system action execution.
//!
//! An [`ActionManager`] resolves action types from a registry, builds a
//! context for each call, runs the call through its middleware pipeline and
//! publishes lifecycle events. Every call-facing operation returns an
//! [`ActionResult`]; nothing on the call path panics or returns `Err`.
//!
//! The blocking and async entry points drive one execution core. On the
//! blocking path the core never suspends: events go to sync subscribers and
//! the pipeline runs through its sync hooks. On the async path the same
//! steps await async subscribers and the async hooks.

use crate::config::ManagerConfig;
use crate::error::ConfigError;
use crate::events::EventBus;
use crate::middleware::{Middleware, MiddlewareChain, Pipeline};
use crate::registry::ActionRegistry;
use chrono::{DateTime, Utc};
use dcc_mcp_core::action::panic_error;
use dcc_mcp_core::{
    ActionContext, ActionResult, ActionType, ContextMap, Dependencies,
    IdentifierRules, merge_context,
};
use futures::FutureExt;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const BEFORE_REFRESH_EVENT: &str = "action_manager.before_refresh";
pub const AFTER_REFRESH_EVENT: &str = "action_manager.after_refresh";
pub const BEFORE_DISCOVER_EVENT: &str = "action_manager.before_discover";
pub const AFTER_DISCOVER_EVENT: &str = "action_manager.after_discover";

/// Dependency name under which the manager's event bus is injected.
pub const EVENT_BUS_DEPENDENCY: &str = "event_bus";
/// Dependency name under which the manager's registry is injected.
pub const REGISTRY_DEPENDENCY: &str = "registry";

const RETRY_PROMPT: &str = "Please check the input parameters and try again";
const NOT_FOUND_PROMPT: &str = "Please check the action name or register the action first";

/// `action.before_execute.<name>`
pub fn before_execute_event(action: &str) -> String {
    format!("action.before_execute.{action}")
}

/// `action.after_execute.<name>`
pub fn after_execute_event(action: &str) -> String {
    format!("action.after_execute.{action}")
}

/// `action.error.<name>`
pub fn error_event(action: &str) -> String {
    format!("action.error.{action}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionMode {
    Blocking,
    Cooperative,
}

struct MiddlewareState {
    chain: MiddlewareChain,
    pipeline: Option<Pipeline>,
}

#[derive(Debug, Clone, Copy)]
struct RefreshStamp {
    at: Instant,
    timestamp: DateTime<Utc>,
}

/// Executes actions for one target system.
pub struct ActionManager {
    name: String,
    target_system: String,
    registry: Arc<ActionRegistry>,
    event_bus: Arc<EventBus>,
    dependencies: Dependencies,
    context: RwLock<ContextMap>,
    middleware: RwLock<MiddlewareState>,
    search_paths: Vec<PathBuf>,
    auto_refresh: bool,
    refresh_interval: Duration,
    scope_fallback: bool,
    last_refresh: Mutex<Option<RefreshStamp>>,
}

impl fmt::Debug for ActionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionManager")
            .field("name", &self.name)
            .field("target_system", &self.target_system)
            .field("middleware", &self.middleware_len())
            .field("search_paths", &self.search_paths)
            .field("auto_refresh", &self.auto_refresh)
            .field("refresh_interval", &self.refresh_interval)
            .field("scope_fallback", &self.scope_fallback)
            .finish()
    }
}

impl ActionManager {
    /// Create a manager for `target_system`.
    ///
    /// # Parameters
    ///
    /// * `target_system` - Partition key used for every registry lookup
    /// * `name` - Manager name, unique per target system in the manager cache
    /// * `config` - Search paths, refresh policy, initial context and dependencies
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidIdentifier` if either identifier breaks
    /// the naming rules.
    pub fn new(
        target_system: &str,
        name: &str,
        config: ManagerConfig,
    ) -> Result<Self, ConfigError> {
        let target_system = normalize("target_system", IdentifierRules::TARGET_SYSTEM, target_system)?;
        let name = normalize("manager_name", IdentifierRules::MANAGER_NAME, name)?;

        let registry = config.registry.unwrap_or_else(ActionRegistry::global);
        let event_bus = config.event_bus.unwrap_or_else(EventBus::global);

        let mut dependencies = config.dependencies;
        dependencies.insert_arc(EVENT_BUS_DEPENDENCY, Arc::clone(&event_bus));
        dependencies.insert_arc(REGISTRY_DEPENDENCY, Arc::clone(&registry));

        let mut context = default_context(&target_system, &name);
        context.extend(config.context);

        info!(
            manager = %name,
            target_system = %target_system,
            search_paths = config.search_paths.len(),
            "Created action manager"
        );

        Ok(Self {
            name,
            target_system,
            registry,
            event_bus,
            dependencies,
            context: RwLock::new(context),
            middleware: RwLock::new(MiddlewareState {
                chain: MiddlewareChain::new(),
                pipeline: None,
            }),
            search_paths: config.search_paths,
            auto_refresh: config.auto_refresh,
            refresh_interval: config.refresh_interval,
            scope_fallback: config.scope_fallback,
            last_refresh: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_system(&self) -> &str {
        &self.target_system
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Snapshot of the manager context.
    pub fn context(&self) -> ContextMap {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set one manager context entry. Later calls see the new value.
    pub fn update_context(&self, key: impl Into<String>, value: Value) {
        self.context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.lock_refresh().map(|stamp| stamp.timestamp)
    }

    /// Append a middleware and rebuild the pipeline.
    ///
    /// The first middleware added is the outermost. Calls already running
    /// keep the pipeline they started with.
    pub fn add_middleware<M, F>(&self, factory: F) -> &Self
    where
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let mut state = self
            .middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        state.chain.push(factory);
        state.pipeline = state.chain.build();
        debug!(
            manager = %self.name,
            middleware = ?state.pipeline.as_ref().map(Pipeline::names).unwrap_or_default(),
            "Rebuilt middleware pipeline"
        );
        self
    }

    pub fn middleware_len(&self) -> usize {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chain
            .len()
    }

    /// Call an action with parameters and the manager context.
    pub fn call_action(&self, name: &str, params: Value) -> ActionResult {
        run_blocking(self.execute(name, None, params, ExecutionMode::Blocking))
    }

    /// Call an action with an extra context. Call context entries win over
    /// manager context entries of the same key.
    pub fn call_action_with_context(
        &self,
        name: &str,
        context: &ContextMap,
        params: Value,
    ) -> ActionResult {
        run_blocking(self.execute(name, Some(context), params, ExecutionMode::Blocking))
    }

    /// Async twin of [`ActionManager::call_action`].
    pub async fn call_action_async(&self, name: &str, params: Value) -> ActionResult {
        self.execute(name, None, params, ExecutionMode::Cooperative)
            .await
    }

    /// Async twin of [`ActionManager::call_action_with_context`].
    pub async fn call_action_with_context_async(
        &self,
        name: &str,
        context: &ContextMap,
        params: Value,
    ) -> ActionResult {
        self.execute(name, Some(context), params, ExecutionMode::Cooperative)
            .await
    }

    /// Callable bound to one action name.
    pub fn adapter(self: &Arc<Self>, name: impl Into<String>) -> ActionAdapter {
        ActionAdapter {
            manager: Arc::clone(self),
            name: name.into(),
        }
    }

    /// One adapter per action available to this manager, keyed by name.
    pub fn adapters(self: &Arc<Self>) -> BTreeMap<String, ActionAdapter> {
        self.list_available_actions()
            .into_iter()
            .map(|name| (name.clone(), self.adapter(name)))
            .collect()
    }

    /// Re-discover actions from the search paths and `extra_paths`.
    ///
    /// Discovery runs when `force` is set, when `extra_paths` is not empty,
    /// or when the refresh interval has elapsed. The before/after refresh
    /// events are published either way.
    ///
    /// # Returns
    ///
    /// `true` if discovery ran.
    pub fn refresh_actions(&self, force: bool, extra_paths: &[PathBuf]) -> bool {
        run_blocking(self.refresh(force, extra_paths, ExecutionMode::Blocking))
    }

    /// Async twin of [`ActionManager::refresh_actions`].
    pub async fn refresh_actions_async(&self, force: bool, extra_paths: &[PathBuf]) -> bool {
        self.refresh(force, extra_paths, ExecutionMode::Cooperative)
            .await
    }

    /// Discover actions at `path` for this manager's target system.
    pub fn discover_actions_from_path(&self, path: &Path) -> Vec<ActionType> {
        let source = path.display().to_string();
        self.publish_discover(BEFORE_DISCOVER_EVENT, "path", &source, None);
        let discovered =
            self.registry
                .discover_path(path, Some(&self.target_system), &self.dependencies);
        self.publish_discover(AFTER_DISCOVER_EVENT, "path", &source, Some(&discovered));
        discovered
    }

    /// Discover actions of a package for this manager's target system.
    pub fn discover_actions_from_package(&self, package: &str) -> Vec<ActionType> {
        self.publish_discover(BEFORE_DISCOVER_EVENT, "package", package, None);
        let discovered =
            self.registry
                .discover_package(package, Some(&self.target_system), &self.dependencies);
        self.publish_discover(AFTER_DISCOVER_EVENT, "package", package, Some(&discovered));
        discovered
    }

    /// Names of the actions registered for this manager's target system.
    pub fn list_available_actions(&self) -> Vec<String> {
        self.registry.list_names(Some(&self.target_system))
    }

    /// Listing of this manager's actions as a result envelope.
    pub fn get_actions_info(&self) -> ActionResult {
        let mut actions = ContextMap::new();
        for info in self.registry.list(Some(&self.target_system), None) {
            let has_input_schema = info.input_schema["properties"]
                .as_object()
                .is_some_and(|properties| !properties.is_empty());
            let mut entry = match serde_json::to_value(&info) {
                Ok(Value::Object(map)) => map,
                _ => ContextMap::new(),
            };
            entry.insert("has_input_schema".to_string(), json!(has_input_schema));
            actions.insert(info.name, Value::Object(entry));
        }
        let count = actions.len();

        ActionResult::success(format!(
            "Found {} actions for {}",
            count, self.target_system
        ))
        .with_prompt("You can call any of these actions using the call_action method")
        .with_context_value("target_system", json!(self.target_system))
        .with_context_value("actions", Value::Object(actions))
        .with_context_value("count", json!(count))
    }

    async fn execute(
        &self,
        name: &str,
        call_context: Option<&ContextMap>,
        params: Value,
        mode: ExecutionMode,
    ) -> ActionResult {
        if self.refresh_due() {
            self.refresh(false, &[], mode).await;
        }

        let Some(action_type) = self.resolve(name) else {
            warn!(
                manager = %self.name,
                target_system = %self.target_system,
                action = %name,
                "Action not found in registry"
            );
            return ActionResult::failure(
                format!("Action {name} not found"),
                format!("Action {name} not found in registry"),
            )
            .with_prompt(NOT_FOUND_PROMPT);
        };

        let values = match call_context {
            Some(overlay) => merge_context(&self.context(), overlay),
            None => self.context(),
        };
        let context = ActionContext::new(values, self.dependencies.clone());

        let mut instance = match action_type.instantiate(context) {
            Ok(instance) => instance,
            Err(e) => {
                let result = execution_failure(name, &e);
                self.publish_error(name, &result, mode).await;
                return result;
            }
        };

        if let Err(e) = instance.setup(params) {
            warn!(action = %name, error = %e, code = e.error_code(), "Invalid action input");
            let result = ActionResult::from_error(format!("Error preparing action {name}: {e}"), &e)
                .with_prompt(RETRY_PROMPT);
            self.publish_error(name, &result, mode).await;
            return result;
        }

        let mut data = self.event_data(name);
        data.insert(
            "params".to_string(),
            instance
                .input()
                .map(|input| Value::Object(input.values().clone()))
                .unwrap_or_default(),
        );
        self.publish(mode, &before_execute_event(name), data).await;

        let pipeline = self
            .middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pipeline
            .clone();
        let outcome = match mode {
            ExecutionMode::Blocking => catch_unwind(AssertUnwindSafe(|| match &pipeline {
                Some(pipeline) => pipeline.process(&mut instance),
                None => instance.process(),
            })),
            ExecutionMode::Cooperative => {
                AssertUnwindSafe(async {
                    match &pipeline {
                        Some(pipeline) => pipeline.process_async(&mut instance).await,
                        None => instance.process_async().await,
                    }
                })
                .catch_unwind()
                .await
            }
        };
        let mut result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let err = panic_error(payload);
                let result = execution_failure(name, &err);
                self.publish_error(name, &result, mode).await;
                return result;
            }
        };

        let mut data = self.event_data(name);
        data.insert("result".to_string(), result.to_wire());
        self.publish(mode, &after_execute_event(name), data).await;

        result.default_message(|| format!("Action {name} executed successfully"));
        result
    }

    fn resolve(&self, name: &str) -> Option<ActionType> {
        self.registry
            .get(name, Some(&self.target_system))
            .or_else(|| {
                if !self.scope_fallback {
                    return None;
                }
                let found = self.registry.get(name, None);
                if let Some(action) = &found {
                    debug!(
                        action = %name,
                        target_system = %self.target_system,
                        resolved_target = action.target_system().unwrap_or("-"),
                        "Resolved action through unscoped lookup"
                    );
                }
                found
            })
    }

    fn refresh_due(&self) -> bool {
        self.auto_refresh
            && self
                .lock_refresh()
                .is_none_or(|stamp| stamp.at.elapsed() >= self.refresh_interval)
    }

    async fn refresh(&self, force: bool, extra_paths: &[PathBuf], mode: ExecutionMode) -> bool {
        let elapsed = self.lock_refresh().map(|stamp| stamp.at.elapsed());
        let needed = force
            || !extra_paths.is_empty()
            || elapsed.is_none_or(|elapsed| elapsed >= self.refresh_interval);

        let mut data = self.manager_data();
        data.insert("force".to_string(), json!(force));
        self.publish(mode, BEFORE_REFRESH_EVENT, data).await;

        let mut discovered = Vec::new();
        if needed {
            info!(manager = %self.name, target_system = %self.target_system, "Refreshing actions");
            let now = Utc::now();
            *self
                .last_refresh
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(RefreshStamp {
                at: Instant::now(),
                timestamp: now,
            });
            self.update_context("timestamp", json!(now.to_rfc3339()));
            self.update_context("last_refresh", json!(now.to_rfc3339()));

            for path in self.search_paths.iter().chain(extra_paths) {
                discovered.extend(
                    self.registry
                        .discover_path(path, Some(&self.target_system), &self.dependencies)
                        .iter()
                        .map(|action| action.name().to_string()),
                );
            }
            debug!(
                manager = %self.name,
                discovered = discovered.len(),
                available = self.list_available_actions().len(),
                "Refreshed actions"
            );
        } else if let Some(elapsed) = elapsed {
            debug!(
                manager = %self.name,
                elapsed = %humantime::format_duration(elapsed),
                "Skipping refresh"
            );
        }

        let mut data = self.manager_data();
        data.insert("refreshed".to_string(), json!(needed));
        data.insert("discovered".to_string(), json!(discovered));
        self.publish(mode, AFTER_REFRESH_EVENT, data).await;
        needed
    }

    async fn publish(&self, mode: ExecutionMode, event: &str, data: ContextMap) {
        match mode {
            ExecutionMode::Blocking => {
                self.event_bus.publish(event, data);
            }
            ExecutionMode::Cooperative => {
                self.event_bus.publish_async(event, data).await;
            }
        }
    }

    async fn publish_error(&self, name: &str, result: &ActionResult, mode: ExecutionMode) {
        error!(
            manager = %self.name,
            action = %name,
            error = result.error().unwrap_or_default(),
            "Error calling action"
        );
        let mut data = self.event_data(name);
        data.insert("error".to_string(), json!(result.error()));
        data.insert(
            "traceback".to_string(),
            result
                .context()
                .get(dcc_mcp_core::TRACEBACK_KEY)
                .cloned()
                .unwrap_or_default(),
        );
        self.publish(mode, &error_event(name), data).await;
    }

    fn publish_discover(
        &self,
        event: &str,
        kind: &str,
        source: &str,
        discovered: Option<&[ActionType]>,
    ) {
        let mut data = self.manager_data();
        data.insert(kind.to_string(), json!(source));
        if let Some(discovered) = discovered {
            let names: Vec<&str> = discovered.iter().map(ActionType::name).collect();
            data.insert("discovered".to_string(), json!(names));
        }
        self.event_bus.publish(event, data);
    }

    fn manager_data(&self) -> ContextMap {
        let mut data = ContextMap::new();
        data.insert("manager".to_string(), json!(self.name));
        data.insert("target_system".to_string(), json!(self.target_system));
        data
    }

    fn event_data(&self, action: &str) -> ContextMap {
        let mut data = self.manager_data();
        data.insert("action".to_string(), json!(action));
        data
    }

    fn lock_refresh(&self) -> Option<RefreshStamp> {
        *self
            .last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Callable bound to one action name of one manager.
#[derive(Debug, Clone)]
pub struct ActionAdapter {
    manager: Arc<ActionManager>,
    name: String,
}

impl ActionAdapter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, params: Value) -> ActionResult {
        self.manager.call_action(&self.name, params)
    }

    pub async fn call_async(&self, params: Value) -> ActionResult {
        self.manager.call_action_async(&self.name, params).await
    }
}

fn execution_failure(name: &str, err: &(dyn std::error::Error + 'static)) -> ActionResult {
    ActionResult::from_error(format!("Action {name} execution failed: {err}"), err)
        .with_prompt(RETRY_PROMPT)
}

fn normalize(
    field: &'static str,
    rules: IdentifierRules,
    value: &str,
) -> Result<String, ConfigError> {
    rules
        .validate(value)
        .map_err(|e| ConfigError::InvalidIdentifier {
            field,
            value: value.to_string(),
            message: e.to_string(),
        })
}

fn default_context(target_system: &str, name: &str) -> ContextMap {
    let mut context = ContextMap::new();
    context.insert("target_system".to_string(), json!(target_system));
    context.insert("manager_name".to_string(), json!(name));
    context.insert("platform".to_string(), json!(std::env::consts::OS));
    context.insert("os_family".to_string(), json!(std::env::consts::FAMILY));
    context.insert(
        "runtime_version".to_string(),
        json!(env!("CARGO_PKG_VERSION")),
    );
    context.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
    context
}

/// Drive a blocking-mode future. It never suspends, so one poll finishes it;
/// the executor fallback only runs if a hook misbehaves.
fn run_blocking<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    match future.as_mut().poll(&mut Context::from_waker(Waker::noop())) {
        Poll::Ready(output) => output,
        Poll::Pending => futures::executor::block_on(future),
    }
}
