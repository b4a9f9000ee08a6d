//! Middleware wrapping action execution.
//!
//! A [`MiddlewareChain`] collects middleware factories in add-order and
//! builds them into an immutable [`Pipeline`]. The first middleware added is
//! the outermost: it sees the call first and the result last. The tail of the
//! pipeline is `ActionInstance::process` (or `process_async`).

use async_trait::async_trait;
use dcc_mcp_core::{ActionInstance, ActionResult};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Context key written by [`PerformanceMiddleware`].
pub const PERFORMANCE_KEY: &str = "performance";

/// A composable wrapper around action execution.
///
/// Most middleware only implement [`Middleware::before`] and
/// [`Middleware::after`]. The default `process` and `process_async` wrap the
/// rest of the pipeline in those two hooks, so such a middleware takes part
/// in both paths and the async path stays async down to the action's
/// `execute_async`. Overriding `process` alone only changes the blocking
/// path; a middleware that needs full control on both paths overrides both.
///
/// Implementations must not keep per-call state in `self` without their own
/// synchronization: one instance serves every call through a pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "middleware"
    }

    /// Runs before the rest of the pipeline.
    fn before(&self, _action: &mut ActionInstance) {}

    /// Runs after the rest of the pipeline and may modify its result.
    fn after(&self, _action: &ActionInstance, _result: &mut ActionResult) {}

    /// Handle a call on the blocking path.
    fn process(&self, action: &mut ActionInstance, next: Next<'_>) -> ActionResult {
        self.before(action);
        let mut result = next.run(action);
        self.after(action, &mut result);
        result
    }

    /// Handle a call on the async path.
    async fn process_async(&self, action: &mut ActionInstance, next: Next<'_>) -> ActionResult {
        self.before(action);
        let mut result = next.run_async(action).await;
        self.after(action, &mut result);
        result
    }
}

/// The remainder of a pipeline after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
}

impl Next<'_> {
    /// Run the rest of the pipeline on the blocking path.
    pub fn run(self, action: &mut ActionInstance) -> ActionResult {
        match self.rest.split_first() {
            Some((head, rest)) => head.process(action, Next { rest }),
            None => action.process(),
        }
    }

    /// Run the rest of the pipeline on the async path.
    pub async fn run_async(self, action: &mut ActionInstance) -> ActionResult {
        match self.rest.split_first() {
            Some((head, rest)) => head.process_async(action, Next { rest }).await,
            None => action.process_async().await,
        }
    }

    /// Number of middleware left before the action itself.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

type MiddlewareFactory = Arc<dyn Fn() -> Arc<dyn Middleware> + Send + Sync>;

/// Ordered list of middleware factories.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    factories: Vec<MiddlewareFactory>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware factory (builder style).
    ///
    /// The factory is invoked once per [`MiddlewareChain::build`].
    pub fn add<M, F>(mut self, factory: F) -> Self
    where
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.push(factory);
        self
    }

    /// Append a middleware factory in place.
    pub fn push<M, F>(&mut self, factory: F)
    where
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.factories
            .push(Arc::new(move || Arc::new(factory()) as Arc<dyn Middleware>));
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate every middleware. Returns `None` for an empty chain, in
    /// which case the caller runs the action directly.
    pub fn build(&self) -> Option<Pipeline> {
        if self.factories.is_empty() {
            return None;
        }
        let links: Vec<Arc<dyn Middleware>> = self.factories.iter().map(|f| f()).collect();
        Some(Pipeline {
            links: links.into(),
        })
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.factories.len())
            .finish()
    }
}

/// A built, immutable middleware pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    links: Arc<[Arc<dyn Middleware>]>,
}

impl Pipeline {
    pub fn process(&self, action: &mut ActionInstance) -> ActionResult {
        Next { rest: &self.links }.run(action)
    }

    pub async fn process_async(&self, action: &mut ActionInstance) -> ActionResult {
        Next { rest: &self.links }.run_async(action).await
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Middleware names, outermost first.
    pub fn names(&self) -> Vec<String> {
        self.links.iter().map(|m| m.name().to_string()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Logs start, outcome and duration of every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    fn log_outcome(action: &ActionInstance, result: &ActionResult, elapsed: Duration) {
        if result.is_success() {
            info!(
                action = %action.name(),
                elapsed = %humantime::format_duration(elapsed),
                "Action completed"
            );
        } else {
            warn!(
                action = %action.name(),
                elapsed = %humantime::format_duration(elapsed),
                error = result.error().unwrap_or_default(),
                "Action failed"
            );
        }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn process(&self, action: &mut ActionInstance, next: Next<'_>) -> ActionResult {
        info!(action = %action.name(), "Executing action");
        let start = Instant::now();
        let result = next.run(action);
        Self::log_outcome(action, &result, start.elapsed());
        result
    }

    async fn process_async(&self, action: &mut ActionInstance, next: Next<'_>) -> ActionResult {
        info!(action = %action.name(), "Executing action asynchronously");
        let start = Instant::now();
        let result = next.run_async(action).await;
        Self::log_outcome(action, &result, start.elapsed());
        result
    }
}

/// Records execution time under `context.performance.execution_time`
/// (seconds) and warns when a call exceeds `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceMiddleware {
    threshold: Duration,
}

impl Default for PerformanceMiddleware {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl PerformanceMiddleware {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    fn record(&self, action: &ActionInstance, result: &mut ActionResult, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        let performance = result
            .context_mut()
            .entry(PERFORMANCE_KEY)
            .or_insert_with(|| json!({}));
        match performance {
            Value::Object(map) => {
                map.insert("execution_time".to_string(), json!(seconds));
            }
            other => *other = json!({ "execution_time": seconds }),
        }
        if elapsed > self.threshold {
            warn!(
                action = %action.name(),
                elapsed = %humantime::format_duration(elapsed),
                threshold = %humantime::format_duration(self.threshold),
                "Slow action execution"
            );
        }
    }
}

#[async_trait]
impl Middleware for PerformanceMiddleware {
    fn name(&self) -> &str {
        "performance"
    }

    fn process(&self, action: &mut ActionInstance, next: Next<'_>) -> ActionResult {
        let start = Instant::now();
        let mut result = next.run(action);
        self.record(action, &mut result, start.elapsed());
        result
    }

    async fn process_async(&self, action: &mut ActionInstance, next: Next<'_>) -> ActionResult {
        let start = Instant::now();
        let mut result = next.run_async(action).await;
        self.record(action, &mut result, start.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcc_mcp_core::{Action, ActionContext, ActionError, ActionInput, ActionOutput, ActionType};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records entry and exit, optionally tagging the result context.
    struct Tracer {
        label: &'static str,
        log: Log,
        mutate: bool,
    }

    impl Middleware for Tracer {
        fn name(&self) -> &str {
            self.label
        }

        fn before(&self, _action: &mut ActionInstance) {
            self.log.lock().unwrap().push(format!("{}:before", self.label));
        }

        fn after(&self, _action: &ActionInstance, result: &mut ActionResult) {
            if self.mutate {
                result
                    .context_mut()
                    .insert("touched_by".to_string(), json!(self.label));
            }
            let seen = result.context().get("touched_by").cloned();
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:after:{}", self.label, seen.unwrap_or(Value::Null)));
        }
    }

    fn tracer(label: &'static str, log: &Log, mutate: bool) -> impl Fn() -> Tracer + use<> {
        let log = Arc::clone(log);
        move || Tracer {
            label,
            log: Arc::clone(&log),
            mutate,
        }
    }

    fn ready_instance(log: &Log) -> ActionInstance {
        let log = Arc::clone(log);
        let action = ActionType::builder("echo")
            .execute_fn(move |_, _| {
                log.lock().unwrap().push("action".to_string());
                Ok(ActionOutput::empty())
            })
            .build();
        let mut instance = action.instantiate(ActionContext::default()).unwrap();
        instance.setup(Value::Null).unwrap();
        instance
    }

    #[test]
    fn test_empty_chain_builds_nothing() {
        assert!(MiddlewareChain::new().build().is_none());
    }

    #[test]
    fn test_add_order_is_outermost_first() {
        let log: Log = Arc::default();
        let pipeline = MiddlewareChain::new()
            .add(tracer("M1", &log, false))
            .add(tracer("M2", &log, false))
            .add(tracer("M3", &log, true))
            .build()
            .unwrap();
        assert_eq!(pipeline.names(), vec!["M1", "M2", "M3"]);

        let mut instance = ready_instance(&log);
        let result = pipeline.process(&mut instance);

        assert!(result.is_success());
        assert_eq!(result.context()["touched_by"], json!("M3"));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "M1:before",
                "M2:before",
                "M3:before",
                "action",
                r#"M3:after:"M3""#,
                r#"M2:after:"M3""#,
                r#"M1:after:"M3""#,
            ]
        );
    }

    /// Reports which execution hook ran.
    struct PathReporter;

    #[async_trait]
    impl Action for PathReporter {
        fn execute(
            &mut self,
            _input: &ActionInput,
            _context: &ActionContext,
        ) -> Result<ActionOutput, ActionError> {
            ActionOutput::value(json!({"path": "sync"}))
        }

        async fn execute_async(
            &mut self,
            _input: &ActionInput,
            _context: &ActionContext,
        ) -> Result<ActionOutput, ActionError> {
            ActionOutput::value(json!({"path": "async"}))
        }
    }

    fn path_reporter() -> ActionInstance {
        let mut instance = ActionType::builder("report_path")
            .handler(|| PathReporter)
            .build()
            .instantiate(ActionContext::default())
            .unwrap();
        instance.setup(Value::Null).unwrap();
        instance
    }

    #[tokio::test]
    async fn test_hook_middleware_keeps_async_tail() {
        let log: Log = Arc::default();
        let pipeline = MiddlewareChain::new()
            .add(PerformanceMiddleware::default)
            .add(tracer("hooks-only", &log, true))
            .build()
            .unwrap();

        let result = pipeline.process_async(&mut path_reporter()).await;

        assert!(result.is_success());
        assert_eq!(result.context()["path"], json!("async"));
        assert_eq!(result.context()["touched_by"], json!("hooks-only"));
        assert!(result.context()[PERFORMANCE_KEY]["execution_time"].is_f64());
        assert_eq!(log.lock().unwrap()[0], "hooks-only:before");

        let result = pipeline.process(&mut path_reporter());
        assert_eq!(result.context()["path"], json!("sync"));
    }

    #[test]
    fn test_pipeline_reusable_after_failed_call() {
        let log: Log = Arc::default();
        let pipeline = MiddlewareChain::new()
            .add(|| LoggingMiddleware)
            .build()
            .unwrap();

        let failing = ActionType::builder("fails")
            .execute_fn(|_, _| Err(ActionError::msg("nope")))
            .build();
        let mut instance = failing.instantiate(ActionContext::default()).unwrap();
        instance.setup(Value::Null).unwrap();
        assert!(pipeline.process(&mut instance).is_failure());

        let mut instance = ready_instance(&log);
        assert!(pipeline.process(&mut instance).is_success());
    }

    #[test]
    fn test_performance_keeps_existing_performance_entries() {
        let action = ActionType::builder("timed")
            .execute_fn(|_, _| ActionOutput::value(json!({"performance": {"frames": 24}})))
            .build();
        let mut instance = action.instantiate(ActionContext::default()).unwrap();
        instance.setup(Value::Null).unwrap();

        let pipeline = MiddlewareChain::new()
            .add(|| PerformanceMiddleware::new(Duration::from_secs(60)))
            .build()
            .unwrap();
        let result = pipeline.process(&mut instance);

        assert_eq!(result.context()[PERFORMANCE_KEY]["frames"], json!(24));
        assert!(result.context()[PERFORMANCE_KEY]["execution_time"].as_f64().unwrap() >= 0.0);
    }
}
