//! The uniform result envelope returned by every call-facing operation.
//!
//! `ActionResult` is the only shape consumed outside the process. Its wire
//! form is a flat JSON object:
//!
//! ```json
//! {"success": true, "message": "...", "error": null, "prompt": null, "context": {}}
//! ```
//!
//! `error` is populated exactly when `success` is false, and `context` is
//! always an object. Both rules are enforced by the constructors and
//! re-checked on deserialization.

use crate::context::ContextMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Context key holding a rendered error chain and backtrace.
pub const TRACEBACK_KEY: &str = "traceback";

/// Success/failure envelope for action calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireResult")]
pub struct ActionResult {
    success: bool,
    message: String,
    error: Option<String>,
    prompt: Option<String>,
    context: ContextMap,
}

/// Unchecked mirror of the wire shape, validated into `ActionResult`.
#[derive(Deserialize)]
struct WireResult {
    #[serde(default = "default_success")]
    success: bool,
    message: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    context: Option<ContextMap>,
}

fn default_success() -> bool {
    true
}

/// Raised when a wire payload violates the envelope invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultShapeError {
    #[error("failed result must carry an error")]
    MissingError,
    #[error("successful result must not carry an error")]
    UnexpectedError,
}

impl TryFrom<WireResult> for ActionResult {
    type Error = ResultShapeError;

    fn try_from(raw: WireResult) -> Result<Self, Self::Error> {
        match (raw.success, &raw.error) {
            (false, None) => return Err(ResultShapeError::MissingError),
            (false, Some(error)) if error.trim().is_empty() => {
                return Err(ResultShapeError::MissingError);
            }
            (true, Some(_)) => return Err(ResultShapeError::UnexpectedError),
            _ => {}
        }
        Ok(Self {
            success: raw.success,
            message: raw.message,
            error: raw.error,
            prompt: raw.prompt,
            context: raw.context.unwrap_or_default(),
        })
    }
}

impl ActionResult {
    /// Create a successful result.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            prompt: None,
            context: ContextMap::new(),
        }
    }

    /// Create a failed result. `error` is the machine-facing detail,
    /// `message` the human-facing summary. An empty `error` falls back to
    /// the message.
    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        let message = message.into();
        let error = error_detail(error.into(), &message);
        Self {
            success: false,
            message,
            error: Some(error),
            prompt: None,
            context: ContextMap::new(),
        }
    }

    /// Create a failed result from an error, recording its source chain and a
    /// captured backtrace under `context.traceback`.
    pub fn from_error(message: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        Self::failure(message, err.to_string())
            .with_context_value(TRACEBACK_KEY, Value::String(render_traceback(err)))
    }

    /// Attach a follow-up prompt for the calling agent.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Replace the context mapping.
    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = context;
        self
    }

    /// Insert a single context entry.
    pub fn with_context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_failure(&self) -> bool {
        !self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    /// Mutable access for middleware that decorates results.
    pub fn context_mut(&mut self) -> &mut ContextMap {
        &mut self.context
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn set_prompt(&mut self, prompt: Option<String>) {
        self.prompt = prompt;
    }

    /// Turn this result into a failure, keeping message, prompt and context.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.success = false;
        self.error = Some(error_detail(error.into(), &self.message));
    }

    /// Turn this result into a success, dropping any error.
    pub fn mark_succeeded(&mut self) {
        self.success = true;
        self.error = None;
    }

    /// Fill in `message` if it is empty. Returns true when a default was applied.
    pub fn default_message(&mut self, message: impl FnOnce() -> String) -> bool {
        if self.message.is_empty() {
            self.message = message();
            true
        } else {
            false
        }
    }

    /// Render as the wire-shaped JSON object.
    pub fn to_wire(&self) -> Value {
        // Infallible: every field is a plain JSON value.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from the wire-shaped JSON object.
    pub fn from_wire(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionResult(success={}, message={:?}", self.success, self.message)?;
        if let Some(error) = &self.error {
            write!(f, ", error={:?}", error)?;
        }
        write!(f, ")")
    }
}

/// A failed result always carries a non-empty error.
fn error_detail(error: String, message: &str) -> String {
    if !error.trim().is_empty() {
        error
    } else if !message.trim().is_empty() {
        message.to_string()
    } else {
        "Unknown error".to_string()
    }
}

/// Render an error's source chain followed by a captured backtrace.
pub fn render_traceback(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = format!("Error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(&format!("\nCaused by: {}", cause));
        source = cause.source();
    }
    let backtrace = std::backtrace::Backtrace::force_capture();
    out.push_str(&format!("\n\nBacktrace:\n{}", backtrace));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_defaults() {
        let result = ActionResult::success("Test message");
        assert!(result.is_success());
        assert_eq!(result.message(), "Test message");
        assert!(result.error().is_none());
        assert!(result.prompt().is_none());
        assert!(result.context().is_empty());
    }

    #[test]
    fn test_failure_carries_error() {
        let result = ActionResult::failure("Failed to create spheres", "Memory limit exceeded")
            .with_prompt("Try reducing the number of objects")
            .with_context_value("error_code", json!(404));

        assert!(result.is_failure());
        assert_eq!(result.error(), Some("Memory limit exceeded"));
        assert_eq!(result.context()["error_code"], json!(404));
        assert!(result.to_string().contains("success=false"));
    }

    #[test]
    fn test_empty_error_falls_back_to_message() {
        let result = ActionResult::failure("Export failed", "");
        assert_eq!(result.error(), Some("Export failed"));

        let result = ActionResult::from_error("", &crate::ActionError::msg(""));
        assert_eq!(result.error(), Some("Unknown error"));

        let mut result = ActionResult::success("Render finished");
        result.mark_failed(" ");
        assert_eq!(result.error(), Some("Render finished"));
    }

    #[test]
    fn test_wire_round_trip_nested_context() {
        let context = json!({
            "scene_info": {
                "objects": {"spheres": ["sphere1", "sphere2"], "cubes": ["cube1"]},
                "stats": {"total_objects": 3, "performance": {"fps": 60, "render_time": "0.2s"}}
            },
            "user_settings": {"preferences": {"auto_save": true, "theme": "dark"}}
        });
        let result = ActionResult::success("ok")
            .with_prompt("next")
            .with_context(context.as_object().cloned().unwrap());

        let wire = result.to_wire();
        assert_eq!(wire["error"], Value::Null);
        assert_eq!(ActionResult::from_wire(wire).unwrap(), result);

        let json = result.to_json().unwrap();
        assert_eq!(ActionResult::from_json(&json).unwrap(), result);
    }

    #[test]
    fn test_wire_rejects_broken_invariant() {
        assert!(ActionResult::from_wire(json!({"success": false, "message": "x"})).is_err());
        assert!(
            ActionResult::from_wire(json!({"success": false, "message": "x", "error": ""}))
                .is_err()
        );
        assert!(
            ActionResult::from_wire(json!({"success": true, "message": "x", "error": "e"}))
                .is_err()
        );
        assert!(ActionResult::from_wire(json!({"success": true})).is_err());
    }

    #[test]
    fn test_wire_null_context_becomes_empty() {
        let parsed =
            ActionResult::from_wire(json!({"message": "m", "context": null})).unwrap();
        assert!(parsed.is_success());
        assert!(parsed.context().is_empty());
    }

    #[test]
    fn test_from_error_records_traceback() {
        let err = std::io::Error::other("disk on fire");
        let result = ActionResult::from_error("write failed", &err);
        assert_eq!(result.error(), Some("disk on fire"));
        let traceback = result.context()[TRACEBACK_KEY].as_str().unwrap();
        assert!(traceback.starts_with("Error: disk on fire"));
    }

    #[test]
    fn test_mark_failed_and_default_message() {
        let mut result = ActionResult::success("");
        assert!(result.default_message(|| "filled".to_string()));
        assert!(!result.default_message(|| "ignored".to_string()));
        assert_eq!(result.message(), "filled");

        result.mark_failed("late failure");
        assert!(result.is_failure());
        assert_eq!(result.error(), Some("late failure"));
        result.mark_succeeded();
        assert!(result.error().is_none());
    }
}
