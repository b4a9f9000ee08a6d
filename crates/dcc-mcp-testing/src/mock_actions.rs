//! # Mock Actions for Testing
//!
//! This module provides a mock action type with a predictable outcome,
//! allowing reliable and controlled manager and middleware tests.

use dcc_mcp_core::{
    ActionError, ActionOutput, ActionResult, ActionType, ContextMap, InputField, InputSchema,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// What a [`MockAction`] does when executed.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return the validated input as the result context.
    Echo,
    /// Return this mapping as the result context.
    Respond(ContextMap),
    /// Fail with this message.
    Fail(String),
    /// Panic with this message.
    Panic(String),
    /// Return this result unchanged.
    Complete(ActionResult),
}

/// A mock action that records every input it was executed with.
#[derive(Debug, Clone)]
pub struct MockAction {
    name: String,
    target_system: Option<String>,
    schema: InputSchema,
    behavior: MockBehavior,
    calls: Arc<Mutex<Vec<ContextMap>>>,
}

impl MockAction {
    /// Create a new mock action that echoes its input
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_system: None,
            schema: InputSchema::new(),
            behavior: MockBehavior::Echo,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_target_system(mut self, target_system: impl Into<String>) -> Self {
        self.target_system = Some(target_system.into());
        self
    }

    /// Declare an input field
    pub fn with_input(mut self, field: InputField) -> Self {
        self.schema = self.schema.field(field);
        self
    }

    /// Return `context` on every call
    pub fn with_response(mut self, context: ContextMap) -> Self {
        self.behavior = MockBehavior::Respond(context);
        self
    }

    /// Fail every call with `error`
    pub fn with_failure(mut self, error: impl Into<String>) -> Self {
        self.behavior = MockBehavior::Fail(error.into());
        self
    }

    /// Panic on every call with `message`
    pub fn with_panic(mut self, message: impl Into<String>) -> Self {
        self.behavior = MockBehavior::Panic(message.into());
        self
    }

    /// Return `result` unchanged on every call
    pub fn with_result(mut self, result: ActionResult) -> Self {
        self.behavior = MockBehavior::Complete(result);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the registrable action type. Every type built from this mock
    /// shares its call history.
    pub fn action_type(&self) -> ActionType {
        let mut builder = ActionType::builder(self.name.clone()).schema(self.schema.clone());
        if let Some(target_system) = &self.target_system {
            builder = builder.target_system(target_system.clone());
        }
        let behavior = self.behavior.clone();
        let calls = Arc::clone(&self.calls);
        builder
            .execute_fn(move |input, _| {
                calls
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(input.values().clone());
                match &behavior {
                    MockBehavior::Echo => Ok(ActionOutput::data(input.values().clone())),
                    MockBehavior::Respond(context) => Ok(ActionOutput::data(context.clone())),
                    MockBehavior::Fail(error) => Err(ActionError::msg(error.clone())),
                    MockBehavior::Panic(message) => panic!("{message}"),
                    MockBehavior::Complete(result) => Ok(ActionOutput::Complete(result.clone())),
                }
            })
            .build()
    }

    /// Get the number of times this action has been executed
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// Get the validated inputs of every execution, oldest first
    pub fn calls(&self) -> Vec<ContextMap> {
        self.lock_calls().clone()
    }

    /// Check if any execution received `key == value`
    pub fn was_called_with(&self, key: &str, value: &Value) -> bool {
        self.lock_calls()
            .iter()
            .any(|call| call.get(key) == Some(value))
    }

    /// Reset call history
    pub fn reset(&self) {
        self.lock_calls().clear();
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<ContextMap>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcc_mcp_core::{ActionContext, FieldKind};
    use serde_json::json;

    fn run(action: &ActionType, params: Value) -> ActionResult {
        let mut instance = action.instantiate(ActionContext::default()).unwrap();
        instance.setup(params).unwrap();
        instance.process()
    }

    #[test]
    fn test_echo_records_calls() {
        let mock = MockAction::new("Echo")
            .with_target_system("maya")
            .with_input(InputField::optional("radius", FieldKind::Float, json!(1.0)));
        let action = mock.action_type();
        assert_eq!(action.target_system(), Some("maya"));

        let result = run(&action, json!({"radius": 2.5}));
        assert!(result.is_success());
        assert_eq!(result.context()["radius"], json!(2.5));
        assert_eq!(mock.call_count(), 1);
        assert!(mock.was_called_with("radius", &json!(2.5)));

        mock.reset();
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_failure_and_panic() {
        let failing = MockAction::new("Fails").with_failure("disk full");
        let result = run(&failing.action_type(), Value::Null);
        assert_eq!(result.error(), Some("disk full"));

        let panicking = MockAction::new("Panics").with_panic("boom");
        let result = run(&panicking.action_type(), Value::Null);
        assert!(result.is_failure());
        assert!(result.error().unwrap().contains("boom"));
        assert_eq!(panicking.call_count(), 1);
    }
}
