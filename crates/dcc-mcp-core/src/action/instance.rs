use super::kind::ActionType;
use super::{Action, ActionOutput};
use crate::context::{ActionContext, ContextMap};
use crate::error::{ActionError, ValidationError};
use crate::result::ActionResult;
use crate::schema::{ActionInput, params_to_map};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, warn};

/// Lifecycle of a single action call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Created,
    InputValidated,
    /// Terminal: the hook ran and produced a result.
    Executed,
    /// Terminal: the hook ran and failed.
    Failed,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionState::Executed | ActionState::Failed)
    }
}

/// Per-call action object, exclusively owned by the call that created it.
pub struct ActionInstance {
    action_type: ActionType,
    action: Box<dyn Action>,
    context: ActionContext,
    input: Option<ActionInput>,
    output: Option<ContextMap>,
    state: ActionState,
    prepared: bool,
}

impl ActionInstance {
    pub(crate) fn new(
        action_type: ActionType,
        action: Box<dyn Action>,
        context: ActionContext,
    ) -> Self {
        Self {
            action_type,
            action,
            context,
            input: None,
            output: None,
            state: ActionState::Created,
            prepared: false,
        }
    }

    pub fn name(&self) -> &str {
        self.action_type.name()
    }

    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn context(&self) -> &ActionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ActionContext {
        &mut self.context
    }

    pub fn input(&self) -> Option<&ActionInput> {
        self.input.as_ref()
    }

    /// Structured output of a successful run.
    pub fn output(&self) -> Option<&ContextMap> {
        self.output.as_ref()
    }

    /// Validate raw parameters and move to `InputValidated`.
    ///
    /// The setup hook runs once, before the first validation. A validation
    /// failure leaves the state untouched and is returned to the caller.
    pub fn setup(&mut self, params: Value) -> Result<(), ValidationError> {
        if self.state.is_terminal() {
            return Err(ValidationError::Custom(format!(
                "action '{}' has already been processed",
                self.name()
            )));
        }
        if !self.prepared {
            self.action.prepare(&mut self.context);
            self.prepared = true;
        }
        let params = params_to_map(params)?;
        let input = self.validate_input(&params)?;
        self.input = Some(input);
        self.state = ActionState::InputValidated;
        Ok(())
    }

    /// Run the type's validator without changing state.
    pub fn validate_input(&self, params: &ContextMap) -> Result<ActionInput, ValidationError> {
        self.action_type
            .validator()
            .validate(self.action_type.input_schema(), params)
            .map(ActionInput::new)
    }

    /// Invoke the execution hook. Never panics and never returns `Err`.
    pub fn process(&mut self) -> ActionResult {
        if let Err(err) = self.check_ready() {
            return self.reject(err);
        }
        let Some(input) = self.input.as_ref() else {
            return self.reject(ActionError::NotSetUp);
        };
        let action = &mut self.action;
        let context = &self.context;
        let outcome = catch_unwind(AssertUnwindSafe(|| action.execute(input, context)))
            .unwrap_or_else(|payload| Err(panic_error(payload)));
        self.finish(outcome)
    }

    /// Async twin of [`ActionInstance::process`].
    pub async fn process_async(&mut self) -> ActionResult {
        if let Err(err) = self.check_ready() {
            return self.reject(err);
        }
        let Some(input) = self.input.as_ref() else {
            return self.reject(ActionError::NotSetUp);
        };
        let outcome = AssertUnwindSafe(self.action.execute_async(input, &self.context))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic_error(payload)));
        self.finish(outcome)
    }

    fn check_ready(&self) -> Result<(), ActionError> {
        match self.state {
            ActionState::InputValidated => Ok(()),
            ActionState::Created => Err(ActionError::NotSetUp),
            ActionState::Executed | ActionState::Failed => Err(ActionError::AlreadyProcessed {
                name: self.name().to_string(),
            }),
        }
    }

    /// Failed result for a call that never reached the hook. State is kept.
    fn reject(&self, err: ActionError) -> ActionResult {
        debug!(action = %self.name(), state = ?self.state, error = %err, "Action not runnable");
        ActionResult::from_error(format!("Failed to execute {}: {}", self.name(), err), &err)
    }

    fn finish(&mut self, outcome: Result<ActionOutput, ActionError>) -> ActionResult {
        let name = self.name().to_string();
        match outcome {
            Ok(ActionOutput::Data { values, prompt }) => {
                self.state = ActionState::Executed;
                self.output = Some(values.clone());
                let mut result =
                    ActionResult::success(format!("Successfully executed {}", name))
                        .with_context(values);
                result.set_prompt(prompt);
                result
            }
            Ok(ActionOutput::Complete(mut result)) => {
                result.default_message(|| format!("Action {} executed successfully", name));
                self.state = if result.is_success() {
                    ActionState::Executed
                } else {
                    ActionState::Failed
                };
                result
            }
            Err(err) => {
                self.state = ActionState::Failed;
                warn!(action = %name, error = %err, code = err.error_code(), "Action execution failed");
                ActionResult::from_error(format!("Failed to execute {}: {}", name, err), &err)
            }
        }
    }
}

impl std::fmt::Debug for ActionInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionInstance")
            .field("name", &self.name())
            .field("state", &self.state)
            .field("input", &self.input)
            .finish()
    }
}

/// Render a caught panic payload as an error.
pub fn panic_error(payload: Box<dyn Any + Send>) -> ActionError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    ActionError::Panicked(message)
}
