//! The action abstraction: a named, schema-validated unit of work.
//!
//! Three layers:
//!
//! - [`Action`] is the capability set a concrete action implements: one
//!   execution hook, an optional async variant and an optional setup hook.
//! - [`ActionType`] is the registered definition: descriptor, input schema
//!   and a factory producing fresh `Action` values.
//! - [`ActionInstance`] is the per-call object driving the
//!   `Created -> InputValidated -> Executed | Failed` state machine.

mod descriptor;
mod instance;
mod kind;

pub use descriptor::{ActionDescriptor, ActionInfo, DEFAULT_VERSION};
pub use instance::{ActionInstance, ActionState, panic_error};
pub use kind::{ActionType, ActionTypeBuilder};

use crate::context::{ActionContext, ContextMap};
use crate::error::ActionError;
use crate::result::ActionResult;
use crate::schema::ActionInput;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Trait implemented by concrete actions.
///
/// A fresh value is created for every call, so implementations may keep
/// per-call state in `self`.
///
/// # Example
///
/// ```rust,ignore
/// use dcc_mcp_core::action::{Action, ActionOutput};
/// use dcc_mcp_core::{ActionContext, ActionError, ActionInput};
///
/// #[derive(Default)]
/// struct CreateSphere;
///
/// impl Action for CreateSphere {
///     fn execute(
///         &mut self,
///         input: &ActionInput,
///         _context: &ActionContext,
///     ) -> Result<ActionOutput, ActionError> {
///         let radius = input.get_f64("radius").unwrap_or(1.0);
///         ActionOutput::value(serde_json::json!({ "radius": radius }))
///     }
/// }
/// ```
#[async_trait]
pub trait Action: Send {
    /// Instance-setup hook, called once before input validation.
    ///
    /// May add values to the instance context.
    fn prepare(&mut self, _context: &mut ActionContext) {}

    /// Execution hook.
    ///
    /// Errors are caught by the instance and turned into a failed
    /// `ActionResult`; they never reach the caller as `Err`.
    fn execute(
        &mut self,
        input: &ActionInput,
        context: &ActionContext,
    ) -> Result<ActionOutput, ActionError>;

    /// Async variant of the execution hook. Defaults to [`Action::execute`].
    async fn execute_async(
        &mut self,
        input: &ActionInput,
        context: &ActionContext,
    ) -> Result<ActionOutput, ActionError> {
        self.execute(input, context)
    }
}

/// What an execution hook produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// Structured output, wrapped into the result context on success.
    Data {
        values: ContextMap,
        prompt: Option<String>,
    },
    /// A finished result, passed through as-is (an empty message is defaulted).
    Complete(ActionResult),
}

impl ActionOutput {
    pub fn data(values: ContextMap) -> Self {
        ActionOutput::Data {
            values,
            prompt: None,
        }
    }

    /// Output with no values.
    pub fn empty() -> Self {
        Self::data(ContextMap::new())
    }

    /// Build from a JSON object. Any other JSON type is an error.
    pub fn value(value: Value) -> Result<Self, ActionError> {
        match value {
            Value::Object(values) => Ok(Self::data(values)),
            other => Err(ActionError::msg(format!(
                "action output must be a JSON object, got {}",
                crate::schema::json_type_name(&other)
            ))),
        }
    }

    /// Build from any serializable output struct.
    pub fn serialize<T: Serialize>(output: &T) -> Result<Self, ActionError> {
        Self::value(serde_json::to_value(output)?)
    }

    /// Attach a follow-up prompt. No-op on `Complete`.
    pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
        match self {
            ActionOutput::Data { values, .. } => ActionOutput::Data {
                values,
                prompt: Some(prompt.into()),
            },
            complete => complete,
        }
    }
}

impl From<ActionResult> for ActionOutput {
    fn from(result: ActionResult) -> Self {
        ActionOutput::Complete(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_from_object() {
        let output = ActionOutput::value(json!({"radius": 2.0}))
            .unwrap()
            .with_prompt("select it");
        match output {
            ActionOutput::Data { values, prompt } => {
                assert_eq!(values["radius"], json!(2.0));
                assert_eq!(prompt.as_deref(), Some("select it"));
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_output_rejects_non_object() {
        assert!(ActionOutput::value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_output_serialize_struct() {
        #[derive(Serialize)]
        struct Out {
            name: &'static str,
        }
        let output = ActionOutput::serialize(&Out { name: "pSphere1" }).unwrap();
        assert_eq!(
            output,
            ActionOutput::data(json!({"name": "pSphere1"}).as_object().cloned().unwrap())
        );
    }
}
