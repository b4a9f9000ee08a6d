//! # DCC-MCP Core
//!
//! Core types for the DCC-MCP action runtime: the [`ActionResult`] wire
//! envelope, the [`Action`] trait and its registered [`ActionType`], the
//! per-call [`ActionInstance`] state machine, input schemas and the
//! validator seam.

pub mod action;
pub mod context;
pub mod error;
pub mod result;
pub mod schema;
pub mod validation;

pub use action::{
    Action, ActionDescriptor, ActionInfo, ActionInstance, ActionOutput, ActionState, ActionType,
    ActionTypeBuilder,
};
pub use context::{ActionContext, ContextMap, Dependencies, merge_context};
pub use error::{ActionError, RegistrationError, ValidationError};
pub use result::{ActionResult, ResultShapeError, TRACEBACK_KEY};
pub use schema::{
    ActionInput, FieldKind, InputField, InputSchema, InputValidator, SchemaValidator,
    params_to_map,
};
pub use validation::{IdentifierError, IdentifierRules};
