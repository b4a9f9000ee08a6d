//! # Error Types
//!
//! Domain errors for the action runtime. Call-facing operations never
//! surface these directly: the manager folds them into an
//! [`ActionResult`](crate::ActionResult). They are returned as `Err` only by
//! developer-time operations (registration, direct `setup()` calls).

use crate::validation::IdentifierError;
use thiserror::Error;

/// Input failed the declared schema of an action.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Parameters were not a JSON object.
    #[error("parameters must be a JSON object, got {found}")]
    NotAnObject {
        /// JSON type that was supplied instead
        found: String,
    },

    /// A required field was absent.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Field name
        field: String,
    },

    /// A field had the wrong JSON type.
    #[error("field '{field}' expected {expected}, got {found}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Expected kind
        expected: String,
        /// Supplied JSON type
        found: String,
    },

    /// A field value is outside its declared set of choices.
    #[error("field '{field}' must be one of {allowed}, got {found}")]
    NotAllowed {
        /// Field name
        field: String,
        /// Rendered list of allowed values
        allowed: String,
        /// Rendered supplied value
        found: String,
    },

    /// Validator-specific failure.
    #[error("{0}")]
    Custom(String),

    /// Several independent failures found in one pass.
    #[error("{}", join_errors(.0))]
    Multiple(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Collapse a list of failures: one error stays as-is, several become `Multiple`.
    pub fn from_many(mut errors: Vec<ValidationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ValidationError::Multiple(errors)),
        }
    }

    /// Stable code for logs and result context.
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::NotAnObject { .. } => "NOT_AN_OBJECT",
            ValidationError::MissingField { .. } => "MISSING_FIELD",
            ValidationError::TypeMismatch { .. } => "TYPE_MISMATCH",
            ValidationError::NotAllowed { .. } => "NOT_ALLOWED",
            ValidationError::Custom(_) => "VALIDATION_FAILED",
            ValidationError::Multiple(_) => "MULTIPLE_VALIDATION_ERRORS",
        }
    }
}

/// Failure raised from inside an action's execution hook.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Plain failure message.
    #[error("{0}")]
    Failed(String),

    /// `process()` was called before `setup()` succeeded.
    #[error("action input has not been validated, call setup() before process()")]
    NotSetUp,

    /// `process()` was called on an instance that already ran.
    #[error("action '{name}' has already been processed")]
    AlreadyProcessed {
        /// Action name
        name: String,
    },

    /// The definition carries no execution hook.
    #[error("action '{name}' does not implement an execution hook")]
    NotImplemented {
        /// Action name
        name: String,
    },

    /// A named dependency was not injected or has another type.
    #[error("missing dependency '{0}'")]
    MissingDependency(String),

    /// Input rejected while executing (late checks inside the hook).
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The hook panicked; payload rendered as text.
    #[error("action panicked: {0}")]
    Panicked(String),

    /// Any other error bubbled up by the hook.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ActionError {
    /// Build a plain failure from any message.
    pub fn msg(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }

    /// Wrap an arbitrary error.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ActionError::Other(Box::new(err))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ActionError::Failed(_) => "EXECUTION_FAILED",
            ActionError::NotSetUp => "NOT_SET_UP",
            ActionError::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            ActionError::NotImplemented { .. } => "NOT_IMPLEMENTED",
            ActionError::MissingDependency(_) => "MISSING_DEPENDENCY",
            ActionError::Validation(_) => "VALIDATION_ERROR",
            ActionError::Panicked(_) => "PANICKED",
            ActionError::Other(_) => "EXECUTION_FAILED",
        }
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        ActionError::other(err)
    }
}

/// A type handed to the registry does not conform to the action contract.
///
/// This is a developer-time bug and is never converted to an `ActionResult`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// The declared action name breaks the identifier rules.
    #[error("invalid action name '{name}': {source}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Rule that was broken
        #[source]
        source: IdentifierError,
    },

    /// The declared target system breaks the identifier rules.
    #[error("invalid target system '{target_system}' on action '{name}': {source}")]
    InvalidTargetSystem {
        /// Action name
        name: String,
        /// Offending target-system id
        target_system: String,
        /// Rule that was broken
        #[source]
        source: IdentifierError,
    },

    /// An instance was requested from a type without an execution hook.
    #[error("action '{name}' cannot be instantiated: no execution hook")]
    MissingExecuteHook {
        /// Action name
        name: String,
    },
}

impl RegistrationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistrationError::InvalidName { .. } => "INVALID_ACTION_NAME",
            RegistrationError::InvalidTargetSystem { .. } => "INVALID_TARGET_SYSTEM",
            RegistrationError::MissingExecuteHook { .. } => "MISSING_EXECUTE_HOOK",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::MissingField {
            field: "radius".to_string(),
        };
        assert_eq!(err.to_string(), "missing required field 'radius'");
    }

    #[test]
    fn test_from_many_collapses() {
        assert!(ValidationError::from_many(vec![]).is_none());

        let single = ValidationError::from_many(vec![ValidationError::Custom("x".into())]);
        assert_eq!(single, Some(ValidationError::Custom("x".into())));

        let many = ValidationError::from_many(vec![
            ValidationError::Custom("a".into()),
            ValidationError::Custom("b".into()),
        ])
        .unwrap();
        assert_eq!(many.to_string(), "a; b");
        assert_eq!(many.error_code(), "MULTIPLE_VALIDATION_ERRORS");
    }

    #[test]
    fn test_action_error_codes() {
        assert_eq!(ActionError::msg("boom").error_code(), "EXECUTION_FAILED");
        assert_eq!(ActionError::NotSetUp.error_code(), "NOT_SET_UP");
        let err: ActionError = ValidationError::Custom("bad".into()).into();
        assert_eq!(err.to_string(), "invalid input: bad");
    }

    #[test]
    fn test_registration_error_source() {
        use std::error::Error;

        let err = RegistrationError::InvalidName {
            name: "bad name".to_string(),
            source: IdentifierError::Empty,
        };
        assert!(err.source().is_some());
        assert_eq!(err.error_code(), "INVALID_ACTION_NAME");
    }
}
