//! Shared validation utilities for identifiers across the codebase
//!
//! Action names, target-system ids and context keys all go through the same
//! rule table so the registry and the manager agree on what a valid name is.

use thiserror::Error;

/// Validation rules for string identifiers
#[derive(Debug, Clone, Copy)]
pub struct IdentifierRules {
    /// Maximum allowed length in characters
    pub max_length: usize,
    /// Whether to allow dots (.) in the identifier
    pub allow_dots: bool,
    /// Whether to allow colons (:) in the identifier
    pub allow_colons: bool,
    /// Whether to check for path traversal sequences (../ and ./)
    pub check_path_traversal: bool,
    /// Whether to trim whitespace before validation
    pub trim_whitespace: bool,
}

impl IdentifierRules {
    /// Rules for action names
    ///
    /// - Max length: 128 characters
    /// - Allows: alphanumeric, `_`, `-`, `.`
    /// - Disallows: `:` (reserved for the manager cache key), `/`, spaces
    /// - Checks for path traversal
    pub const ACTION_NAME: Self = Self {
        max_length: 128,
        allow_dots: true,
        allow_colons: false,
        check_path_traversal: true,
        trim_whitespace: false,
    };

    /// Rules for target-system ids (`maya`, `houdini`, `blender-4`)
    ///
    /// - Max length: 64 characters
    /// - Allows: alphanumeric, `_`, `-`
    pub const TARGET_SYSTEM: Self = Self {
        max_length: 64,
        allow_dots: false,
        allow_colons: false,
        check_path_traversal: true,
        trim_whitespace: true,
    };

    /// Rules for manager names
    pub const MANAGER_NAME: Self = Self {
        max_length: 64,
        allow_dots: true,
        allow_colons: false,
        check_path_traversal: true,
        trim_whitespace: true,
    };

    /// Validate a string against these rules
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The validated string (trimmed if trim_whitespace is true)
    /// * `Err(IdentifierError)` - Description of validation failure
    pub fn validate(&self, input: &str) -> Result<String, IdentifierError> {
        let processed = if self.trim_whitespace {
            input.trim()
        } else {
            input
        };

        if processed.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if !self.trim_whitespace && input.trim().is_empty() {
            return Err(IdentifierError::WhitespaceOnly);
        }

        if !self.trim_whitespace && input != input.trim() {
            return Err(IdentifierError::LeadingTrailingWhitespace);
        }

        if processed.len() > self.max_length {
            return Err(IdentifierError::TooLong {
                length: processed.len(),
                max: self.max_length,
            });
        }

        if self.check_path_traversal && (processed.contains("../") || processed.contains("./")) {
            return Err(IdentifierError::PathTraversal);
        }

        for ch in processed.chars() {
            let is_valid = ch.is_alphanumeric()
                || ch == '_'
                || ch == '-'
                || (ch == '.' && self.allow_dots)
                || (ch == ':' && self.allow_colons);

            if !is_valid {
                return Err(IdentifierError::InvalidChar {
                    char: ch,
                    input: processed.to_string(),
                });
            }
        }

        Ok(processed.to_string())
    }
}

/// Errors that can occur during identifier validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identifier is empty
    #[error("Identifier cannot be empty")]
    Empty,
    /// Identifier contains only whitespace
    #[error("Identifier cannot be whitespace-only")]
    WhitespaceOnly,
    /// Identifier has leading or trailing whitespace
    #[error("Identifier cannot have leading or trailing whitespace")]
    LeadingTrailingWhitespace,
    /// Identifier exceeds maximum allowed length
    #[error("Identifier too long: {length} characters (max {max})")]
    TooLong {
        /// Actual length
        length: usize,
        /// Maximum allowed length
        max: usize,
    },
    /// Identifier contains an invalid character
    #[error("Identifier '{input}' contains invalid character '{char}'")]
    InvalidChar {
        /// The invalid character
        char: char,
        /// The full input string
        input: String,
    },
    /// Identifier contains path traversal sequences
    #[error("Identifier cannot contain path traversal sequences (../)")]
    PathTraversal,
}
