//! Errors raised while loading modules, discovering actions and reading
//! configuration.

use dcc_mcp_core::RegistrationError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// A module could not be loaded.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// No package is known under this name.
    #[error("package '{0}' not found")]
    PackageNotFound(String),

    /// The path does not exist.
    #[error("path '{}' does not exist", .0.display())]
    PathNotFound(PathBuf),

    /// Reading the module from disk failed.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A manifest file is not valid.
    #[error("invalid manifest '{}': {source}", path.display())]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl LoadError {
    pub fn error_code(&self) -> &'static str {
        match self {
            LoadError::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            LoadError::PathNotFound(_) => "PATH_NOT_FOUND",
            LoadError::Io { .. } => "IO_ERROR",
            LoadError::InvalidManifest { .. } => "INVALID_MANIFEST",
        }
    }
}

/// A single discovery candidate could not be turned into a registered type.
///
/// Logged and skipped by the registry; never aborts a discovery batch.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A manifest entry names a handler nobody provided.
    #[error("unknown handler '{handler}' for action '{action}'")]
    UnknownHandler { action: String, handler: String },

    /// The candidate is malformed.
    #[error("invalid action candidate '{name}': {reason}")]
    InvalidCandidate { name: String, reason: String },

    /// The candidate failed registration.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// One file of a multi-file module could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl DiscoveryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DiscoveryError::UnknownHandler { .. } => "UNKNOWN_HANDLER",
            DiscoveryError::InvalidCandidate { .. } => "INVALID_CANDIDATE",
            DiscoveryError::Registration(err) => err.error_code(),
            DiscoveryError::Load(err) => err.error_code(),
        }
    }
}

/// Manager configuration could not be read from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("invalid value for {key}: {message}")]
    InvalidEnvVar { key: String, message: String },

    /// An identifier in the configuration breaks the naming rules.
    #[error("invalid {field} '{value}': {message}")]
    InvalidIdentifier {
        field: &'static str,
        value: String,
        message: String,
    },
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::InvalidEnvVar { .. } => "INVALID_ENV_VAR",
            ConfigError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcc_mcp_core::IdentifierError;

    #[test]
    fn test_discovery_error_codes_delegate() {
        let err: DiscoveryError = RegistrationError::InvalidName {
            name: String::new(),
            source: IdentifierError::Empty,
        }
        .into();
        assert_eq!(err.error_code(), "INVALID_ACTION_NAME");

        let err: DiscoveryError = LoadError::PackageNotFound("maya_tools".into()).into();
        assert_eq!(err.error_code(), "PACKAGE_NOT_FOUND");
        assert_eq!(err.to_string(), "package 'maya_tools' not found");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidEnvVar {
            key: "DCC_MCP_REFRESH_INTERVAL".into(),
            message: "expected duration".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for DCC_MCP_REFRESH_INTERVAL: expected duration"
        );
    }
}
