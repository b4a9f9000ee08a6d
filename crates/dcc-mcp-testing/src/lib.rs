//! # DCC-MCP Testing
//!
//! Test utilities for the DCC-MCP action runtime.
//!
//! ## Components
//!
//! - **Mock Actions**: action types with a predictable outcome and call history
//! - **Recorders**: event subscribers and middleware that record what they see
//! - **In-memory Loader**: a module loader serving predefined modules
//! - **Fixtures**: isolated managers and a `CreateSphere` action
//!
//! ## Usage
//!
//! ```rust
//! use dcc_mcp_testing::{MockAction, RecordingSubscriber, isolated_manager};
//! use serde_json::json;
//!
//! let manager = isolated_manager("maya");
//! let mock = MockAction::new("Ping").with_target_system("maya");
//! manager.registry().register(mock.action_type()).unwrap();
//!
//! let events = RecordingSubscriber::new();
//! events.attach(manager.event_bus(), "action.after_execute.Ping");
//!
//! let result = manager.call_action("Ping", json!({"value": 1}));
//! assert!(result.is_success());
//! assert_eq!(mock.call_count(), 1);
//! assert_eq!(events.count("action.after_execute.Ping"), 1);
//! ```

/// Ready-made managers and action types
pub mod fixtures;
/// In-memory module loader
pub mod loader;
/// Mock actions for predictable testing
pub mod mock_actions;
/// Event and middleware recorders
pub mod recording;
/// Test tracing initialization
pub mod tracing_init;

pub use fixtures::{isolated_config, isolated_manager, sphere_action};
pub use loader::{InMemoryModuleLoader, LoadRecord};
pub use mock_actions::{MockAction, MockBehavior};
pub use recording::{RecordingMiddleware, RecordingSubscriber};
pub use tracing_init::init_test_tracing;
