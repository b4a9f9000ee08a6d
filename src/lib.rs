//! # DCC-MCP
//!
//! Action execution runtime for digital content creation (DCC) tools.
//!
//! Actions are named, schema-validated units of work registered per target
//! system (`maya`, `houdini`, ...). An [`ActionManager`] resolves an action,
//! validates its parameters, runs it through a middleware pipeline, publishes
//! lifecycle events and always answers with an [`ActionResult`].
//!
//! ```rust
//! use dcc_mcp::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let config = ManagerConfig::builder()
//!     .registry(Arc::new(ActionRegistry::new()))
//!     .event_bus(Arc::new(EventBus::new()))
//!     .auto_refresh(false)
//!     .build();
//! let manager = ActionManager::new("maya", "default", config).unwrap();
//!
//! let sphere = ActionType::builder("CreateSphere")
//!     .target_system("maya")
//!     .input(InputField::optional("radius", FieldKind::Float, json!(1.0)))
//!     .execute_fn(|input, _| ActionOutput::value(json!({"radius": input.get_f64("radius")})))
//!     .build();
//! manager.registry().register(sphere).unwrap();
//!
//! let result = manager.call_action("CreateSphere", json!({"radius": 2.0}));
//! assert!(result.is_success());
//! assert_eq!(result.context()["radius"], json!(2.0));
//! ```

pub use dcc_mcp_actions::{
    ActionAdapter, ActionManager, ActionRegistry, EventBus, ManagerConfig, Middleware,
    MiddlewareChain, get_action_manager,
};
pub use dcc_mcp_core::{Action, ActionResult, ActionType};

/// Common imports for defining and calling actions.
pub mod prelude {
    pub use dcc_mcp_actions::{
        ActionAdapter, ActionManager, ActionRegistry, Event, EventBus, LoggingMiddleware,
        ManagerConfig, Middleware, MiddlewareChain, Next, PerformanceMiddleware,
        create_action_manager, get_action_manager,
    };
    pub use dcc_mcp_core::{
        Action, ActionContext, ActionError, ActionInput, ActionInstance, ActionOutput,
        ActionResult, ActionType, ContextMap, Dependencies, FieldKind, InputField, InputSchema,
    };
}
