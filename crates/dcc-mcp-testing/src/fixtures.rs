//! Ready-made managers and action types.

use dcc_mcp_actions::{ActionManager, ActionRegistry, EventBus, ManagerConfig, ManagerConfigBuilder};
use dcc_mcp_core::{ActionOutput, ActionType, FieldKind, InputField};
use serde_json::json;
use std::sync::Arc;

/// Config builder with a private registry and event bus and auto-refresh
/// disabled, so tests do not share state through the process-wide ones.
pub fn isolated_config() -> ManagerConfigBuilder {
    ManagerConfig::builder()
        .registry(Arc::new(ActionRegistry::new()))
        .event_bus(Arc::new(EventBus::new()))
        .auto_refresh(false)
}

/// Manager named `test` over [`isolated_config`].
pub fn isolated_manager(target_system: &str) -> Arc<ActionManager> {
    match ActionManager::new(target_system, "test", isolated_config().build()) {
        Ok(manager) => Arc::new(manager),
        Err(e) => panic!("invalid fixture target system '{target_system}': {e}"),
    }
}

/// `CreateSphere` for `target_system`, taking `radius: float = 1.0` and
/// echoing it back.
pub fn sphere_action(target_system: &str) -> ActionType {
    ActionType::builder("CreateSphere")
        .target_system(target_system)
        .description("Create a polygon sphere")
        .category("geometry")
        .tag("geometry")
        .input(
            InputField::optional("radius", FieldKind::Float, json!(1.0))
                .with_description("Sphere radius"),
        )
        .execute_fn(|input, _| {
            ActionOutput::value(json!({
                "radius": input.get_f64("radius"),
                "name": "pSphere1",
            }))
        })
        .build()
}
