use super::descriptor::{ActionDescriptor, ActionInfo};
use super::instance::ActionInstance;
use super::{Action, ActionOutput};
use crate::context::ActionContext;
use crate::error::{ActionError, RegistrationError};
use crate::schema::{ActionInput, InputField, InputSchema, InputValidator, SchemaValidator};
use crate::validation::IdentifierRules;
use std::fmt;
use std::sync::Arc;

type ActionFactory = Arc<dyn Fn() -> Box<dyn Action> + Send + Sync>;
type ExecuteFn =
    dyn Fn(&ActionInput, &ActionContext) -> Result<ActionOutput, ActionError> + Send + Sync;

struct ActionTypeInner {
    descriptor: ActionDescriptor,
    input_schema: InputSchema,
    validator: Arc<dyn InputValidator>,
    factory: Option<ActionFactory>,
}

/// A registered action definition.
///
/// Cheap to clone. Two handles are the same type when they share the same
/// allocation (see [`ActionType::same_type`]). A type built without a handler
/// has no execution hook and is refused by the registry.
#[derive(Clone)]
pub struct ActionType {
    inner: Arc<ActionTypeInner>,
}

impl ActionType {
    pub fn builder(name: impl Into<String>) -> ActionTypeBuilder {
        ActionTypeBuilder::new(name)
    }

    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.inner.descriptor
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    pub fn target_system(&self) -> Option<&str> {
        self.inner.descriptor.target_system.as_deref()
    }

    pub fn input_schema(&self) -> &InputSchema {
        &self.inner.input_schema
    }

    pub fn validator(&self) -> &dyn InputValidator {
        self.inner.validator.as_ref()
    }

    pub fn is_abstract(&self) -> bool {
        self.inner.descriptor.is_abstract
    }

    pub fn has_execute_hook(&self) -> bool {
        self.inner.factory.is_some()
    }

    /// Pointer identity.
    pub fn same_type(&self, other: &ActionType) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Derived type with the given target system. Produces a new identity.
    pub fn with_target_system(&self, target_system: impl Into<String>) -> ActionType {
        let target_system = target_system.into();
        self.derive_with(|descriptor| descriptor.target_system = Some(target_system))
    }

    /// Derived type recording where it was discovered. Produces a new identity.
    pub fn with_source(&self, source: impl Into<String>) -> ActionType {
        let source = source.into();
        self.derive_with(|descriptor| descriptor.source = Some(source))
    }

    /// Derived type with an edited descriptor, sharing schema, validator and
    /// handler. Produces a new identity.
    pub fn derive_with(&self, edit: impl FnOnce(&mut ActionDescriptor)) -> ActionType {
        let mut descriptor = self.inner.descriptor.clone();
        edit(&mut descriptor);
        ActionType {
            inner: Arc::new(ActionTypeInner {
                descriptor,
                input_schema: self.inner.input_schema.clone(),
                validator: Arc::clone(&self.inner.validator),
                factory: self.inner.factory.clone(),
            }),
        }
    }

    /// Check the descriptor against the identifier rules.
    pub fn check_conformance(&self) -> Result<(), RegistrationError> {
        let name = self.name();
        IdentifierRules::ACTION_NAME
            .validate(name)
            .map_err(|source| RegistrationError::InvalidName {
                name: name.to_string(),
                source,
            })?;
        if let Some(target_system) = self.target_system() {
            IdentifierRules::TARGET_SYSTEM
                .validate(target_system)
                .map_err(|source| RegistrationError::InvalidTargetSystem {
                    name: name.to_string(),
                    target_system: target_system.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Create a per-call instance holding `context`.
    pub fn instantiate(&self, context: ActionContext) -> Result<ActionInstance, RegistrationError> {
        let factory = self
            .inner
            .factory
            .as_ref()
            .ok_or_else(|| RegistrationError::MissingExecuteHook {
                name: self.name().to_string(),
            })?;
        Ok(ActionInstance::new(self.clone(), factory(), context))
    }

    /// Read-only listing record.
    pub fn info(&self) -> ActionInfo {
        let descriptor = &self.inner.descriptor;
        ActionInfo {
            name: descriptor.name.clone(),
            internal_name: descriptor.qualified_name(),
            description: descriptor.description.clone(),
            category: descriptor.category.clone(),
            tags: descriptor.tags.iter().cloned().collect(),
            target_system: descriptor.target_system.clone(),
            version: descriptor.version.clone(),
            author: descriptor.author.clone(),
            dependencies: descriptor.dependencies.clone(),
            source: descriptor.source.clone(),
            input_schema: self.inner.input_schema.to_json_schema("InputModel"),
        }
    }
}

impl fmt::Debug for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionType")
            .field("name", &self.name())
            .field("target_system", &self.target_system())
            .field("has_execute_hook", &self.has_execute_hook())
            .field("is_abstract", &self.is_abstract())
            .finish()
    }
}

/// Builder for [`ActionType`].
pub struct ActionTypeBuilder {
    descriptor: ActionDescriptor,
    input_schema: InputSchema,
    validator: Arc<dyn InputValidator>,
    factory: Option<ActionFactory>,
}

impl ActionTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: ActionDescriptor::new(name),
            input_schema: InputSchema::new(),
            validator: Arc::new(SchemaValidator),
            factory: None,
        }
    }

    pub fn target_system(mut self, target_system: impl Into<String>) -> Self {
        self.descriptor.target_system = Some(target_system.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.descriptor.category = category.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.descriptor.tags.insert(tag.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.descriptor.version = version.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.descriptor.author = Some(author.into());
        self
    }

    pub fn dependency(mut self, name: impl Into<String>) -> Self {
        self.descriptor.dependencies.push(name.into());
        self
    }

    /// Add an input field.
    pub fn input(mut self, field: InputField) -> Self {
        self.input_schema = self.input_schema.field(field);
        self
    }

    /// Replace the whole input schema.
    pub fn schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }

    /// Use a custom input validator instead of [`SchemaValidator`].
    pub fn validator(mut self, validator: Arc<dyn InputValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Mark the type abstract. Abstract types are never registered.
    pub fn abstract_type(mut self) -> Self {
        self.descriptor.is_abstract = true;
        self
    }

    /// Provide the execution hook as a factory of fresh action values.
    pub fn handler<A, F>(mut self, factory: F) -> Self
    where
        A: Action + 'static,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move || Box::new(factory()) as Box<dyn Action>));
        self
    }

    /// Provide the execution hook as a plain function.
    pub fn execute_fn<F>(self, function: F) -> Self
    where
        F: Fn(&ActionInput, &ActionContext) -> Result<ActionOutput, ActionError>
            + Send
            + Sync
            + 'static,
    {
        let function: Arc<ExecuteFn> = Arc::new(function);
        self.handler(move || FnAction {
            function: Arc::clone(&function),
        })
    }

    pub fn build(self) -> ActionType {
        ActionType {
            inner: Arc::new(ActionTypeInner {
                descriptor: self.descriptor,
                input_schema: self.input_schema,
                validator: self.validator,
                factory: self.factory,
            }),
        }
    }
}

/// Action backed by a closure.
struct FnAction {
    function: Arc<ExecuteFn>,
}

impl Action for FnAction {
    fn execute(
        &mut self,
        input: &ActionInput,
        context: &ActionContext,
    ) -> Result<ActionOutput, ActionError> {
        (self.function)(input, context)
    }
}
