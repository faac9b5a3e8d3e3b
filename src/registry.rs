//! Extension registry: the single place that knows which validators,
//! modifiers, directive handlers and issue resolvers exist for a given
//! channel configuration. Registration happens once at process start;
//! lookups happen on every request, so registration failures (duplicate
//! keys) are loud and early rather than silent overwrites discovered at
//! 2am.

use crate::error::{EngineError, IssueResolveError};
use crate::models::{Directive, Session};
use crate::ops::Op;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Stage at which a validator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationStage {
    Draft,
    Commit,
}

/// A validator inspects a session (and, for draft-stage validators, the
/// operation about to be applied) and raises a `ValidationError` to reject
/// it. Validators never mutate anything.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    async fn validate(&self, session: &Session, op: Option<&Op>) -> Result<(), EngineError>;
}

/// A modifier runs after an `Op` has been structurally applied and can
/// derive session state (pricing, flags) from it. Modifiers run in
/// ascending `order`.
#[async_trait]
pub trait Modifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn apply(&self, session: &mut Session) -> Result<(), EngineError>;
}

/// A directive handler executes the side effect named by a directive's
/// topic (`stock.hold`, `payment.capture`, ...).
#[async_trait]
pub trait DirectiveHandler: Send + Sync {
    async fn handle(&self, directive: &Directive) -> Result<(), EngineError>;
}

/// An issue resolver applies a caller-chosen action to an open issue and
/// returns the ops it wants applied to the session, if any.
#[async_trait]
pub trait IssueResolver: Send + Sync {
    async fn resolve(
        &self,
        session: &Session,
        issue_id: &str,
        action_id: &str,
        input: Value,
    ) -> Result<Vec<Op>, IssueResolveError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("a validator named '{0}' is already registered for stage {1:?}")]
    DuplicateValidator(String, ValidationStage),
    #[error("a modifier named '{0}' is already registered")]
    DuplicateModifier(String),
    #[error("a directive handler is already registered for topic '{0}'")]
    DuplicateDirectiveHandler(String),
    #[error("an issue resolver is already registered for source '{0}'")]
    DuplicateIssueResolver(String),
}

struct ModifierEntry {
    order: i32,
    modifier: Arc<dyn Modifier>,
}

/// Process-wide table of registered extensions. Cheap to clone (an `Arc`
/// internally via `DashMap`'s own sharding); built once at startup and
/// shared behind the application state.
#[derive(Default)]
pub struct Registry {
    validators: DashMap<(ValidationStage, &'static str), Arc<dyn Validator>>,
    modifiers: DashMap<&'static str, ModifierEntry>,
    directive_handlers: DashMap<String, Arc<dyn DirectiveHandler>>,
    issue_resolvers: DashMap<String, Arc<dyn IssueResolver>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_validator(
        &self,
        stage: ValidationStage,
        validator: Arc<dyn Validator>,
    ) -> Result<(), RegistryError> {
        let key = (stage, validator.name());
        if self.validators.contains_key(&key) {
            return Err(RegistryError::DuplicateValidator(
                validator.name().to_string(),
                stage,
            ));
        }
        self.validators.insert(key, validator);
        Ok(())
    }

    pub fn register_modifier(&self, order: i32, modifier: Arc<dyn Modifier>) -> Result<(), RegistryError> {
        if self.modifiers.contains_key(modifier.name()) {
            return Err(RegistryError::DuplicateModifier(modifier.name().to_string()));
        }
        self.modifiers.insert(modifier.name(), ModifierEntry { order, modifier });
        Ok(())
    }

    pub fn register_directive_handler(
        &self,
        topic: impl Into<String>,
        handler: Arc<dyn DirectiveHandler>,
    ) -> Result<(), RegistryError> {
        let topic = topic.into();
        if self.directive_handlers.contains_key(&topic) {
            return Err(RegistryError::DuplicateDirectiveHandler(topic));
        }
        self.directive_handlers.insert(topic, handler);
        Ok(())
    }

    pub fn register_issue_resolver(
        &self,
        source: impl Into<String>,
        resolver: Arc<dyn IssueResolver>,
    ) -> Result<(), RegistryError> {
        let source = source.into();
        if self.issue_resolvers.contains_key(&source) {
            return Err(RegistryError::DuplicateIssueResolver(source));
        }
        self.issue_resolvers.insert(source, resolver);
        Ok(())
    }

    pub fn validators_for(&self, stage: ValidationStage) -> Vec<Arc<dyn Validator>> {
        self.validators
            .iter()
            .filter(|e| e.key().0 == stage)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Modifiers in ascending registration order, lowest first.
    pub fn modifiers_ordered(&self) -> Vec<Arc<dyn Modifier>> {
        let mut entries: Vec<(i32, Arc<dyn Modifier>)> = self
            .modifiers
            .iter()
            .map(|e| (e.value().order, e.value().modifier.clone()))
            .collect();
        entries.sort_by_key(|(order, _)| *order);
        entries.into_iter().map(|(_, m)| m).collect()
    }

    pub fn directive_handler(&self, topic: &str) -> Option<Arc<dyn DirectiveHandler>> {
        self.directive_handlers.get(topic).map(|e| e.value().clone())
    }

    pub fn issue_resolver(&self, source: &str) -> Option<Arc<dyn IssueResolver>> {
        self.issue_resolvers.get(source).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopValidator;
    #[async_trait]
    impl Validator for NoopValidator {
        fn name(&self) -> &'static str {
            "noop"
        }
        async fn validate(&self, _session: &Session, _op: Option<&Op>) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[test]
    fn registering_the_same_validator_twice_fails() {
        let registry = Registry::new();
        registry
            .register_validator(ValidationStage::Draft, Arc::new(NoopValidator))
            .unwrap();
        let err = registry.register_validator(ValidationStage::Draft, Arc::new(NoopValidator));
        assert!(matches!(err, Err(RegistryError::DuplicateValidator(_, ValidationStage::Draft))));
    }

    #[test]
    fn same_validator_name_different_stage_is_allowed() {
        let registry = Registry::new();
        registry
            .register_validator(ValidationStage::Draft, Arc::new(NoopValidator))
            .unwrap();
        assert!(registry
            .register_validator(ValidationStage::Commit, Arc::new(NoopValidator))
            .is_ok());
    }

    #[test]
    fn modifiers_come_back_in_ascending_order() {
        struct M(&'static str);
        #[async_trait]
        impl Modifier for M {
            fn name(&self) -> &'static str {
                self.0
            }
            async fn apply(&self, _session: &mut Session) -> Result<(), EngineError> {
                Ok(())
            }
        }
        let registry = Registry::new();
        registry.register_modifier(20, Arc::new(M("second"))).unwrap();
        registry.register_modifier(10, Arc::new(M("first"))).unwrap();
        let names: Vec<&'static str> = registry.modifiers_ordered().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn duplicate_directive_topic_is_rejected() {
        struct H;
        #[async_trait]
        impl DirectiveHandler for H {
            async fn handle(&self, _directive: &Directive) -> Result<(), EngineError> {
                Ok(())
            }
        }
        let registry = Registry::new();
        registry.register_directive_handler("stock.hold", Arc::new(H)).unwrap();
        assert!(registry.register_directive_handler("stock.hold", Arc::new(H)).is_err());
    }
}
