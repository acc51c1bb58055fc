//! TypedRegistry - Handler の登録と管理
//!
//! task_type → `Arc<dyn DynHandler>`。登録時に `TypedHandler` で包む。

use std::collections::BTreeMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::{Task, TaskDescriptor};

/// TypedRegistry は型付き Handler を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<Shout, _>(ShoutHandler)?;
///
/// let handler = registry.get("demo.shout.v1");
/// ```
#[derive(Default)]
pub struct TypedRegistry {
    handlers: BTreeMap<String, Arc<dyn DynHandler>>,
}

/// RegistryError は TypedRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for task type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let task_type = T::TYPE.to_string();
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        self.handlers
            .insert(task_type, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// task_type の昇順
    pub fn registered_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn descriptors(&self) -> Vec<TaskDescriptor> {
        self.handlers
            .values()
            .map(|h| h.descriptor().clone())
            .collect()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn DynHandler>> {
        self.handlers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::handler::fixtures::{ExplodeHandler, ShoutHandler, TickHandler};
    use crate::typed::task::fixtures::{Explode, Shout, Tick};

    #[test]
    fn register_and_get() {
        let mut registry = TypedRegistry::new();
        registry.register::<Shout, _>(ShoutHandler).unwrap();

        let handler = registry.get(Shout::TYPE).unwrap();
        assert_eq!(handler.descriptor().task_type.as_str(), Shout::TYPE);
        assert!(registry.get(Explode::TYPE).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = TypedRegistry::new();
        registry.register::<Shout, _>(ShoutHandler).unwrap();
        let result = registry.register::<Shout, _>(ShoutHandler);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(t)) if t == Shout::TYPE));
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = TypedRegistry::new();
        registry.register::<Tick, _>(TickHandler).unwrap();
        registry.register::<Explode, _>(ExplodeHandler).unwrap();
        registry.register::<Shout, _>(ShoutHandler).unwrap();

        assert_eq!(
            registry.registered_types(),
            vec![
                Explode::TYPE.to_string(),
                Shout::TYPE.to_string(),
                Tick::TYPE.to_string()
            ]
        );
        assert_eq!(registry.len(), 3);
        assert!(registry.descriptors().iter().any(|d| d.scheduled));
    }
}
