//! Association between the running request and its session.
//!
//! Callers only see [`SessionBinding`]; the lifecycle layer additionally needs
//! [`ScopedBinding`] to open a fresh context per request. The default strategy
//! is [`TaskLocalBinding`], which keys the slot by tokio task scope.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::store::SessionStore;
use crate::error::BindingError;

/// The per-request cell holding the bound session, if any.
///
/// Cloning shares the cell, which lets the teardown guard clear the slot
/// without going back through the task-local key.
#[derive(Debug, Clone, Default)]
pub struct ContextSlot {
    session: Arc<Mutex<Option<SessionStore>>>,
}

impl ContextSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<SessionStore> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, session: SessionStore) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub fn take(&self) -> Option<SessionStore> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Bound session, creating and binding one first if the slot is empty.
    pub fn get_or_create(&self) -> SessionStore {
        let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .get_or_insert_with(|| {
                debug!(name: "uow.session.created", "session bound to request context");
                SessionStore::new()
            })
            .clone()
    }
}

/// Get/set access to the session of the calling request context.
pub trait SessionBinding: Send + Sync + fmt::Debug {
    /// The session bound to the calling context, or `None` if nothing has been
    /// recorded yet. Never returns another context's session.
    fn get_current(&self) -> Result<Option<SessionStore>, BindingError>;

    /// Bind `session` to the calling context, replacing its previous binding.
    fn set_current(&self, session: SessionStore) -> Result<(), BindingError>;

    /// Unbind and return the calling context's session.
    fn clear_current(&self) -> Result<Option<SessionStore>, BindingError>;

    /// The bound session, lazily creating one on first use.
    fn get_or_create_current_session(&self) -> Result<SessionStore, BindingError> {
        if let Some(session) = self.get_current()? {
            return Ok(session);
        }
        let session = SessionStore::new();
        self.set_current(session.clone())?;
        debug!(name: "uow.session.created", "session bound to request context");
        Ok(session)
    }
}

/// A binding that can open a request context around a future.
pub trait ScopedBinding: SessionBinding + Clone + 'static {
    /// Run `fut` with `slot` as the current context.
    fn scope<F>(self, slot: ContextSlot, fut: F) -> impl Future<Output = F::Output> + Send
    where
        F: Future + Send,
        F::Output: Send;
}

tokio::task_local! {
    static CURRENT_SLOT: ContextSlot;
}

/// Binding keyed by tokio task-local scope.
///
/// Each request runs inside its own scope, so concurrently served requests
/// never observe each other's slot, even when they share a worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalBinding;

impl TaskLocalBinding {
    fn with_slot<R>(f: impl FnOnce(&ContextSlot) -> R) -> Result<R, BindingError> {
        CURRENT_SLOT
            .try_with(f)
            .map_err(|_unbound| BindingError::OutsideContext)
    }
}

impl SessionBinding for TaskLocalBinding {
    fn get_current(&self) -> Result<Option<SessionStore>, BindingError> {
        Self::with_slot(ContextSlot::get)
    }

    fn set_current(&self, session: SessionStore) -> Result<(), BindingError> {
        Self::with_slot(|slot| slot.set(session))
    }

    fn clear_current(&self) -> Result<Option<SessionStore>, BindingError> {
        Self::with_slot(ContextSlot::take)
    }

    fn get_or_create_current_session(&self) -> Result<SessionStore, BindingError> {
        Self::with_slot(ContextSlot::get_or_create)
    }
}

impl ScopedBinding for TaskLocalBinding {
    fn scope<F>(self, slot: ContextSlot, fut: F) -> impl Future<Output = F::Output> + Send
    where
        F: Future + Send,
        F::Output: Send,
    {
        CURRENT_SLOT.scope(slot, fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Model, Mutation};
    use serde::Serialize;
    use std::sync::Arc;

    #[derive(Debug, Serialize)]
    struct Row(u32);

    impl Model for Row {
        const KIND: &'static str = "rows";

        fn key(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_outside_context_fails_loudly() {
        let binding = TaskLocalBinding;
        assert_eq!(binding.get_current().unwrap_err(), BindingError::OutsideContext);
        assert_eq!(
            binding.set_current(SessionStore::new()).unwrap_err(),
            BindingError::OutsideContext
        );
        assert!(binding.get_or_create_current_session().is_err());
    }

    #[tokio::test]
    async fn test_lazy_creation_within_scope() {
        let binding = TaskLocalBinding;
        binding
            .scope(ContextSlot::new(), async move {
                assert!(binding.get_current().unwrap().is_none());
                let first = binding.get_or_create_current_session().unwrap();
                let second = binding.get_or_create_current_session().unwrap();
                assert!(first.same_session(&second));
            })
            .await;
    }

    #[tokio::test]
    async fn test_set_and_clear_only_touch_own_context() {
        let binding = TaskLocalBinding;
        let slot = ContextSlot::new();
        let replacement = SessionStore::new();
        let check = replacement.clone();
        binding
            .scope(slot.clone(), async move {
                binding.get_or_create_current_session().unwrap();
                binding.set_current(replacement).unwrap();
                let current = binding.get_current().unwrap().unwrap();
                assert!(current.same_session(&check));
                assert!(binding.clear_current().unwrap().is_some());
                assert!(binding.get_current().unwrap().is_none());
            })
            .await;
        assert!(slot.get().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_contexts_are_isolated() {
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let mut tasks = Vec::new();
        for id in 0..2u32 {
            let barrier = barrier.clone();
            tasks.push(tokio::spawn(TaskLocalBinding.scope(
                ContextSlot::new(),
                async move {
                    let binding = TaskLocalBinding;
                    let session = binding.get_or_create_current_session().unwrap();
                    session.record(Mutation::create(Arc::new(Row(id))));
                    // Both contexts are live with a bound session here.
                    barrier.wait().await;
                    let current = binding.get_current().unwrap().unwrap();
                    assert!(current.same_session(&session));
                    let pending = current.pending();
                    assert_eq!(pending.len(), 1);
                    assert_eq!(pending[0].entity().key(), id.to_string());
                },
            )));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }
}
