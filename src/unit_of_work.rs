//! The unit-of-work extension object.
//!
//! [`UnitOfWork`] owns the shared storage client and the session binding. It
//! is cheap to clone and is meant to live in router state; handlers use it to
//! record writes against the current request's session.
//!
//! # Example
//!
//! ```rust,ignore
//! let uow = UnitOfWork::from_config(&config.storage).await?;
//! let app = uow.attach(Router::new().route("/foos", post(create_foo)));
//! ```

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::response::{IntoResponse, Response};

use crate::config::StorageConfig;
use crate::entity::{Entity, Mutation};
use crate::error::{BindingError, Error, FlushError, Result};
use crate::lifecycle::unit_of_work_middleware;
use crate::session::{ContextSlot, ScopedBinding, SessionBinding, SessionStore, TaskLocalBinding};
use crate::storage::{self, StorageClient};

type ErrorRenderer = Arc<dyn Fn(FlushError) -> Response + Send + Sync>;

/// Shared handle to storage plus the per-request session binding.
#[derive(Clone)]
pub struct UnitOfWork<B = TaskLocalBinding> {
    client: Arc<dyn StorageClient>,
    binding: B,
    render_flush_error: ErrorRenderer,
}

impl<B: fmt::Debug> fmt::Debug for UnitOfWork<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("client", &self.client)
            .field("binding", &self.binding)
            .finish()
    }
}

impl UnitOfWork<TaskLocalBinding> {
    /// Unit of work over an already configured client, bound per tokio task.
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self {
            client,
            binding: TaskLocalBinding,
            render_flush_error: Arc::new(|err| Error::Flush(err).into_response()),
        }
    }

    /// Configure storage from `config` and build the unit of work.
    ///
    /// Fails before any request is served when the configuration is invalid
    /// or the backend cannot be configured.
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let provider = config.provider()?;
        let setup = config.setup()?;
        let client = storage::connect(&setup, provider).await?;
        Ok(Self::new(client))
    }
}

impl<B: ScopedBinding> UnitOfWork<B> {
    /// Swap the binding strategy.
    pub fn with_binding<B2: ScopedBinding>(self, binding: B2) -> UnitOfWork<B2> {
        UnitOfWork {
            client: self.client,
            binding,
            render_flush_error: self.render_flush_error,
        }
    }

    /// Replace how a failed flush becomes a response. Defaults to the same
    /// response [`Error`] produces for a failing handler.
    #[must_use]
    pub fn with_error_renderer<F>(mut self, render: F) -> Self
    where
        F: Fn(FlushError) -> Response + Send + Sync + 'static,
    {
        self.render_flush_error = Arc::new(render);
        self
    }

    pub fn client(&self) -> &Arc<dyn StorageClient> {
        &self.client
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    /// Wrap `router` so every request gets its own session, flushed after the
    /// handler and cleared at teardown.
    pub fn attach<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            unit_of_work_middleware::<B>,
        ))
    }

    /// Session bound to the current request, if one was created.
    pub fn current_session(&self) -> Result<Option<SessionStore>, BindingError> {
        self.binding.get_current()
    }

    /// Session bound to the current request, created on first use.
    pub fn get_or_create_current_session(&self) -> Result<SessionStore, BindingError> {
        self.binding.get_or_create_current_session()
    }

    pub fn record(&self, mutation: Mutation) -> Result<(), BindingError> {
        self.get_or_create_current_session()?.record(mutation);
        Ok(())
    }

    pub fn create(&self, entity: Arc<dyn Entity>) -> Result<(), BindingError> {
        self.record(Mutation::create(entity))
    }

    pub fn update(&self, entity: Arc<dyn Entity>) -> Result<(), BindingError> {
        self.record(Mutation::update(entity))
    }

    pub fn delete(&self, entity: Arc<dyn Entity>) -> Result<(), BindingError> {
        self.record(Mutation::delete(entity))
    }

    /// Flush the current session now instead of waiting for the end of the
    /// request. A request without a session makes no storage call.
    pub async fn flush_current(&self) -> Result<usize> {
        match self.binding.get_current()? {
            Some(session) => Ok(session.flush(self.client.as_ref()).await?),
            None => Ok(0),
        }
    }

    /// Flush whatever is bound in `slot`.
    pub(crate) async fn flush_slot(&self, slot: &ContextSlot) -> Result<usize, FlushError> {
        match slot.get() {
            Some(session) => session.flush(self.client.as_ref()).await,
            None => Ok(0),
        }
    }

    pub(crate) fn render_flush_error(&self, err: FlushError) -> Response {
        (self.render_flush_error)(err)
    }
}
