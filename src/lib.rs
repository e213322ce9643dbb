//! Request-scoped unit of work for Axum
//!
//! Binds one session of pending storage writes to each inbound request,
//! flushes it once after the handler has produced its response (so a failed
//! write still becomes a normal error response), and clears it at the end of
//! the request on every exit path.
//!
//! # Architecture
//!
//! - **Session**: ordered queue of pending mutations, bound per request
//! - **Lifecycle**: middleware that flushes after dispatch and tears down
//! - **Storage**: the client seam plus memory, Postgres and SurrealDB providers
//!
//! # Modules
//!
//! - [`session`]: session store and context binding
//! - [`lifecycle`]: flush-then-respond middleware and teardown guard
//! - [`unit_of_work`]: the handle handlers record writes through
//! - [`storage`]: storage client trait and providers
//! - [`entity`]: entity and mutation types

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod demo;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod server;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod unit_of_work;

use std::sync::Arc;

use crate::config::AppConfig;

pub use error::{Error, Result};
pub use unit_of_work::UnitOfWork;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Unit of work for recording writes against the current request.
    pub uow: UnitOfWork,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
