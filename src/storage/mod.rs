//! Storage client seam.
//!
//! The unit of work needs exactly two things from a backend: a way to
//! configure a shared client from [`StorageSetup`] and a way to execute one
//! [`Mutation`]. Pool management, retries and query building stay inside the
//! providers.
//!
//! # Providers
//!
//! - [`MemoryStorage`] - in-process tables, used for development and tests
//! - [`PostgresStorage`] - sqlx pool writing to an `entities` table
//! - [`SurrealStorage`] - SurrealDB records keyed by `(kind, key)`

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::entity::Mutation;
use crate::error::StorageError;

pub mod memory;
pub mod postgres;
pub mod surreal;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use surreal::SurrealStorage;

/// Normalized arguments for configuring a storage client.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSetup {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub port: u16,
    /// Defer the first connection attempt until the first write.
    pub lazy_connect: bool,
    /// Fall back to a deferred connection when the eager attempt fails.
    pub retry_connect: bool,
    /// Provider-specific options passed through unchanged.
    pub options: Map<String, Value>,
}

impl StorageSetup {
    pub fn new(hosts: Vec<String>, keyspace: impl Into<String>, port: u16) -> Self {
        Self {
            hosts,
            keyspace: keyspace.into(),
            port,
            lazy_connect: false,
            retry_connect: false,
            options: Map::new(),
        }
    }
}

/// A shared, process-wide storage client.
#[async_trait]
pub trait StorageClient: Send + Sync + std::fmt::Debug {
    /// Execute a single mutation.
    async fn execute(&self, mutation: &Mutation) -> Result<(), StorageError>;
}

/// Builds a [`StorageClient`] from setup values.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn configure(&self, setup: &StorageSetup)
    -> Result<Arc<dyn StorageClient>, StorageError>;
}

/// Available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Memory,
    Postgres,
    SurrealDb,
}

impl Provider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "surrealdb" | "surreal" => Some(Self::SurrealDb),
            _ => None,
        }
    }
}

#[async_trait]
impl StorageConnector for Provider {
    async fn configure(
        &self,
        setup: &StorageSetup,
    ) -> Result<Arc<dyn StorageClient>, StorageError> {
        let client: Arc<dyn StorageClient> = match self {
            Self::Memory => Arc::new(MemoryStorage::new()),
            Self::Postgres => Arc::new(PostgresStorage::connect(setup).await?),
            Self::SurrealDb => Arc::new(SurrealStorage::connect(setup).await?),
        };
        tracing::info!(
            name: "uow.storage.configured",
            provider = ?self,
            hosts = ?setup.hosts,
            keyspace = %setup.keyspace,
            port = setup.port,
            lazy_connect = setup.lazy_connect,
            "storage client configured"
        );
        Ok(client)
    }
}

/// Configure a client for `provider`.
pub async fn connect(
    setup: &StorageSetup,
    provider: Provider,
) -> Result<Arc<dyn StorageClient>, StorageError> {
    provider.configure(setup).await
}

/// Kinds and keys end up in identifiers or record ids; keep them plain.
pub(crate) fn validate_identifier(value: &str) -> Result<(), StorageError> {
    let valid = !value.is_empty()
        && value.len() <= 128
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(value.to_string()))
    }
}

/// Split `host:port`, falling back to `default_port` when no port is given.
pub(crate) fn split_host(address: &str, default_port: u16) -> (String, u16) {
    if let Some((host, port)) = address.rsplit_once(':') {
        if let Ok(port) = port.parse() {
            return (host.to_string(), port);
        }
    }
    (address.to_string(), default_port)
}
