use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use tokio::sync::OnceCell;
use tracing::warn;

use super::{StorageClient, StorageSetup, split_host, validate_identifier};
use crate::entity::{Mutation, Operation};
use crate::error::StorageError;

/// Stores each entity as the record `kind:key`. Namespace and database are
/// both the configured keyspace.
#[derive(Debug)]
pub struct SurrealStorage {
    db: OnceCell<Surreal<Any>>,
    setup: StorageSetup,
}

impl SurrealStorage {
    pub async fn connect(setup: &StorageSetup) -> Result<Self, StorageError> {
        if setup.hosts.is_empty() {
            return Err(StorageError::Connect("no storage hosts configured".to_string()));
        }
        let storage = Self {
            db: OnceCell::new(),
            setup: setup.clone(),
        };
        if setup.lazy_connect {
            return Ok(storage);
        }
        match storage.handle().await {
            Ok(_) => Ok(storage),
            Err(e) if setup.retry_connect => {
                warn!(error = %e, "surrealdb unreachable, deferring connection");
                Ok(storage)
            }
            Err(e) => Err(e),
        }
    }

    /// Connected handle, connecting on first use.
    async fn handle(&self) -> Result<&Surreal<Any>, StorageError> {
        self.db.get_or_try_init(|| open(&self.setup)).await
    }
}

async fn open(setup: &StorageSetup) -> Result<Surreal<Any>, StorageError> {
    let mut last_error = None;
    for address in &setup.hosts {
        let endpoint = if address.contains("://") {
            address.clone()
        } else {
            let (host, port) = split_host(address, setup.port);
            format!("ws://{host}:{port}")
        };
        match connect(endpoint.as_str()).await {
            Ok(db) => {
                db.use_ns(setup.keyspace.as_str())
                    .use_db(setup.keyspace.as_str())
                    .await?;
                return Ok(db);
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "surrealdb endpoint unreachable");
                last_error = Some(e);
            }
        }
    }
    Err(StorageError::Connect(
        last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string()),
    ))
}

#[async_trait]
impl StorageClient for SurrealStorage {
    async fn execute(&self, mutation: &Mutation) -> Result<(), StorageError> {
        let entity = mutation.entity();
        let kind = entity.kind().to_string();
        let key = entity.key();
        validate_identifier(&kind)?;
        validate_identifier(&key)?;
        let db = self.handle().await?;

        let response = match mutation.operation() {
            Operation::Create | Operation::Update => {
                let data = entity.document()?;
                db.query("UPSERT type::thing($tb, $id) CONTENT $data")
                    .bind(("tb", kind))
                    .bind(("id", key))
                    .bind(("data", data))
                    .await?
            }
            Operation::Delete => {
                db.query("DELETE type::thing($tb, $id)")
                    .bind(("tb", kind))
                    .bind(("id", key))
                    .await?
            }
        };
        response.check()?;
        Ok(())
    }
}
