use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::warn;

use super::{StorageClient, StorageSetup, split_host, validate_identifier};
use crate::entity::{Mutation, Operation};
use crate::error::StorageError;

/// Options consumed by the pool or the connection itself; everything else in
/// `extra_setup_options` becomes a server runtime parameter.
const RESERVED_OPTIONS: &[&str] = &[
    "max_connections",
    "min_connections",
    "acquire_timeout_secs",
    "application_name",
    "username",
    "password",
    "database",
];

/// Writes entities as JSON documents into an `entities(kind, key, data,
/// updated_at)` table inside the keyspace schema.
#[derive(Debug)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to the first reachable host.
    ///
    /// With `lazy_connect` no connection is attempted here. With
    /// `retry_connect` a failed eager attempt yields a lazy pool instead of an
    /// error, so connecting is retried on the first write.
    pub async fn connect(setup: &StorageSetup) -> Result<Self, StorageError> {
        let Some(first_host) = setup.hosts.first() else {
            return Err(StorageError::Connect("no storage hosts configured".to_string()));
        };
        let pool_options = pool_options(&setup.options);

        if setup.lazy_connect {
            let options = connect_options(setup, first_host);
            return Ok(Self {
                pool: pool_options.connect_lazy_with(options),
            });
        }

        let mut last_error = None;
        for host in &setup.hosts {
            match pool_options
                .clone()
                .connect_with(connect_options(setup, host))
                .await
            {
                Ok(pool) => return Ok(Self { pool }),
                Err(e) => {
                    warn!(host = %host, error = %e, "postgres host unreachable");
                    last_error = Some(e);
                }
            }
        }

        if setup.retry_connect {
            warn!("all postgres hosts unreachable, deferring connection");
            let options = connect_options(setup, first_host);
            return Ok(Self {
                pool: pool_options.connect_lazy_with(options),
            });
        }

        Err(StorageError::Connect(
            last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string()),
        ))
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

fn pool_options(options: &Map<String, Value>) -> PgPoolOptions {
    let mut pool = PgPoolOptions::new().max_connections(5);
    if let Some(max) = options.get("max_connections").and_then(Value::as_u64) {
        pool = pool.max_connections(u32::try_from(max).unwrap_or(u32::MAX));
    }
    if let Some(min) = options.get("min_connections").and_then(Value::as_u64) {
        pool = pool.min_connections(u32::try_from(min).unwrap_or(u32::MAX));
    }
    if let Some(secs) = options.get("acquire_timeout_secs").and_then(Value::as_u64) {
        pool = pool.acquire_timeout(Duration::from_secs(secs));
    }
    pool
}

fn connect_options(setup: &StorageSetup, address: &str) -> PgConnectOptions {
    let (host, port) = split_host(address, setup.port);
    let mut options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .options([("search_path", setup.keyspace.as_str())]);

    let text = |key: &str| setup.options.get(key).and_then(Value::as_str);
    if let Some(name) = text("application_name") {
        options = options.application_name(name);
    }
    if let Some(user) = text("username") {
        options = options.username(user);
    }
    if let Some(password) = text("password") {
        options = options.password(password);
    }
    if let Some(database) = text("database") {
        options = options.database(database);
    }

    options.options(runtime_parameters(&setup.options))
}

fn runtime_parameters(options: &Map<String, Value>) -> Vec<(String, String)> {
    options
        .iter()
        .filter(|(key, _)| !RESERVED_OPTIONS.contains(&key.as_str()))
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

#[async_trait]
impl StorageClient for PostgresStorage {
    async fn execute(&self, mutation: &Mutation) -> Result<(), StorageError> {
        let entity = mutation.entity();
        let kind = entity.kind();
        let key = entity.key();
        validate_identifier(kind)?;
        validate_identifier(&key)?;

        match mutation.operation() {
            Operation::Create | Operation::Update => {
                let data = entity.document()?;
                sqlx::query(
                    r#"
                    INSERT INTO entities (kind, key, data, updated_at)
                    VALUES ($1, $2, $3, NOW())
                    ON CONFLICT (kind, key) DO UPDATE SET
                        data = EXCLUDED.data,
                        updated_at = NOW()
                    "#,
                )
                .bind(kind)
                .bind(&key)
                .bind(data)
                .execute(&self.pool)
                .await?;
            }
            Operation::Delete => {
                sqlx::query("DELETE FROM entities WHERE kind = $1 AND key = $2")
                    .bind(kind)
                    .bind(&key)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_runtime_parameters_skip_reserved() {
        let options = json!({
            "max_connections": 10,
            "password": "secret",
            "statement_timeout": "5s",
            "lock_timeout": 1000
        });
        let Value::Object(map) = options else {
            unreachable!()
        };
        let mut params = runtime_parameters(&map);
        params.sort();
        assert_eq!(
            params,
            vec![
                ("lock_timeout".to_string(), "1000".to_string()),
                ("statement_timeout".to_string(), "5s".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_lazy_connect_does_not_touch_network() {
        let mut setup = StorageSetup::new(vec!["10.255.255.1".to_string()], "ks1", 5432);
        setup.lazy_connect = true;
        let storage = PostgresStorage::connect(&setup).await.unwrap();
        assert_eq!(storage.get_pool().size(), 0);
    }

    #[tokio::test]
    async fn test_no_hosts_is_a_connect_error() {
        let setup = StorageSetup::new(Vec::new(), "ks1", 5432);
        let err = PostgresStorage::connect(&setup).await.unwrap_err();
        assert!(matches!(err, StorageError::Connect(_)));
    }
}
