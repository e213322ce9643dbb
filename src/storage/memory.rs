//! In-process storage backend.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{StorageClient, validate_identifier};
use crate::entity::{Mutation, Operation};
use crate::error::StorageError;

/// A write observed by [`MemoryStorage`], in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedWrite {
    pub kind: String,
    pub key: String,
    pub operation: Operation,
}

type Rows = HashMap<(String, String), Value>;

#[derive(Debug, Default)]
struct MemoryInner {
    rows: RwLock<Rows>,
    log: RwLock<Vec<ExecutedWrite>>,
}

impl MemoryInner {
    fn rows(&self) -> RwLockReadGuard<'_, Rows> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn rows_mut(&self) -> RwLockWriteGuard<'_, Rows> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self) -> RwLockReadGuard<'_, Vec<ExecutedWrite>> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_mut(&self) -> RwLockWriteGuard<'_, Vec<ExecutedWrite>> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tables held in memory. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored document for `(kind, key)`.
    pub fn get(&self, kind: &str, key: &str) -> Option<Value> {
        self.inner
            .rows()
            .get(&(kind.to_string(), key.to_string()))
            .cloned()
    }

    /// Every executed write so far.
    pub fn log(&self) -> Vec<ExecutedWrite> {
        self.inner.log().clone()
    }

    pub fn execute_count(&self) -> usize {
        self.inner.log().len()
    }

    /// Number of stored rows across all kinds.
    pub fn len(&self) -> usize {
        self.inner.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn execute(&self, mutation: &Mutation) -> Result<(), StorageError> {
        let entity = mutation.entity();
        let kind = entity.kind().to_string();
        let key = entity.key();
        validate_identifier(&kind)?;
        validate_identifier(&key)?;

        match mutation.operation() {
            Operation::Create | Operation::Update => {
                let document = entity.document()?;
                self.inner
                    .rows_mut()
                    .insert((kind.clone(), key.clone()), document);
            }
            Operation::Delete => {
                self.inner.rows_mut().remove(&(kind.clone(), key.clone()));
            }
        }

        self.inner.log_mut().push(ExecutedWrite {
            kind,
            key,
            operation: mutation.operation(),
        });
        Ok(())
    }
}
