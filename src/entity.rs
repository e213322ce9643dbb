//! Domain objects as seen by the unit of work.
//!
//! The session never inspects an entity beyond its kind, key and serialized
//! document. Columns, validation and primary-key policy belong to the caller.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// An object that can be written to storage.
pub trait Entity: Send + Sync + fmt::Debug {
    /// Table / collection name.
    fn kind(&self) -> &str;

    /// Primary key, rendered as a string.
    fn key(&self) -> String;

    /// Serialized document written on create and update.
    fn document(&self) -> Result<Value, serde_json::Error>;
}

/// Convenience for serde-backed models.
///
/// ```rust
/// use axum_unit_of_work::entity::{Entity, Model};
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct Note {
///     id: u32,
///     body: String,
/// }
///
/// impl Model for Note {
///     const KIND: &'static str = "notes";
///
///     fn key(&self) -> String {
///         self.id.to_string()
///     }
/// }
///
/// let note = Note { id: 7, body: "hi".into() };
/// assert_eq!(Entity::kind(&note), "notes");
/// assert_eq!(note.document().unwrap()["body"], "hi");
/// ```
pub trait Model: Serialize + Send + Sync + fmt::Debug {
    const KIND: &'static str;

    fn key(&self) -> String;
}

impl<M: Model> Entity for M {
    fn kind(&self) -> &str {
        M::KIND
    }

    fn key(&self) -> String {
        Model::key(self)
    }

    fn document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Kind and key only, for deleting without loading the entity first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: String,
    pub key: String,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
        }
    }
}

impl Entity for EntityRef {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn key(&self) -> String {
        self.key.clone()
    }

    fn document(&self) -> Result<Value, serde_json::Error> {
        Ok(Value::Null)
    }
}

/// What a flush does with an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A pending write: a shared reference to an entity plus the operation.
#[derive(Debug, Clone)]
pub struct Mutation {
    entity: Arc<dyn Entity>,
    operation: Operation,
}

impl Mutation {
    pub fn new(entity: Arc<dyn Entity>, operation: Operation) -> Self {
        Self { entity, operation }
    }

    pub fn create(entity: Arc<dyn Entity>) -> Self {
        Self::new(entity, Operation::Create)
    }

    pub fn update(entity: Arc<dyn Entity>) -> Self {
        Self::new(entity, Operation::Update)
    }

    pub fn delete(entity: Arc<dyn Entity>) -> Self {
        Self::new(entity, Operation::Delete)
    }

    pub fn entity(&self) -> &Arc<dyn Entity> {
        &self.entity
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// `kind/key` label used in logs.
    pub fn target(&self) -> String {
        format!("{}/{}", self.entity.kind(), self.entity.key())
    }
}
