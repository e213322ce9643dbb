//! Example models and handlers served by the binary.
//!
//! Handlers only record writes; the lifecycle layer flushes them once the
//! handler has produced its response.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::entity::{EntityRef, Model};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Foo {
    pub uuid: Uuid,
    pub kind: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bar: Option<Uuid>,
}

impl Model for Foo {
    const KIND: &'static str = "foo";

    fn key(&self) -> String {
        self.uuid.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub uuid: Uuid,
    pub kind: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Model for Bar {
    const KIND: &'static str = "bar";

    fn key(&self) -> String {
        self.uuid.to_string()
    }
}

/// Request body shared by the create endpoints.
#[derive(Debug, Deserialize)]
pub struct NewRecord {
    pub kind: i32,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewRecord {
    fn validate(&self) -> Result<()> {
        if self.kind < 0 {
            return Err(Error::BadRequest("kind must be non-negative".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PairResponse {
    pub foo: Foo,
    pub bar: Bar,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/foos", post(create_foo))
        .route("/foos/{id}", delete(delete_foo))
        .route("/bars", post(create_bar))
        .route("/pairs", post(create_pair))
}

async fn healthz() -> &'static str {
    "ok"
}

/// POST /foos
async fn create_foo(
    State(state): State<AppState>,
    Json(req): Json<NewRecord>,
) -> Result<(StatusCode, Json<Foo>)> {
    req.validate()?;
    let foo = Foo {
        uuid: Uuid::new_v4(),
        kind: req.kind,
        created_at: Utc::now(),
        description: req.description,
        bar: None,
    };
    state.uow.create(Arc::new(foo.clone()))?;
    Ok((StatusCode::CREATED, Json(foo)))
}

/// POST /bars
async fn create_bar(
    State(state): State<AppState>,
    Json(req): Json<NewRecord>,
) -> Result<(StatusCode, Json<Bar>)> {
    req.validate()?;
    let bar = Bar {
        uuid: Uuid::new_v4(),
        kind: req.kind,
        created_at: Utc::now(),
        description: req.description,
    };
    state.uow.create(Arc::new(bar.clone()))?;
    Ok((StatusCode::CREATED, Json(bar)))
}

/// POST /pairs - a Bar plus a Foo pointing at it, flushed together.
async fn create_pair(
    State(state): State<AppState>,
    Json(req): Json<NewRecord>,
) -> Result<(StatusCode, Json<PairResponse>)> {
    req.validate()?;
    let now = Utc::now();
    let bar = Bar {
        uuid: Uuid::new_v4(),
        kind: req.kind,
        created_at: now,
        description: req.description.clone(),
    };
    let foo = Foo {
        uuid: Uuid::new_v4(),
        kind: req.kind,
        created_at: now,
        description: req.description,
        bar: Some(bar.uuid),
    };
    state.uow.create(Arc::new(bar.clone()))?;
    state.uow.create(Arc::new(foo.clone()))?;
    Ok((StatusCode::CREATED, Json(PairResponse { foo, bar })))
}

/// DELETE /foos/{id}
async fn delete_foo(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state
        .uow
        .delete(Arc::new(EntityRef::new(Foo::KIND, id.to_string())))?;
    Ok(StatusCode::NO_CONTENT)
}
