//! Reference REST backend for the persona resource.
//!
//! Serves any [`RemoteStore`] under `/api/personas/`, speaking the same wire
//! contract [`HttpStore`](crate::storage::HttpStore) consumes.

use crate::core::{Persona, PersonaId, StoreError};
use crate::storage::{RemoteStore, http::DUPLICATE_ENTRY_CODE};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const RESOURCE_ROUTE: &str = "/api/personas";

#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<dyn RemoteStore>,
}

impl ServerState {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, DUPLICATE_ENTRY_CODE),
            Self::Store(StoreError::IdentifierMismatch { .. }) => {
                (StatusCode::BAD_REQUEST, "IDENTIFIER_MISMATCH")
            }
            Self::Store(StoreError::Rejected { status, .. }) => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                "UPSTREAM_REJECTED",
            ),
            Self::Store(StoreError::Transport(_) | StoreError::Decode(_)) => {
                error!(error = %message, "persona store unavailable");
                (StatusCode::BAD_GATEWAY, "STORE_UNAVAILABLE")
            }
        };

        let body = Json(ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        });
        (status, body).into_response()
    }
}

pub fn router(store: Arc<dyn RemoteStore>) -> Router {
    let collection = get(list_personas).post(create_persona);
    Router::new()
        .route(RESOURCE_ROUTE, collection.clone())
        .route(&format!("{RESOURCE_ROUTE}/"), collection)
        .route(
            &format!("{RESOURCE_ROUTE}/:id"),
            get(get_persona).put(update_persona).delete(delete_persona),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ServerState::new(store))
}

fn parse_id(raw: &str) -> ServerResult<PersonaId> {
    PersonaId::parse(raw).map_err(|err| ServerError::BadRequest(err.to_string()))
}

async fn list_personas(State(state): State<ServerState>) -> ServerResult<Json<Vec<Persona>>> {
    Ok(Json(state.store.list().await?))
}

async fn get_persona(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Persona>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get(&id).await?))
}

async fn create_persona(
    State(state): State<ServerState>,
    Json(persona): Json<Persona>,
) -> ServerResult<StatusCode> {
    state.store.create(&persona).await?;
    info!(id = %persona.identifier, "persona created");
    Ok(StatusCode::CREATED)
}

async fn update_persona(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(persona): Json<Persona>,
) -> ServerResult<StatusCode> {
    let id = parse_id(&id)?;
    state.store.update(&id, &persona).await?;
    info!(%id, "persona updated");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_persona(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    let id = parse_id(&id)?;
    state.store.delete(&id).await?;
    info!(%id, "persona deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_duplicate_entry() {
        let id = PersonaId::parse("12345678").unwrap();
        let response = ServerError::from(StoreError::Conflict(id)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_malformed_path_id_is_bad_request() {
        let err = parse_id("12ab").unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
