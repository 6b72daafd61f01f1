use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use serde_json::{Value, json};
use tracing::info;

use crate::handlers::{JsonBody, PathParams};
use crate::db::{ConnectionInput, ConnectionSummary};
use crate::middleware::AdminUser;
use crate::{HubError, router::HubState};

/// GET /connections
pub async fn list_connections(
    State(state): State<HubState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<ConnectionSummary>>, HubError> {
    Ok(Json(state.credentials.list().await?))
}

/// POST /connections
pub async fn create_connection(
    State(state): State<HubState>,
    AdminUser(admin): AdminUser,
    WithRejection(Json(input), _): JsonBody<ConnectionInput>,
) -> Result<(StatusCode, Json<Value>), HubError> {
    let name = input.name.clone();
    let id = state.credentials.create(input).await?;
    info!(admin_id = admin.id, connection_id = id, name = %name, "connection created");
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": "Connection created successfully.", "id": id})),
    ))
}

/// PATCH /connections/{connection}
///
/// An omitted or empty password keeps the stored one.
pub async fn update_connection(
    State(state): State<HubState>,
    AdminUser(admin): AdminUser,
    WithRejection(Path(connection_id), _): PathParams<i64>,
    WithRejection(Json(input), _): JsonBody<ConnectionInput>,
) -> Result<Json<Value>, HubError> {
    state.credentials.update(connection_id, input).await?;
    info!(admin_id = admin.id, connection_id, "connection updated");
    Ok(Json(json!({"success": "Connection updated successfully."})))
}

/// DELETE /connections/{connection}
pub async fn delete_connection(
    State(state): State<HubState>,
    AdminUser(admin): AdminUser,
    WithRejection(Path(connection_id), _): PathParams<i64>,
) -> Result<Json<Value>, HubError> {
    state.credentials.delete(connection_id).await?;
    info!(admin_id = admin.id, connection_id, "connection deleted");
    Ok(Json(json!({"success": "Connection deleted successfully."})))
}
