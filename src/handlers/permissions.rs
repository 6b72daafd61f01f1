use axum::{
    Json,
    extract::{Path, State},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::handlers::{JsonBody, PathParams};
use crate::db::User;
use crate::live::ident::validate_identifier;
use crate::middleware::AdminUser;
use crate::service::browser::DatabasePermissionsView;
use crate::{HubError, router::HubState};

#[derive(Debug, Deserialize)]
pub struct SyncGrantsRequest {
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceAllowListRequest {
    #[serde(default)]
    pub allowed_databases: Vec<String>,
}

async fn require_user(state: &HubState, user_id: i64) -> Result<User, HubError> {
    state
        .users
        .get(user_id)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("user {user_id}")))
}

/// GET /connections/{connection}/permissions
pub async fn edit_grants(
    State(state): State<HubState>,
    AdminUser(_admin): AdminUser,
    WithRejection(Path(connection_id), _): PathParams<i64>,
) -> Result<Json<Value>, HubError> {
    let record = state.credentials.get(connection_id).await?;
    let users = state.users.list().await?;
    let granted = state.permissions.granted_user_ids(connection_id).await?;
    Ok(Json(json!({
        "connection": {"id": record.id, "name": record.name},
        "users": users,
        "granted_user_ids": granted,
    })))
}

/// PATCH /connections/{connection}/permissions
///
/// Administrators are always part of the resulting set.
pub async fn sync_grants(
    State(state): State<HubState>,
    AdminUser(admin): AdminUser,
    WithRejection(Path(connection_id), _): PathParams<i64>,
    WithRejection(Json(req), _): JsonBody<SyncGrantsRequest>,
) -> Result<Json<Value>, HubError> {
    let granted = state
        .permissions
        .sync_grants(connection_id, &req.user_ids)
        .await?;
    info!(
        admin_id = admin.id,
        connection_id,
        granted = granted.len(),
        "connection grants synced"
    );
    Ok(Json(json!({
        "success": "Connection permissions updated successfully.",
        "granted_user_ids": granted,
    })))
}

/// GET /connections/{connection}/users/{user}/db-permissions
pub async fn database_permissions(
    State(state): State<HubState>,
    AdminUser(admin): AdminUser,
    WithRejection(Path((connection_id, user_id)), _): PathParams<(i64, i64)>,
) -> Result<Json<DatabasePermissionsView>, HubError> {
    require_user(&state, user_id).await?;
    let view = state
        .browser
        .database_permissions(&admin, connection_id, user_id)
        .await?;
    Ok(Json(view))
}

/// POST /connections/{connection}/users/{user}/db-permissions
///
/// Replaces the whole allow-list; an empty list lifts every restriction.
pub async fn replace_database_permissions(
    State(state): State<HubState>,
    AdminUser(admin): AdminUser,
    WithRejection(Path((connection_id, user_id)), _): PathParams<(i64, i64)>,
    WithRejection(Json(req), _): JsonBody<ReplaceAllowListRequest>,
) -> Result<Json<Value>, HubError> {
    require_user(&state, user_id).await?;
    state.credentials.get(connection_id).await?;
    for name in &req.allowed_databases {
        validate_identifier(name)?;
    }
    state
        .permissions
        .replace_allowed_databases(user_id, connection_id, &req.allowed_databases)
        .await?;
    info!(
        admin_id = admin.id,
        user_id,
        connection_id,
        allowed = req.allowed_databases.len(),
        "database allow-list replaced"
    );
    Ok(Json(json!({"success": "Database permissions updated successfully."})))
}
