use axum::{
    Json,
    extract::{Path, Query, State},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::handlers::{JsonBody, PathParams, QueryParams};
use crate::live::value::RowMap;
use crate::middleware::AuthUser;
use crate::service::browser::{
    Layout, SqlPage, TableDataPage, TableStructurePage, TablesPage,
};
use crate::{HubError, router::HubState};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteSqlRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRowRequest {
    pub row: Option<RowMap>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRowRequest {
    pub row: Option<RowMap>,
    #[serde(default)]
    pub changes: RowMap,
}

fn require_row(row: Option<RowMap>) -> Result<RowMap, HubError> {
    row.ok_or_else(|| HubError::validation("row data is required"))
}

/// GET /dashboard
pub async fn dashboard(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, HubError> {
    let connections = state.browser.user_connections(&user).await?;
    Ok(Json(json!({"user_connections": connections})))
}

/// GET /connections/{connection}/databases
pub async fn databases(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
    WithRejection(Path(connection_id), _): PathParams<i64>,
) -> Result<Json<Layout>, HubError> {
    Ok(Json(state.browser.databases(&user, connection_id).await?))
}

/// GET /connections/{connection}/databases/{db}/tables
pub async fn tables(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
    WithRejection(Path((connection_id, database)), _): PathParams<(i64, String)>,
) -> Result<Json<TablesPage>, HubError> {
    Ok(Json(
        state.browser.tables(&user, connection_id, &database).await?,
    ))
}

/// GET /connections/{connection}/databases/{db}/sql
pub async fn sql_page(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
    WithRejection(Path((connection_id, database)), _): PathParams<(i64, String)>,
) -> Result<Json<SqlPage>, HubError> {
    Ok(Json(
        state.browser.sql_page(&user, connection_id, &database).await?,
    ))
}

/// POST /connections/{connection}/databases/{db}/execute-sql
pub async fn execute_sql(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
    WithRejection(Path((connection_id, database)), _): PathParams<(i64, String)>,
    WithRejection(Json(req), _): JsonBody<ExecuteSqlRequest>,
) -> Result<Json<SqlPage>, HubError> {
    Ok(Json(
        state
            .browser
            .execute_sql(&user, connection_id, &database, &req.query)
            .await?,
    ))
}

/// GET /connections/{connection}/databases/{db}/tables/{table}?page=
pub async fn table_data(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
    WithRejection(Path((connection_id, database, table)), _): PathParams<(i64, String, String)>,
    WithRejection(Query(query), _): QueryParams<PageQuery>,
) -> Result<Json<TableDataPage>, HubError> {
    let page = query.page.unwrap_or(1);
    Ok(Json(
        state
            .browser
            .table_data(&user, connection_id, &database, &table, page)
            .await?,
    ))
}

/// GET /connections/{connection}/databases/{db}/tables/{table}/structure
pub async fn table_structure(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
    WithRejection(Path((connection_id, database, table)), _): PathParams<(i64, String, String)>,
) -> Result<Json<TableStructurePage>, HubError> {
    Ok(Json(
        state
            .browser
            .table_structure(&user, connection_id, &database, &table)
            .await?,
    ))
}

/// DELETE /connections/{connection}/databases/{db}/tables/{table}/row
pub async fn delete_row(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
    WithRejection(Path((connection_id, database, table)), _): PathParams<(i64, String, String)>,
    WithRejection(Json(req), _): JsonBody<DeleteRowRequest>,
) -> Result<Json<Value>, HubError> {
    let row = require_row(req.row)?;
    let affected = state
        .browser
        .delete_row(&user, connection_id, &database, &table, &row)
        .await?;
    Ok(Json(json!({
        "success": "Row deleted successfully.",
        "affected_rows": affected,
    })))
}

/// PATCH /connections/{connection}/databases/{db}/tables/{table}/row
pub async fn update_row(
    State(state): State<HubState>,
    AuthUser(user): AuthUser,
    WithRejection(Path((connection_id, database, table)), _): PathParams<(i64, String, String)>,
    WithRejection(Json(req), _): JsonBody<UpdateRowRequest>,
) -> Result<Json<Value>, HubError> {
    let row = require_row(req.row)?;
    let affected = state
        .browser
        .update_row(&user, connection_id, &database, &table, &row, &req.changes)
        .await?;
    Ok(Json(json!({
        "success": "Row updated successfully.",
        "affected_rows": affected,
    })))
}
