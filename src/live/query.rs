//! Passthrough execution of user-authored SQL.
//!
//! The text is sent verbatim over the text protocol. It runs against a
//! connection the user is already authorized for, so no attempt is made to
//! sanitise it here.

use serde::Serialize;
use sqlx::Executor;
use tracing::{error, info};

use crate::error::HubError;
use crate::live::link::LiveLink;
use crate::live::value::{RowMap, column_names, row_to_map};
use crate::service::classifier::StatementClassifier;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Read { columns: Vec<String>, rows: Vec<RowMap> },
    Write { affected_rows: u64 },
}

pub async fn execute(
    link: &mut LiveLink,
    classifier: &dyn StatementClassifier,
    sql: &str,
) -> Result<QueryOutcome, HubError> {
    if sql.trim().is_empty() {
        return Err(HubError::validation("query is required"));
    }
    let connection_id = link.connection_id();

    if classifier.is_read_only(sql) {
        let rows = link
            .conn()
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(|e| {
                let err = HubError::statement(e);
                error!(connection_id, error = %err, "read statement failed");
                err
            })?;
        let columns = rows.first().map(column_names).unwrap_or_default();
        info!(connection_id, rows = rows.len(), "read statement executed");
        Ok(QueryOutcome::Read {
            columns,
            rows: rows.iter().map(row_to_map).collect(),
        })
    } else {
        let res = link
            .conn()
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| {
                let err = HubError::statement(e);
                error!(connection_id, error = %err, "affecting statement failed");
                err
            })?;
        info!(connection_id, affected_rows = res.rows_affected(), "affecting statement executed");
        Ok(QueryOutcome::Write {
            affected_rows: res.rows_affected(),
        })
    }
}
