//! Keyed row mutations.
//!
//! The primary key is always read from the live table at mutation time and
//! the predicate is built only from those columns, with every value bound as
//! a parameter.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::HubError;
use crate::live::discovery::{list_columns, list_primary_key};
use crate::live::ident::quote_identifier;
use crate::live::link::LiveLink;
use crate::live::value::{RowMap, bind_json};

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Applied { affected_rows: u64 },
    /// Zero rows matched the key: already deleted, or never existed.
    NotFound,
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// `pk1 = ? AND pk2 = ?` with values taken from `row`. A missing or null
/// key value is an error naming the column.
pub fn key_predicate(
    table: &str,
    primary_key: &[String],
    row: &RowMap,
) -> Result<(String, Vec<Value>), HubError> {
    if primary_key.is_empty() {
        return Err(HubError::NoPrimaryKey {
            table: table.to_string(),
        });
    }
    let mut clauses = Vec::with_capacity(primary_key.len());
    let mut params = Vec::with_capacity(primary_key.len());
    for column in primary_key {
        let value = match row.get(column) {
            Some(v) if !v.is_null() => v.clone(),
            _ => {
                return Err(HubError::MissingKeyValue {
                    column: column.clone(),
                });
            }
        };
        clauses.push(format!("{} = ?", quote_identifier(column)?));
        params.push(value);
    }
    Ok((clauses.join(" AND "), params))
}

pub fn build_delete(
    table: &str,
    primary_key: &[String],
    row: &RowMap,
) -> Result<KeyedStatement, HubError> {
    let quoted = quote_identifier(table)?;
    let (predicate, params) = key_predicate(table, primary_key, row)?;
    Ok(KeyedStatement {
        sql: format!("DELETE FROM {quoted} WHERE {predicate}"),
        params,
    })
}

/// `changes` may only name columns that exist on the live table.
pub fn build_update(
    table: &str,
    columns: &[String],
    primary_key: &[String],
    row: &RowMap,
    changes: &RowMap,
) -> Result<KeyedStatement, HubError> {
    let quoted = quote_identifier(table)?;
    let (predicate, key_params) = key_predicate(table, primary_key, row)?;
    if changes.is_empty() {
        return Err(HubError::validation("no column changes submitted"));
    }

    let mut assignments = Vec::with_capacity(changes.len());
    let mut params = Vec::with_capacity(changes.len() + key_params.len());
    for (column, value) in changes {
        if !columns.iter().any(|c| c == column) {
            return Err(HubError::validation(format!(
                "column `{column}` does not exist on `{table}`"
            )));
        }
        assignments.push(format!("{} = ?", quote_identifier(column)?));
        params.push(value.clone());
    }
    params.extend(key_params);

    Ok(KeyedStatement {
        sql: format!(
            "UPDATE {quoted} SET {} WHERE {predicate}",
            assignments.join(", ")
        ),
        params,
    })
}

async fn run_keyed(
    link: &mut LiveLink,
    statement: &KeyedStatement,
) -> Result<MutationOutcome, HubError> {
    let mut query = sqlx::query(&statement.sql);
    for param in &statement.params {
        query = bind_json(query, param);
    }
    let res = query
        .execute(link.conn())
        .await
        .map_err(HubError::statement)?;
    Ok(match res.rows_affected() {
        0 => MutationOutcome::NotFound,
        n => MutationOutcome::Applied { affected_rows: n },
    })
}

pub async fn delete_row(
    link: &mut LiveLink,
    table: &str,
    row: &RowMap,
) -> Result<MutationOutcome, HubError> {
    let primary_key = list_primary_key(link, table).await?;
    let statement = build_delete(table, &primary_key, row)?;
    let outcome = run_keyed(link, &statement).await?;
    log_outcome(link, table, "delete", &outcome);
    Ok(outcome)
}

pub async fn update_row(
    link: &mut LiveLink,
    table: &str,
    row: &RowMap,
    changes: &RowMap,
) -> Result<MutationOutcome, HubError> {
    let primary_key = list_primary_key(link, table).await?;
    let columns = list_columns(link, table).await?;
    let statement = build_update(table, &columns, &primary_key, row, changes)?;
    let outcome = run_keyed(link, &statement).await?;
    log_outcome(link, table, "update", &outcome);
    Ok(outcome)
}

fn log_outcome(link: &LiveLink, table: &str, action: &str, outcome: &MutationOutcome) {
    let connection_id = link.connection_id();
    let schema = link.schema().unwrap_or("<none>");
    match outcome {
        MutationOutcome::Applied { affected_rows } => {
            info!(connection_id, schema, table, action, affected_rows, "row mutation applied")
        }
        MutationOutcome::NotFound => {
            warn!(connection_id, schema, table, action, "row mutation matched nothing")
        }
    }
}
