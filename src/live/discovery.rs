//! Live schema introspection. Nothing here is cached: every call asks the
//! server again.

use serde::Serialize;
use sqlx::mysql::MySqlRow;
use sqlx::{ColumnIndex, Executor, Row};
use tracing::debug;

use crate::error::HubError;
use crate::live::ident::quote_identifier;
use crate::live::link::LiveLink;
use crate::live::value::{RowMap, row_to_map, text_cell};

/// Schemas owned by the server itself, never listed.
pub const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

pub const PAGE_SIZE: u64 = 100;

/// One row of `SHOW COLUMNS`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnStructure {
    pub field: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub null: String,
    pub key: String,
    pub default: Option<String>,
    pub extra: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowPage {
    pub rows: Vec<RowMap>,
    pub total: u64,
    pub current_page: u64,
    pub last_page: u64,
    pub per_page: u64,
}

pub fn is_system_schema(name: &str) -> bool {
    SYSTEM_SCHEMAS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Page numbers are 1-based; anything below 1 is treated as 1.
/// Returns `(page, offset, last_page)`.
pub fn page_window(page: u64, total: u64) -> (u64, u64, u64) {
    let page = page.max(1);
    let last_page = total.div_ceil(PAGE_SIZE).max(1);
    (page, (page - 1).saturating_mul(PAGE_SIZE), last_page)
}

fn text<I>(row: &MySqlRow, index: I) -> Result<Option<String>, HubError>
where
    I: ColumnIndex<MySqlRow> + Copy,
{
    text_cell(row, index).map_err(HubError::statement)
}

fn statement_failed(statement: &str) -> impl FnOnce(sqlx::Error) -> HubError + '_ {
    move |e| {
        debug!(statement, error = %e, "introspection failed");
        HubError::statement(e)
    }
}

pub async fn list_databases(link: &mut LiveLink) -> Result<Vec<String>, HubError> {
    let rows = link
        .conn()
        .fetch_all(sqlx::raw_sql("SHOW DATABASES"))
        .await
        .map_err(statement_failed("SHOW DATABASES"))?;

    let mut names = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(name) = text(row, 0usize)?
            && !is_system_schema(&name)
        {
            names.push(name);
        }
    }
    Ok(names)
}

/// Tables of the schema the link was opened on.
pub async fn list_tables(link: &mut LiveLink) -> Result<Vec<String>, HubError> {
    if link.schema().is_none() {
        return Err(HubError::validation("a database must be selected to list tables"));
    }
    let rows = link
        .conn()
        .fetch_all(sqlx::raw_sql("SHOW TABLES"))
        .await
        .map_err(statement_failed("SHOW TABLES"))?;

    let mut names = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(name) = text(row, 0usize)? {
            names.push(name);
        }
    }
    Ok(names)
}

pub async fn describe_columns(
    link: &mut LiveLink,
    table: &str,
) -> Result<Vec<ColumnStructure>, HubError> {
    let sql = format!("SHOW COLUMNS FROM {}", quote_identifier(table)?);
    let rows = link
        .conn()
        .fetch_all(sqlx::raw_sql(&sql))
        .await
        .map_err(statement_failed(&sql))?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        columns.push(ColumnStructure {
            field: text(row, "Field")?.unwrap_or_default(),
            column_type: text(row, "Type")?.unwrap_or_default(),
            null: text(row, "Null")?.unwrap_or_default(),
            key: text(row, "Key")?.unwrap_or_default(),
            default: text(row, "Default")?,
            extra: text(row, "Extra")?.unwrap_or_default(),
        });
    }
    Ok(columns)
}

pub async fn list_columns(link: &mut LiveLink, table: &str) -> Result<Vec<String>, HubError> {
    Ok(describe_columns(link, table)
        .await?
        .into_iter()
        .map(|c| c.field)
        .collect())
}

/// Primary-key columns in index order; empty when the table has none.
pub async fn list_primary_key(link: &mut LiveLink, table: &str) -> Result<Vec<String>, HubError> {
    let sql = format!(
        "SHOW KEYS FROM {} WHERE Key_name = 'PRIMARY'",
        quote_identifier(table)?
    );
    let rows = link
        .conn()
        .fetch_all(sqlx::raw_sql(&sql))
        .await
        .map_err(statement_failed(&sql))?;

    let mut keyed: Vec<(i64, String)> = Vec::with_capacity(rows.len());
    for (pos, row) in rows.iter().enumerate() {
        let seq = row
            .try_get::<i64, _>("Seq_in_index")
            .or_else(|_| row.try_get::<u32, _>("Seq_in_index").map(i64::from))
            .or_else(|_| row.try_get::<u64, _>("Seq_in_index").map(|v| v as i64))
            .unwrap_or(pos as i64);
        if let Some(col) = text(row, "Column_name")? {
            keyed.push((seq, col));
        }
    }
    keyed.sort_by_key(|(seq, _)| *seq);
    Ok(keyed.into_iter().map(|(_, col)| col).collect())
}

/// One page of rows ordered by `order_by` (the primary key when there is
/// one) so pages stay stable between requests.
pub async fn list_rows(
    link: &mut LiveLink,
    table: &str,
    order_by: &[String],
    page: u64,
) -> Result<RowPage, HubError> {
    let quoted_table = quote_identifier(table)?;

    let count_sql = format!("SELECT COUNT(*) FROM {quoted_table}");
    let total: i64 = sqlx::query_scalar(&count_sql)
        .fetch_one(link.conn())
        .await
        .map_err(statement_failed(&count_sql))?;
    let total = u64::try_from(total).unwrap_or(0);

    let (page, offset, last_page) = page_window(page, total);

    let order_clause = if order_by.is_empty() {
        String::new()
    } else {
        let cols = order_by
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Result<Vec<_>, _>>()?;
        format!(" ORDER BY {}", cols.join(", "))
    };
    let page_sql = format!("SELECT * FROM {quoted_table}{order_clause} LIMIT ? OFFSET ?");
    let rows = sqlx::query(&page_sql)
        .bind(PAGE_SIZE)
        .bind(offset)
        .fetch_all(link.conn())
        .await
        .map_err(statement_failed(&page_sql))?;

    Ok(RowPage {
        rows: rows.iter().map(row_to_map).collect(),
        total,
        current_page: page,
        last_page,
        per_page: PAGE_SIZE,
    })
}
