//! Request-level orchestration of the live engine.
//!
//! Each operation loads the stored record, opens a schema-scoped link for its
//! primary content, and only afterwards opens a separate server-level link for
//! the layout (visible databases). The two links never share session state.
//! A link is released on every path once its work has finished, before any
//! error is propagated.
//! Layout failures degrade to an empty list plus `layout_error`; failures of
//! the primary content are returned to the caller.

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::db::{ConnectionRecord, CredentialStore, PermissionStore, User};
use crate::error::HubError;
use crate::live::discovery::{self, ColumnStructure, RowPage};
use crate::live::link::{LinkManager, LiveLink};
use crate::live::mutation::{self, MutationOutcome};
use crate::live::query::{self, QueryOutcome};
use crate::live::value::RowMap;
use crate::service::authorization::DatabaseFilter;
use crate::service::classifier::StatementClassifier;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub user_connections: Vec<ConnectionRef>,
    pub databases: Vec<String>,
    pub selected_connection_id: i64,
    pub layout_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TablesPage {
    #[serde(flatten)]
    pub layout: Layout,
    pub selected_database_name: String,
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TableDataPage {
    #[serde(flatten)]
    pub layout: Layout,
    pub selected_database_name: String,
    pub tables: Vec<String>,
    pub selected_table_name: String,
    pub columns: Vec<String>,
    pub primary_key_columns: Vec<String>,
    pub rows: RowPage,
}

#[derive(Debug, Serialize)]
pub struct TableStructurePage {
    #[serde(flatten)]
    pub layout: Layout,
    pub selected_database_name: String,
    pub tables: Vec<String>,
    pub selected_table_name: String,
    pub structure: Vec<ColumnStructure>,
}

#[derive(Debug, Serialize)]
pub struct SqlPage {
    #[serde(flatten)]
    pub layout: Layout,
    pub selected_database_name: String,
    pub sql_query: Option<String>,
    pub result: Option<QueryOutcome>,
}

#[derive(Debug, Serialize)]
pub struct DatabasePermissionsView {
    pub all_databases: Vec<String>,
    pub allowed_databases: Vec<String>,
}

#[derive(Clone)]
pub struct BrowserService {
    credentials: CredentialStore,
    permissions: PermissionStore,
    links: LinkManager,
    filter: DatabaseFilter,
    classifier: Arc<dyn StatementClassifier>,
}

impl BrowserService {
    pub fn new(
        credentials: CredentialStore,
        permissions: PermissionStore,
        links: LinkManager,
        classifier: Arc<dyn StatementClassifier>,
    ) -> Self {
        Self {
            filter: DatabaseFilter::new(permissions.clone()),
            credentials,
            permissions,
            links,
            classifier,
        }
    }

    pub async fn user_connections(&self, user: &User) -> Result<Vec<ConnectionRef>, HubError> {
        Ok(self
            .permissions
            .connections_for_user(user)
            .await?
            .into_iter()
            .map(|c| ConnectionRef {
                id: c.id,
                name: c.name,
            })
            .collect())
    }

    /// Databases on the server that `user` may see, discovered live.
    pub async fn visible_databases(
        &self,
        user: &User,
        record: &ConnectionRecord,
    ) -> Result<Vec<String>, HubError> {
        let mut link = self.links.open_link(record, user, None).await?;
        let discovered = discovery::list_databases(&mut link).await;
        link.release().await;
        self.filter.filter(discovered?, user, record.id).await
    }

    /// Never fails; problems are carried in `layout_error`.
    pub async fn layout(&self, user: &User, record: &ConnectionRecord) -> Layout {
        let user_connections = self.user_connections(user).await.unwrap_or_else(|e| {
            warn!(user_id = user.id, error = %e, "failed to load user connections");
            Vec::new()
        });
        let (databases, layout_error) = match self.visible_databases(user, record).await {
            Ok(dbs) => (dbs, None),
            Err(e) => {
                warn!(
                    user_id = user.id,
                    connection_id = record.id,
                    error = %e,
                    "layout discovery failed"
                );
                (Vec::new(), Some(e.to_string()))
            }
        };
        Layout {
            user_connections,
            databases,
            selected_connection_id: record.id,
            layout_error,
        }
    }

    /// The database list screen. Entitlement is checked up front so a missing
    /// grant is a 403, not a degraded layout.
    pub async fn databases(&self, user: &User, connection_id: i64) -> Result<Layout, HubError> {
        let record = self.credentials.get(connection_id).await?;
        self.links.authorize(&record, user, None).await?;
        Ok(self.layout(user, &record).await)
    }

    pub async fn tables(
        &self,
        user: &User,
        connection_id: i64,
        database: &str,
    ) -> Result<TablesPage, HubError> {
        let record = self.credentials.get(connection_id).await?;
        let mut link = self.links.open_link(&record, user, Some(database)).await?;
        let tables = discovery::list_tables(&mut link).await;
        link.release().await;
        let tables = tables?;
        Ok(TablesPage {
            layout: self.layout(user, &record).await,
            selected_database_name: database.to_string(),
            tables,
        })
    }

    pub async fn table_data(
        &self,
        user: &User,
        connection_id: i64,
        database: &str,
        table: &str,
        page: u64,
    ) -> Result<TableDataPage, HubError> {
        let record = self.credentials.get(connection_id).await?;
        let mut link = self.links.open_link(&record, user, Some(database)).await?;
        let content = table_content(&mut link, table, page).await;
        link.release().await;
        let (tables, columns, primary_key_columns, rows) = content?;
        Ok(TableDataPage {
            layout: self.layout(user, &record).await,
            selected_database_name: database.to_string(),
            tables,
            selected_table_name: table.to_string(),
            columns,
            primary_key_columns,
            rows,
        })
    }

    pub async fn table_structure(
        &self,
        user: &User,
        connection_id: i64,
        database: &str,
        table: &str,
    ) -> Result<TableStructurePage, HubError> {
        let record = self.credentials.get(connection_id).await?;
        let mut link = self.links.open_link(&record, user, Some(database)).await?;
        let content = structure_content(&mut link, table).await;
        link.release().await;
        let (tables, structure) = content?;
        Ok(TableStructurePage {
            layout: self.layout(user, &record).await,
            selected_database_name: database.to_string(),
            tables,
            selected_table_name: table.to_string(),
            structure,
        })
    }

    /// Empty SQL tab for a database.
    pub async fn sql_page(
        &self,
        user: &User,
        connection_id: i64,
        database: &str,
    ) -> Result<SqlPage, HubError> {
        let record = self.credentials.get(connection_id).await?;
        self.links.authorize(&record, user, Some(database)).await?;
        Ok(SqlPage {
            layout: self.layout(user, &record).await,
            selected_database_name: database.to_string(),
            sql_query: None,
            result: None,
        })
    }

    pub async fn execute_sql(
        &self,
        user: &User,
        connection_id: i64,
        database: &str,
        sql: &str,
    ) -> Result<SqlPage, HubError> {
        let record = self.credentials.get(connection_id).await?;
        let mut link = self.links.open_link(&record, user, Some(database)).await?;
        let outcome = query::execute(&mut link, self.classifier.as_ref(), sql).await;
        link.release().await;
        let outcome = outcome?;
        Ok(SqlPage {
            layout: self.layout(user, &record).await,
            selected_database_name: database.to_string(),
            sql_query: Some(sql.to_string()),
            result: Some(outcome),
        })
    }

    /// Returns the affected row count; a key matching nothing is
    /// [`HubError::RowNotFound`].
    pub async fn delete_row(
        &self,
        user: &User,
        connection_id: i64,
        database: &str,
        table: &str,
        row: &RowMap,
    ) -> Result<u64, HubError> {
        let record = self.credentials.get(connection_id).await?;
        let mut link = self.links.open_link(&record, user, Some(database)).await?;
        let outcome = mutation::delete_row(&mut link, table, row).await;
        link.release().await;
        applied(outcome?)
    }

    pub async fn update_row(
        &self,
        user: &User,
        connection_id: i64,
        database: &str,
        table: &str,
        row: &RowMap,
        changes: &RowMap,
    ) -> Result<u64, HubError> {
        let record = self.credentials.get(connection_id).await?;
        let mut link = self.links.open_link(&record, user, Some(database)).await?;
        let outcome = mutation::update_row(&mut link, table, row, changes).await;
        link.release().await;
        applied(outcome?)
    }

    /// Every database on the server next to `target_user`'s allow-list, for
    /// the permission editor.
    pub async fn database_permissions(
        &self,
        admin: &User,
        connection_id: i64,
        target_user_id: i64,
    ) -> Result<DatabasePermissionsView, HubError> {
        let record = self.credentials.get(connection_id).await?;
        let mut link = self.links.open_link(&record, admin, None).await?;
        let all_databases = discovery::list_databases(&mut link).await;
        link.release().await;
        let all_databases = all_databases?;
        let allowed_databases = self
            .permissions
            .allowed_databases(target_user_id, connection_id)
            .await?;
        Ok(DatabasePermissionsView {
            all_databases,
            allowed_databases,
        })
    }
}

async fn table_content(
    link: &mut LiveLink,
    table: &str,
    page: u64,
) -> Result<(Vec<String>, Vec<String>, Vec<String>, RowPage), HubError> {
    let tables = discovery::list_tables(link).await?;
    let columns = discovery::list_columns(link, table).await?;
    let primary_key = discovery::list_primary_key(link, table).await?;
    let rows = discovery::list_rows(link, table, &primary_key, page).await?;
    Ok((tables, columns, primary_key, rows))
}

async fn structure_content(
    link: &mut LiveLink,
    table: &str,
) -> Result<(Vec<String>, Vec<ColumnStructure>), HubError> {
    let tables = discovery::list_tables(link).await?;
    let structure = discovery::describe_columns(link, table).await?;
    Ok((tables, structure))
}

fn applied(outcome: MutationOutcome) -> Result<u64, HubError> {
    match outcome {
        MutationOutcome::Applied { affected_rows } => Ok(affected_rows),
        MutationOutcome::NotFound => Err(HubError::RowNotFound),
    }
}
