use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
};
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::CredentialCipher;
use crate::db::{CredentialStore, PermissionStore, SqlitePool, UserStore};
use crate::handlers::{browse, connections, permissions};
use crate::live::LinkManager;
use crate::service::{BrowserService, LeadingKeyword};

/// Upper bound for request bodies; SQL text and row payloads stay well below.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct HubState {
    pub access_key: Arc<str>,
    pub users: UserStore,
    pub credentials: CredentialStore,
    pub permissions: PermissionStore,
    pub browser: BrowserService,
}

impl HubState {
    pub fn new(
        pool: SqlitePool,
        cipher: CredentialCipher,
        access_key: Arc<str>,
        connect_timeout: Duration,
    ) -> Self {
        let credentials = CredentialStore::new(pool.clone(), cipher);
        let permissions = PermissionStore::new(pool.clone());
        let links = LinkManager::new(permissions.clone(), connect_timeout);
        let browser = BrowserService::new(
            credentials.clone(),
            permissions.clone(),
            links,
            Arc::new(LeadingKeyword::default()),
        );
        Self {
            access_key,
            users: UserStore::new(pool),
            credentials,
            permissions,
            browser,
        }
    }
}

pub fn hub_router(state: HubState) -> Router {
    Router::new()
        .route("/dashboard", get(browse::dashboard))
        .route(
            "/connections",
            get(connections::list_connections).post(connections::create_connection),
        )
        .route(
            "/connections/{connection}",
            patch(connections::update_connection).delete(connections::delete_connection),
        )
        .route(
            "/connections/{connection}/permissions",
            get(permissions::edit_grants).patch(permissions::sync_grants),
        )
        .route(
            "/connections/{connection}/users/{user}/db-permissions",
            get(permissions::database_permissions).post(permissions::replace_database_permissions),
        )
        .route("/connections/{connection}/databases", get(browse::databases))
        .route(
            "/connections/{connection}/databases/{db}/tables",
            get(browse::tables),
        )
        .route("/connections/{connection}/databases/{db}/sql", get(browse::sql_page))
        .route(
            "/connections/{connection}/databases/{db}/execute-sql",
            post(browse::execute_sql),
        )
        .route(
            "/connections/{connection}/databases/{db}/tables/{table}",
            get(browse::table_data),
        )
        .route(
            "/connections/{connection}/databases/{db}/tables/{table}/structure",
            get(browse::table_structure),
        )
        .route(
            "/connections/{connection}/databases/{db}/tables/{table}/row",
            patch(browse::update_row).delete(browse::delete_row),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
