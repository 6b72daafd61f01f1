//! Request-scoped links to target MySQL servers.
//!
//! Every acquisition builds its own immutable [`ConnectionProfile`] from the
//! stored record and opens exactly one physical connection. Nothing is kept
//! in shared state between requests, so concurrent requests against the same
//! or different connections cannot observe each other's schema.

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::{ConnectionRecord, PermissionStore, Secret, User};
use crate::error::HubError;
use crate::live::ident::validate_identifier;

const CHARSET: &str = "utf8mb4";
const COLLATION: &str = "utf8mb4_unicode_ci";

/// Everything needed to reach one server, optionally scoped to one schema.
#[derive(Clone, PartialEq)]
pub struct ConnectionProfile {
    pub connection_id: i64,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("connection_id", &self.connection_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionProfile {
    pub fn for_record(record: &ConnectionRecord, database: Option<&str>) -> Result<Self, HubError> {
        let password = match &record.password {
            Secret::Absent => None,
            Secret::Available(p) => Some(p.clone()),
            Secret::Unavailable => {
                return Err(HubError::connection(format!(
                    "stored password for connection `{}` is unavailable",
                    record.name
                )));
            }
        };
        let database = database
            .map(|db| validate_identifier(db).map(str::to_string))
            .transpose()?;
        Ok(Self {
            connection_id: record.id,
            host: record.host.clone(),
            port: record.port,
            username: record.database_user.clone(),
            password,
            database,
        })
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let mut opts = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .charset(CHARSET)
            .collation(COLLATION);
        if let Some(password) = self.password.as_deref() {
            opts = opts.password(password);
        }
        if let Some(db) = self.database.as_deref() {
            opts = opts.database(db);
        }
        opts
    }
}

/// One live connection for one unit of work.
pub struct LiveLink {
    conn: MySqlConnection,
    connection_id: i64,
    schema: Option<String>,
}

impl LiveLink {
    pub fn conn(&mut self) -> &mut MySqlConnection {
        &mut self.conn
    }

    pub fn connection_id(&self) -> i64 {
        self.connection_id
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Graceful close. Dropping the link also closes the socket, so early
    /// returns and panics still release it.
    pub async fn release(self) {
        let connection_id = self.connection_id;
        if let Err(e) = self.conn.close().await {
            warn!(connection_id, error = %e, "link did not close cleanly");
        } else {
            debug!(connection_id, "link released");
        }
    }
}

/// Explicit link factory: one profile in, one fresh connection out.
pub async fn new_link(profile: &ConnectionProfile, timeout: Duration) -> Result<LiveLink, HubError> {
    let opts = profile.connect_options();
    let conn = tokio::time::timeout(timeout, MySqlConnection::connect_with(&opts))
        .await
        .map_err(|_| {
            HubError::connection(format!(
                "timed out after {}ms reaching {}:{}",
                timeout.as_millis(),
                profile.host,
                profile.port
            ))
        })?
        .map_err(|e| {
            warn!(
                connection_id = profile.connection_id,
                host = %profile.host,
                port = profile.port,
                error = %e,
                "failed to open link"
            );
            HubError::connection(e)
        })?;

    debug!(
        connection_id = profile.connection_id,
        schema = profile.database.as_deref().unwrap_or("<none>"),
        "link opened"
    );
    Ok(LiveLink {
        conn,
        connection_id: profile.connection_id,
        schema: profile.database.clone(),
    })
}

/// Checks entitlement, then builds a profile and opens a link.
#[derive(Clone)]
pub struct LinkManager {
    permissions: PermissionStore,
    connect_timeout: Duration,
}

impl LinkManager {
    pub fn new(permissions: PermissionStore, connect_timeout: Duration) -> Self {
        Self {
            permissions,
            connect_timeout,
        }
    }

    /// Fails with [`HubError::Forbidden`] unless `user` holds a grant for the
    /// connection, and for a scoped link unless the schema passes the user's
    /// allow-list. No network traffic happens before both checks pass.
    pub async fn authorize(
        &self,
        record: &ConnectionRecord,
        user: &User,
        schema: Option<&str>,
    ) -> Result<(), HubError> {
        if !self.permissions.user_has_grant(user, record.id).await? {
            warn!(user_id = user.id, connection_id = record.id, "connection access denied");
            return Err(HubError::forbidden(
                "you are not authorized to use this connection",
            ));
        }
        if let Some(schema) = schema
            && !user.is_admin()
        {
            let allowed = self.permissions.allowed_databases(user.id, record.id).await?;
            if !allowed.is_empty() && !allowed.iter().any(|db| db == schema) {
                warn!(
                    user_id = user.id,
                    connection_id = record.id,
                    schema = %schema,
                    "schema outside allow-list"
                );
                return Err(HubError::forbidden(format!(
                    "you are not authorized to access database `{schema}`"
                )));
            }
        }
        Ok(())
    }

    pub async fn open_link(
        &self,
        record: &ConnectionRecord,
        user: &User,
        schema: Option<&str>,
    ) -> Result<LiveLink, HubError> {
        self.authorize(record, user, schema).await?;
        let profile = ConnectionProfile::for_record(record, schema)?;
        info!(
            user_id = user.id,
            connection_id = record.id,
            schema = schema.unwrap_or("<none>"),
            "opening link"
        );
        new_link(&profile, self.connect_timeout).await
    }
}
