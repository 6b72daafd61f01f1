//! SQL DDL for initializing the metadata store.
//! SQLite-first design; statements are idempotent and split on `;`.

/// SQLite schema with:
/// - `users`: identities asserted by the fronting layer, `role` is
///   `Administrator` or `Developer`
/// - `connections`: target servers, password only in sealed form
/// - `connection_user`: grant join table, cascades with either side
/// - `database_permissions`: per (user, connection) schema allow-list,
///   unique per triple
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL DEFAULT 'Developer',
    created_at TEXT NOT NULL -- RFC3339
);

CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    database_user TEXT NOT NULL,
    database_password_encrypted TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS connection_user (
    connection_id INTEGER NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (connection_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_connection_user_user ON connection_user(user_id);

CREATE TABLE IF NOT EXISTS database_permissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    connection_id INTEGER NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
    database_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, connection_id, database_name)
);
"#;
