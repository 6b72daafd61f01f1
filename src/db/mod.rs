//! Database module: the metadata store (users, connections, grants).
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and conversions
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `credentials.rs`: connection records, sealing passwords at the boundary
//! - `permissions.rs`: connection grants and per-database allow-lists
//! - `users.rs`: minimal user directory

pub mod credentials;
pub mod models;
pub mod permissions;
pub mod schema;
pub mod sqlite;
pub mod users;

pub use credentials::CredentialStore;
pub use models::{ConnectionInput, ConnectionRecord, ConnectionSummary, Role, Secret, User};
pub use permissions::PermissionStore;
pub use schema::SQLITE_INIT;
pub use sqlite::SqlitePool;
pub use users::UserStore;
