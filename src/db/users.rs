use crate::db::models::{Role, User};
use crate::db::sqlite::{SqlitePool, now_rfc3339};
use crate::error::HubError;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Minimal user directory. Identities are authenticated upstream; this only
/// resolves ids to roles and feeds grant bookkeeping.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, email: &str, role: Role) -> Result<i64, HubError> {
        let res = sqlx::query("INSERT INTO users (name, email, role, created_at) VALUES (?, ?, ?, ?)")
            .bind(name)
            .bind(email)
            .bind(role.as_str())
            .bind(now_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    HubError::validation(format!("email `{email}` is already registered"))
                }
                other => other.into(),
            })?;
        Ok(res.last_insert_rowid())
    }

    /// Upsert by unique email, forcing the Administrator role. Returns the row id.
    pub async fn ensure_admin(&self, name: &str, email: &str) -> Result<i64, HubError> {
        sqlx::query(
            r#"
            INSERT INTO users (name, email, role, created_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(Role::Administrator.as_str())
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;

        let rec: (i64,) = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>, HubError> {
        let row = sqlx::query("SELECT id, name, email, role FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_model).transpose()
    }

    pub async fn list(&self) -> Result<Vec<User>, HubError> {
        let rows = sqlx::query("SELECT id, name, email, role FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    fn row_to_model(row: SqliteRow) -> Result<User, HubError> {
        let role_raw: String = row.try_get("role")?;
        let role = role_raw
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role,
        })
    }
}
