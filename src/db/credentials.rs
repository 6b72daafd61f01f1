use crate::crypto::CredentialCipher;
use crate::db::models::{ConnectionInput, ConnectionRecord, ConnectionSummary, Secret};
use crate::db::sqlite::{SqlitePool, now_rfc3339, parse_timestamp};
use crate::error::HubError;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::{info, warn};

/// Column name, also used as the AAD for sealed values.
const PASSWORD_COLUMN: &str = "database_password_encrypted";

/// Persisted connection records. Passwords cross this boundary only as
/// plaintext going in and [`Secret`] coming out.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
    cipher: CredentialCipher,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }

    /// An empty password is treated as not submitted.
    fn seal(&self, password: Option<&str>) -> Result<Option<String>, HubError> {
        password
            .filter(|p| !p.is_empty())
            .map(|p| self.cipher.encrypt(p, PASSWORD_COLUMN))
            .transpose()
    }

    fn open(&self, id: i64, sealed: Option<String>) -> Secret {
        match sealed {
            None => Secret::Absent,
            Some(value) => match self.cipher.decrypt(&value, PASSWORD_COLUMN) {
                Ok(plain) => Secret::Available(plain),
                Err(e) => {
                    warn!(connection_id = id, error = %e, "stored password could not be decrypted");
                    Secret::Unavailable
                }
            },
        }
    }

    pub async fn create(&self, input: ConnectionInput) -> Result<i64, HubError> {
        let port = input.validate()?;
        let sealed = self.seal(input.database_password.as_deref())?;
        let now = now_rfc3339();
        let res = sqlx::query(
            r#"
            INSERT INTO connections (
                name, host, port, database_user, database_password_encrypted,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.name)
        .bind(&input.host)
        .bind(i64::from(port))
        .bind(&input.database_user)
        .bind(sealed)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| name_conflict(e, &input.name))?;

        let id = res.last_insert_rowid();
        info!(connection_id = id, name = %input.name, "connection created");
        Ok(id)
    }

    /// Update all fields by id. A `None` or empty password keeps the stored one.
    pub async fn update(&self, id: i64, input: ConnectionInput) -> Result<(), HubError> {
        let port = input.validate()?;
        let now = now_rfc3339();
        let res = match self.seal(input.database_password.as_deref())? {
            Some(sealed) => {
                sqlx::query(
                    r#"UPDATE connections SET
                        name = ?, host = ?, port = ?, database_user = ?,
                        database_password_encrypted = ?, updated_at = ?
                      WHERE id = ?"#,
                )
                .bind(&input.name)
                .bind(&input.host)
                .bind(i64::from(port))
                .bind(&input.database_user)
                .bind(sealed)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"UPDATE connections SET
                        name = ?, host = ?, port = ?, database_user = ?, updated_at = ?
                      WHERE id = ?"#,
                )
                .bind(&input.name)
                .bind(&input.host)
                .bind(i64::from(port))
                .bind(&input.database_user)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|e| name_conflict(e, &input.name))?;

        if res.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("connection {id}")));
        }
        info!(connection_id = id, "connection updated");
        Ok(())
    }

    /// Grants and allow-list rows go with it (ON DELETE CASCADE).
    pub async fn delete(&self, id: i64) -> Result<(), HubError> {
        let res = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("connection {id}")));
        }
        info!(connection_id = id, "connection removed");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<ConnectionRecord, HubError> {
        let row = sqlx::query(
            r#"SELECT id, name, host, port, database_user, database_password_encrypted
               FROM connections WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("connection {id}")))?;

        let sealed: Option<String> = row.try_get(PASSWORD_COLUMN)?;
        let port: i64 = row.try_get("port")?;
        Ok(ConnectionRecord {
            id,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            port: decode_port(port)?,
            database_user: row.try_get("database_user")?,
            password: self.open(id, sealed),
        })
    }

    pub async fn list(&self) -> Result<Vec<ConnectionSummary>, HubError> {
        let rows = sqlx::query(
            "SELECT id, name, host, port, database_user, updated_at FROM connections ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(summary_from_row).collect()
    }
}

pub(crate) fn summary_from_row(row: SqliteRow) -> Result<ConnectionSummary, HubError> {
    let port: i64 = row.try_get("port")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(ConnectionSummary {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        host: row.try_get("host")?,
        port: decode_port(port)?,
        database_user: row.try_get("database_user")?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn decode_port(raw: i64) -> Result<u16, sqlx::Error> {
    u16::try_from(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn name_conflict(err: sqlx::Error, name: &str) -> HubError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            HubError::validation(format!("a connection named `{name}` already exists"))
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::testing::temp_store;

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_key_bytes(&[3u8; 32]).unwrap()
    }

    fn input(name: &str, password: Option<&str>) -> ConnectionInput {
        ConnectionInput {
            name: name.to_string(),
            host: "127.0.0.1".to_string(),
            port: 3306,
            database_user: "root".to_string(),
            database_password: password.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn password_round_trips_and_is_never_stored_in_plaintext() {
        let store = temp_store("cred-roundtrip").await;
        let creds = CredentialStore::new(store.pool.clone(), cipher());

        let id = creds.create(input("main", Some("hunter2"))).await.unwrap();
        assert_eq!(creds.get(id).await.unwrap().password(), Some("hunter2"));

        let (raw,): (Option<String>,) =
            sqlx::query_as("SELECT database_password_encrypted FROM connections WHERE id = ?")
                .bind(id)
                .fetch_one(&store.pool)
                .await
                .unwrap();
        let raw = raw.unwrap();
        assert!(!raw.contains("hunter2"));
    }

    #[tokio::test]
    async fn corrupted_ciphertext_reads_back_as_unavailable() {
        let store = temp_store("cred-corrupt").await;
        let creds = CredentialStore::new(store.pool.clone(), cipher());
        let id = creds.create(input("main", Some("hunter2"))).await.unwrap();

        sqlx::query("UPDATE connections SET database_password_encrypted = 'garbage' WHERE id = ?")
            .bind(id)
            .execute(&store.pool)
            .await
            .unwrap();

        let record = creds.get(id).await.unwrap();
        assert_eq!(record.password(), None);
        assert_eq!(record.password, Secret::Unavailable);

        let other_key = CredentialStore::new(
            store.pool.clone(),
            CredentialCipher::from_key_bytes(&[9u8; 32]).unwrap(),
        );
        let id2 = creds.create(input("second", Some("pw"))).await.unwrap();
        assert_eq!(other_key.get(id2).await.unwrap().password(), None);
    }

    #[tokio::test]
    async fn update_without_password_keeps_the_stored_one() {
        let store = temp_store("cred-update").await;
        let creds = CredentialStore::new(store.pool.clone(), cipher());
        let id = creds.create(input("main", Some("first"))).await.unwrap();

        let mut change = input("renamed", None);
        change.port = 3307;
        creds.update(id, change).await.unwrap();
        let record = creds.get(id).await.unwrap();
        assert_eq!(record.name, "renamed");
        assert_eq!(record.port, 3307);
        assert_eq!(record.password(), Some("first"));

        creds.update(id, input("renamed", Some("second"))).await.unwrap();
        assert_eq!(creds.get(id).await.unwrap().password(), Some("second"));
    }

    #[tokio::test]
    async fn names_are_unique_and_missing_ids_are_not_found() {
        let store = temp_store("cred-unique").await;
        let creds = CredentialStore::new(store.pool.clone(), cipher());
        creds.create(input("main", None)).await.unwrap();
        assert!(matches!(
            creds.create(input("main", None)).await,
            Err(HubError::Validation(_))
        ));
        assert!(matches!(creds.get(42).await, Err(HubError::NotFound(_))));
        assert!(matches!(creds.delete(42).await, Err(HubError::NotFound(_))));
        let listed = creds.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(creds.get(listed[0].id).await.unwrap().password, Secret::Absent);
    }
}
