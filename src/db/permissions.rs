use crate::db::credentials::summary_from_row;
use crate::db::models::{ConnectionSummary, Role, User};
use crate::db::sqlite::{SqlitePool, now_rfc3339};
use crate::error::HubError;
use std::collections::BTreeSet;
use tracing::info;

/// The two authorization relations: who may use a connection at all, and
/// which schemas a user may see within it.
#[derive(Clone)]
pub struct PermissionStore {
    pool: SqlitePool,
}

impl PermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the grant set of a connection with `user_ids` plus every
    /// current administrator, in one transaction. Returns the final set.
    pub async fn sync_grants(
        &self,
        connection_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<i64>, HubError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM connections WHERE id = ?")
            .bind(connection_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(HubError::NotFound(format!("connection {connection_id}")));
        }

        for &user_id in user_ids {
            let known: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
            if known.is_none() {
                return Err(HubError::validation(format!("user {user_id} does not exist")));
            }
        }

        let admins: Vec<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE role = ?")
            .bind(Role::Administrator.as_str())
            .fetch_all(&mut *tx)
            .await?;

        let final_set: BTreeSet<i64> = user_ids
            .iter()
            .copied()
            .chain(admins.into_iter().map(|(id,)| id))
            .collect();

        sqlx::query("DELETE FROM connection_user WHERE connection_id = ?")
            .bind(connection_id)
            .execute(&mut *tx)
            .await?;
        for user_id in &final_set {
            sqlx::query("INSERT INTO connection_user (connection_id, user_id) VALUES (?, ?)")
                .bind(connection_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(connection_id, granted = final_set.len(), "connection grants synced");
        Ok(final_set.into_iter().collect())
    }

    pub async fn granted_user_ids(&self, connection_id: i64) -> Result<Vec<i64>, HubError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM connection_user WHERE connection_id = ? ORDER BY user_id",
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Administrators are implicitly granted every connection.
    pub async fn user_has_grant(&self, user: &User, connection_id: i64) -> Result<bool, HubError> {
        if user.is_admin() {
            return Ok(true);
        }
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM connection_user WHERE connection_id = ? AND user_id = ?",
        )
        .bind(connection_id)
        .bind(user.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn connections_for_user(
        &self,
        user: &User,
    ) -> Result<Vec<ConnectionSummary>, HubError> {
        let rows = if user.is_admin() {
            sqlx::query(
                "SELECT id, name, host, port, database_user, updated_at FROM connections ORDER BY name",
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"SELECT c.id, c.name, c.host, c.port, c.database_user, c.updated_at
                   FROM connections c
                   JOIN connection_user cu ON cu.connection_id = c.id
                   WHERE cu.user_id = ?
                   ORDER BY c.name"#,
            )
            .bind(user.id)
            .fetch_all(&self.pool)
            .await?
        };
        rows.into_iter().map(summary_from_row).collect()
    }

    /// Allow-list for one (user, connection) pair. Empty means unrestricted.
    pub async fn allowed_databases(
        &self,
        user_id: i64,
        connection_id: i64,
    ) -> Result<Vec<String>, HubError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT database_name FROM database_permissions
               WHERE user_id = ? AND connection_id = ?
               ORDER BY database_name"#,
        )
        .bind(user_id)
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Delete-all-then-insert for one (user, connection) pair, all or nothing.
    /// Any failing insert (e.g. a duplicate name) rolls back the deletion too.
    pub async fn replace_allowed_databases(
        &self,
        user_id: i64,
        connection_id: i64,
        names: &[String],
    ) -> Result<(), HubError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM database_permissions WHERE user_id = ? AND connection_id = ?")
            .bind(user_id)
            .bind(connection_id)
            .execute(&mut *tx)
            .await?;

        let now = now_rfc3339();
        for name in names {
            sqlx::query(
                r#"INSERT INTO database_permissions (user_id, connection_id, database_name, created_at)
                   VALUES (?, ?, ?, ?)"#,
            )
            .bind(user_id)
            .bind(connection_id)
            .bind(name)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    HubError::validation(format!("database `{name}` listed more than once"))
                }
                other => other.into(),
            })?;
        }

        tx.commit().await?;
        info!(user_id, connection_id, allowed = names.len(), "database allow-list replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CredentialCipher;
    use crate::db::credentials::CredentialStore;
    use crate::db::models::ConnectionInput;
    use crate::db::sqlite::testing::{TempStore, temp_store};
    use crate::db::users::UserStore;

    struct Fixture {
        _store: TempStore,
        perms: PermissionStore,
        creds: CredentialStore,
        admin: User,
        dev: User,
        conn_id: i64,
    }

    async fn fixture(tag: &str) -> Fixture {
        let store = temp_store(tag).await;
        let users = UserStore::new(store.pool.clone());
        let creds = CredentialStore::new(
            store.pool.clone(),
            CredentialCipher::from_key_bytes(&[1u8; 32]).unwrap(),
        );
        let admin_id = users.ensure_admin("Root", "root@example.com").await.unwrap();
        let dev_id = users
            .create("Dev", "dev@example.com", Role::Developer)
            .await
            .unwrap();
        let conn_id = creds
            .create(ConnectionInput {
                name: "main".to_string(),
                host: "127.0.0.1".to_string(),
                port: 3306,
                database_user: "root".to_string(),
                database_password: Some("pw".to_string()),
            })
            .await
            .unwrap();
        Fixture {
            perms: PermissionStore::new(store.pool.clone()),
            admin: users.get(admin_id).await.unwrap().unwrap(),
            dev: users.get(dev_id).await.unwrap().unwrap(),
            creds,
            conn_id,
            _store: store,
        }
    }

    #[tokio::test]
    async fn grant_sync_replaces_and_always_includes_admins() {
        let f = fixture("perm-sync").await;

        let granted = f.perms.sync_grants(f.conn_id, &[f.dev.id]).await.unwrap();
        assert_eq!(granted, vec![f.admin.id, f.dev.id]);
        assert!(f.perms.user_has_grant(&f.dev, f.conn_id).await.unwrap());

        let granted = f.perms.sync_grants(f.conn_id, &[]).await.unwrap();
        assert_eq!(granted, vec![f.admin.id]);
        assert!(!f.perms.user_has_grant(&f.dev, f.conn_id).await.unwrap());
        assert!(f.perms.connections_for_user(&f.dev).await.unwrap().is_empty());
        assert_eq!(f.perms.connections_for_user(&f.admin).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_user_ids_leave_grants_untouched() {
        let f = fixture("perm-unknown").await;
        f.perms.sync_grants(f.conn_id, &[f.dev.id]).await.unwrap();

        let err = f.perms.sync_grants(f.conn_id, &[9999]).await.unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
        assert_eq!(
            f.perms.granted_user_ids(f.conn_id).await.unwrap(),
            vec![f.admin.id, f.dev.id]
        );
    }

    #[tokio::test]
    async fn failed_allow_list_replacement_keeps_previous_rows() {
        let f = fixture("perm-atomic").await;
        let old = vec!["app_db".to_string(), "reporting".to_string()];
        f.perms
            .replace_allowed_databases(f.dev.id, f.conn_id, &old)
            .await
            .unwrap();

        // second insert violates the unique triple after the delete already ran
        let broken = vec!["legacy".to_string(), "legacy".to_string()];
        let err = f
            .perms
            .replace_allowed_databases(f.dev.id, f.conn_id, &broken)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
        assert_eq!(
            f.perms.allowed_databases(f.dev.id, f.conn_id).await.unwrap(),
            old
        );

        f.perms
            .replace_allowed_databases(f.dev.id, f.conn_id, &["legacy".to_string()])
            .await
            .unwrap();
        assert_eq!(
            f.perms.allowed_databases(f.dev.id, f.conn_id).await.unwrap(),
            vec!["legacy".to_string()]
        );
    }

    #[tokio::test]
    async fn deleting_a_connection_cascades_to_its_grants() {
        let f = fixture("perm-cascade").await;
        f.perms.sync_grants(f.conn_id, &[f.dev.id]).await.unwrap();
        f.perms
            .replace_allowed_databases(f.dev.id, f.conn_id, &["app_db".to_string()])
            .await
            .unwrap();

        f.creds.delete(f.conn_id).await.unwrap();
        assert!(f.perms.granted_user_ids(f.conn_id).await.unwrap().is_empty());
        assert!(
            f.perms
                .allowed_databases(f.dev.id, f.conn_id)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
