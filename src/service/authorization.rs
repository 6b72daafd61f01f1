use crate::db::{PermissionStore, User};
use crate::error::HubError;

/// Narrows discovered databases to what `user` may see, keeping the server's
/// order.
///
/// An empty allow-list means no restriction has been configured for the
/// pair and everything is visible. Whether that should instead deny access
/// until something is granted is an open product decision.
pub fn filter_databases(discovered: Vec<String>, user: &User, allow_list: &[String]) -> Vec<String> {
    if user.is_admin() || allow_list.is_empty() {
        return discovered;
    }
    discovered
        .into_iter()
        .filter(|db| allow_list.iter().any(|allowed| allowed == db))
        .collect()
}

/// Store-backed wrapper; reads the allow-list fresh on every call.
#[derive(Clone)]
pub struct DatabaseFilter {
    permissions: PermissionStore,
}

impl DatabaseFilter {
    pub fn new(permissions: PermissionStore) -> Self {
        Self { permissions }
    }

    pub async fn filter(
        &self,
        discovered: Vec<String>,
        user: &User,
        connection_id: i64,
    ) -> Result<Vec<String>, HubError> {
        if user.is_admin() {
            return Ok(discovered);
        }
        let allow_list = self
            .permissions
            .allowed_databases(user.id, connection_id)
            .await?;
        Ok(filter_databases(discovered, user, &allow_list))
    }
}
