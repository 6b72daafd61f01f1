use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use headers::{Authorization, HeaderMapExt, authorization::Bearer};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::db::User;
use crate::error::HubError;
use crate::router::HubState;

pub const KEY_HEADER: &str = "x-queryhub-key";
pub const USER_HEADER: &str = "x-queryhub-user";

fn key_matches(candidate: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}

/// Ensure the request was forwarded by the trusted fronting layer.
/// Accepts either:
/// - Header: `x-queryhub-key: ...`
/// - Header: `Authorization: Bearer ...`
/// - Query string: `?key=...`
pub fn ensure_authorized(
    headers: &HeaderMap,
    query: Option<&str>,
    expected: &str,
) -> Result<(), HubError> {
    if let Some(hv) = headers.get(KEY_HEADER).and_then(|v| v.to_str().ok())
        && key_matches(hv.trim(), expected)
    {
        return Ok(());
    }

    if let Some(auth) = headers.typed_get::<Authorization<Bearer>>()
        && key_matches(auth.token(), expected)
    {
        return Ok(());
    }

    if let Some(qs) = query {
        for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
            if k == "key" && key_matches(&v, expected) {
                return Ok(());
            }
        }
    }

    Err(HubError::Unauthenticated)
}

/// Any known user behind a valid gateway key.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<HubState> for AuthUser {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HubState,
    ) -> Result<Self, Self::Rejection> {
        ensure_authorized(&parts.headers, parts.uri.query(), &state.access_key)?;

        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or(HubError::Unauthenticated)?;

        match state.users.get(user_id).await? {
            Some(user) => Ok(Self(user)),
            None => {
                warn!(user_id, "request asserted an unknown user");
                Err(HubError::Unauthenticated)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<HubState> for AdminUser {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HubState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            warn!(user_id = user.id, path = %parts.uri.path(), "admin route refused");
            return Err(HubError::forbidden("this action requires an administrator"));
        }
        Ok(Self(user))
    }
}
