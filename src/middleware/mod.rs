pub mod auth;

pub use auth::{AdminUser, AuthUser, ensure_authorized};
