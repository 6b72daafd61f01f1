use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::HubError;

/// Process-wide settings, resolved once on first access.
pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid QueryHub configuration"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite URL of the metadata store (connections, grants, allow-lists).
    pub database_url: String,
    pub listen_addr: String,
    pub loglevel: String,
    /// Shared key the fronting layer presents on every request.
    pub access_key: String,
    /// Base64 encoded 32 byte key used to seal stored passwords.
    pub app_key: String,
    pub connect_timeout_secs: u64,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:queryhub.sqlite".to_string(),
            listen_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            access_key: String::new(),
            app_key: String::new(),
            connect_timeout_secs: 10,
            bootstrap_admin_email: None,
            bootstrap_admin_name: "Administrator".to_string(),
        }
    }
}

impl Config {
    /// Defaults, overridden by `QUERYHUB_*` environment variables.
    /// `.env` is expected to be loaded by the caller beforehand.
    pub fn load() -> Result<Self, HubError> {
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("QUERYHUB_"))
            .extract()
            .map_err(|e| HubError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), HubError> {
        if self.access_key.trim().is_empty() {
            return Err(HubError::Config(
                "QUERYHUB_ACCESS_KEY must be set".to_string(),
            ));
        }
        if self.app_key.trim().is_empty() {
            return Err(HubError::Config("QUERYHUB_APP_KEY must be set".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(HubError::Config(
                "QUERYHUB_CONNECT_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_require_keys() {
        let cfg = Config::default();
        assert!(matches!(cfg.validate(), Err(HubError::Config(_))));
    }

    #[test]
    fn env_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("QUERYHUB_ACCESS_KEY", "gate");
            jail.set_env("QUERYHUB_APP_KEY", "base64:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
            jail.set_env("QUERYHUB_CONNECT_TIMEOUT_SECS", "3");
            let cfg = Config::load().expect("config should load");
            assert_eq!(cfg.access_key, "gate");
            assert_eq!(cfg.connect_timeout(), Duration::from_secs(3));
            assert_eq!(cfg.listen_addr, "0.0.0.0:8000");
            Ok(())
        });
    }
}
