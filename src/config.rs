use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub max_connections: u32,
    /// How long a connection waits for sqlite's write lock before giving up.
    pub busy_timeout: Duration,
    pub admin: Option<AdminSeed>,
}

/// Credentials for the admin account created on first start.
#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

impl AppConfig {
    /// Reads the configuration from the process environment, after loading `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: bind_addr.clone(),
        })?;

        let log_filter = lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let mut max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(value) => match value.parse::<u32>() {
                Ok(parsed) if parsed > 0 => parsed,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "DB_MAX_CONNECTIONS",
                        value,
                    })
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };
        // Every pooled connection to `:memory:` would open its own empty database.
        if database_url.contains(":memory:") {
            max_connections = 1;
        }

        let busy_timeout = match lookup("DB_BUSY_TIMEOUT_MS") {
            Some(value) => match value.parse::<u64>() {
                Ok(millis) => Duration::from_millis(millis),
                Err(_) => {
                    return Err(ConfigError::Invalid {
                        key: "DB_BUSY_TIMEOUT_MS",
                        value,
                    })
                }
            },
            None => Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        };

        let admin = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            _ => None,
        };

        Ok(AppConfig {
            database_url,
            bind_addr,
            log_filter,
            max_connections,
            busy_timeout,
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(
            config_from(&[]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("DATABASE_URL", "sqlite://pos.db?mode=rwc")]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert!(config.admin.is_none());
    }

    #[test]
    fn in_memory_sqlite_uses_a_single_connection() {
        let config = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DB_MAX_CONNECTIONS", "8"),
        ])
        .unwrap();
        assert_eq!(config.max_connections, 1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = config_from(&[("DATABASE_URL", "sqlite::memory:"), ("BIND_ADDR", "nope")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BIND_ADDR", .. }));

        let err = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DB_MAX_CONNECTIONS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. }));

        let err = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DB_BUSY_TIMEOUT_MS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_BUSY_TIMEOUT_MS", .. }));
    }

    #[test]
    fn admin_seed_needs_both_values() {
        let config = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("ADMIN_EMAIL", "admin@pos.local"),
        ])
        .unwrap();
        assert!(config.admin.is_none());

        let config = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("ADMIN_EMAIL", "admin@pos.local"),
            ("ADMIN_PASSWORD", "Secret15"),
        ])
        .unwrap();
        assert_eq!(config.admin.unwrap().email, "admin@pos.local");
    }
}
