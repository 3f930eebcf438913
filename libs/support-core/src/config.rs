//! Environment-driven configuration.
//!
//! Settings are read through a `key -> Option<String>` lookup so the binary can
//! pass `std::env::var` while tests pass a map. Process settings all have
//! defaults. Secret groups are loaded separately because a broken secret must
//! only disable the connection that needs it.

use crate::CoreError;
use chrono_tz::Tz;
use std::{net::SocketAddr, str::FromStr, time::Duration};

pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Mexico_City;

#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
    pub max_connections: u32,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 3,
            backoff: Duration::from_millis(500),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl_seconds: u64,
    pub max_capacity: u64,
    pub redis_url: Option<String>,
}

/// Process-level settings. Malformed values stop start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub display_timezone: Tz,
    pub cache: CacheSettings,
    pub connect: ConnectSettings,
    pub operator_keys: Vec<String>,
}

impl Settings {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, CoreError> {
        let bind_addr = parse_or(lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;
        let display_timezone = match non_empty(lookup, "DISPLAY_TIMEZONE") {
            Some(name) => Tz::from_str(&name).map_err(|_| {
                CoreError::Configuration(format!("DISPLAY_TIMEZONE is not an IANA zone: {name}"))
            })?,
            None => DEFAULT_TIMEZONE,
        };

        let defaults = ConnectSettings::default();
        let connect = ConnectSettings {
            timeout: Duration::from_secs(parse_or(
                lookup,
                "CONNECT_TIMEOUT_SECONDS",
                Some(defaults.timeout.as_secs()),
            )?),
            retries: parse_or(lookup, "CONNECT_RETRIES", Some(defaults.retries))?,
            backoff: Duration::from_millis(parse_or(
                lookup,
                "CONNECT_BACKOFF_MS",
                Some(defaults.backoff.as_millis() as u64),
            )?),
            max_connections: parse_or(lookup, "DB_MAX_CONNECTIONS", Some(defaults.max_connections))?,
        };

        let cache = CacheSettings {
            ttl_seconds: parse_or(lookup, "QUERY_CACHE_TTL_SECONDS", Some(60))?,
            max_capacity: parse_or(lookup, "QUERY_CACHE_CAPACITY", Some(10_000))?,
            redis_url: non_empty(lookup, "REDIS_URL"),
        };

        let operator_keys = non_empty(lookup, "SUPPORT_API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            display_timezone,
            cache,
            connect,
            operator_keys,
        })
    }
}

/// Login material for one MySQL server.
#[derive(Clone)]
pub struct DatabaseCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct SshSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub private_key_pem: String,
    /// `SHA256:...` style fingerprint. Unset means any host key is accepted.
    pub host_fingerprint: Option<String>,
}

impl std::fmt::Debug for SshSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("host_fingerprint", &self.host_fingerprint)
            .finish_non_exhaustive()
    }
}

/// Bastion plus the database reached through it.
#[derive(Debug, Clone)]
pub struct PrimarySecrets {
    pub ssh: SshSettings,
    pub database: DatabaseCredentials,
}

impl PrimarySecrets {
    pub fn load(lookup: Lookup<'_>) -> Result<Self, CoreError> {
        let private_key_pem = match non_empty(lookup, "SSH_PRIVATE_KEY") {
            Some(inline) => inline.replace("\\n", "\n"),
            None => {
                let path = required(lookup, "SSH_PRIVATE_KEY_PATH").map_err(|_| {
                    CoreError::Configuration(
                        "one of SSH_PRIVATE_KEY or SSH_PRIVATE_KEY_PATH must be set".into(),
                    )
                })?;
                std::fs::read_to_string(&path).map_err(|e| {
                    CoreError::Configuration(format!("cannot read private key {path}: {e}"))
                })?
            }
        };

        let ssh = SshSettings {
            host: required(lookup, "SSH_HOST")?,
            port: parse_or(lookup, "SSH_PORT", Some(22))?,
            user: required(lookup, "SSH_USER")?,
            private_key_pem,
            host_fingerprint: non_empty(lookup, "SSH_HOST_FINGERPRINT"),
        };
        let database = DatabaseCredentials {
            host: required(lookup, "SQL_HOSTNAME")?,
            port: parse_or(lookup, "SQL_PORT", Some(3306))?,
            user: required(lookup, "SQL_USERNAME")?,
            password: required(lookup, "SQL_PASSWORD")?,
            database: required(lookup, "SQL_MAIN_DATABASE")?,
        };
        Ok(Self { ssh, database })
    }
}

/// Directly reachable auxiliary database. `Ok(None)` when not configured.
pub fn load_auxiliary(lookup: Lookup<'_>) -> Result<Option<DatabaseCredentials>, CoreError> {
    let Some(host) = non_empty(lookup, "AUX_SQL_HOSTNAME") else {
        return Ok(None);
    };
    Ok(Some(DatabaseCredentials {
        host,
        port: parse_or(lookup, "AUX_SQL_PORT", Some(3306))?,
        user: required(lookup, "AUX_SQL_USERNAME")?,
        password: required(lookup, "AUX_SQL_PASSWORD")?,
        database: required(lookup, "AUX_SQL_DATABASE")?,
    }))
}

fn non_empty(lookup: Lookup<'_>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(lookup: Lookup<'_>, key: &str) -> Result<String, CoreError> {
    non_empty(lookup, key).ok_or_else(|| CoreError::Configuration(format!("{key} must be set")))
}

fn parse_or<T: FromStr>(lookup: Lookup<'_>, key: &str, default: Option<T>) -> Result<T, CoreError> {
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| CoreError::Configuration(format!("{key} has an invalid value: {raw}"))),
        None => default.ok_or_else(|| CoreError::Configuration(format!("{key} must be set"))),
    }
}
