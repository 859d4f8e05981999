use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelf_types::{BookId, Role, UserId};

use crate::error::{ServerError, ServerResult};

/// Process configuration, read from a TOML file.
///
/// ```toml
/// bind_addr = "0.0.0.0:8080"
/// data_dir = "/var/lib/shelf"
/// request_timeout_ms = 2000
///
/// [consumer]
/// max_redeliveries = 3
///
/// [[tokens]]
/// token = "s3cret"
/// user_id = 1
/// role = "admin"
///
/// [[books]]
/// id = 7
/// stock = 3
///
/// [settings]
/// max_borrow_limit = 5
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Queue WAL directory. Without one the queue lives in memory only.
    pub data_dir: Option<PathBuf>,
    /// fsync the queue WAL on every write.
    pub fsync_every_write: bool,
    pub request_timeout_ms: u64,
    pub log_format: LogFormat,
    pub serialize_borrows: bool,
    pub consumer: ConsumerSection,
    pub tokens: Vec<TokenEntry>,
    /// Books known to the catalog at startup.
    pub books: Vec<BookSeed>,
    /// Seeds for the configuration store; unset keys take their defaults.
    pub settings: BTreeMap<String, toml::Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: None,
            fsync_every_write: false,
            request_timeout_ms: 2000,
            log_format: LogFormat::default(),
            serialize_borrows: true,
            consumer: ConsumerSection::default(),
            tokens: Vec::new(),
            books: Vec::new(),
            settings: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(source: &str) -> ServerResult<Self> {
        toml::from_str(source).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(ServerError::Config("request_timeout_ms must be positive".into()));
        }

        let mut seen = HashSet::new();
        for entry in &self.tokens {
            if entry.token.trim().is_empty() {
                return Err(ServerError::Config(format!(
                    "empty token for user {}",
                    entry.user_id
                )));
            }
            if !seen.insert(entry.token.as_str()) {
                return Err(ServerError::Config(format!(
                    "token for user {} is listed twice",
                    entry.user_id
                )));
            }
        }

        for book in &self.books {
            if book.stock < 0 {
                return Err(ServerError::Config(format!(
                    "book {} has negative stock {}",
                    book.id, book.stock
                )));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `[settings]` as configuration-store strings.
    pub fn settings_seed(&self) -> BTreeMap<String, String> {
        self.settings
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSection {
    pub max_redeliveries: u32,
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self { max_redeliveries: 3 }
    }
}

/// Maps a bearer token to the caller it authenticates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: UserId,
    #[serde(default)]
    pub role: Role,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSeed {
    pub id: BookId,
    pub stock: i64,
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}` (expected pretty or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.request_timeout(), Duration::from_secs(2));
        assert_eq!(c.consumer.max_redeliveries, 3);
        assert!(c.serialize_borrows);
        assert!(c.data_dir.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parses_full_file() {
        let c = ServerConfig::from_toml(
            r#"
            bind_addr = "0.0.0.0:9000"
            data_dir = "/tmp/shelf"
            log_format = "json"

            [consumer]
            max_redeliveries = 5

            [[tokens]]
            token = "admin-token"
            user_id = 1
            role = "admin"

            [[tokens]]
            token = "reader-token"
            user_id = 2

            [[books]]
            id = 7
            stock = 3

            [settings]
            max_borrow_limit = 5
            fine_unit = "hour"
            "#,
        )
        .unwrap();

        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.data_dir, Some(PathBuf::from("/tmp/shelf")));
        assert_eq!(c.log_format, LogFormat::Json);
        assert_eq!(c.consumer.max_redeliveries, 5);
        assert_eq!(c.tokens[0].role, Role::Admin);
        assert_eq!(c.tokens[1].role, Role::User);
        assert_eq!(c.books, vec![BookSeed { id: BookId::new(7), stock: 3 }]);

        let seed = c.settings_seed();
        assert_eq!(seed["max_borrow_limit"], "5");
        assert_eq!(seed["fine_unit"], "hour");
    }

    #[test]
    fn duplicate_tokens_are_rejected() {
        let c = ServerConfig::from_toml(
            r#"
            [[tokens]]
            token = "t"
            user_id = 1

            [[tokens]]
            token = "t"
            user_id = 2
            "#,
        )
        .unwrap();
        assert!(matches!(c.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn unknown_log_format() {
        assert!(ServerConfig::from_toml(r#"log_format = "xml""#).is_err());
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
