//! Connection descriptors and the working configuration derived from them.
//!
//! A descriptor is a URL of the form
//! `scheme://[user[:password]@]host[:port]/[database]` plus optional typed
//! overrides. Fields present in the URL always win; overrides only fill the
//! gaps, and whatever is still missing falls back to `localhost:5432`.

use std::fmt;

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tokio_postgres::config::SslMode;
use url::Url;

use crate::error::{AdapterError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;

/// Structured connection settings that supplement a descriptor URL.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl: Option<bool>,
    pub application_name: Option<String>,
}

impl fmt::Debug for ConnectionOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOverrides")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl", &self.ssl)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// What a caller hands the acquirer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub url: String,
    pub overrides: Option<ConnectionOverrides>,
}

impl ConnectionDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            overrides: None,
        }
    }

    pub fn with_overrides(mut self, overrides: ConnectionOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

impl From<&str> for ConnectionDescriptor {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for ConnectionDescriptor {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// Fully resolved settings for one native connect call.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl: bool,
    pub application_name: Option<String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl", &self.ssl)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl ConnectionConfig {
    /// Resolve a descriptor into a working configuration.
    ///
    /// # Errors
    /// Returns `AdapterError::MalformedDescriptor` when the URL has no scheme
    /// or cannot be parsed.
    pub fn resolve(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let mut working = descriptor.overrides.clone().unwrap_or_default();
        let parsed = parse_url(&descriptor.url)?;
        parsed.overlay(&mut working);

        Ok(Self {
            host: working.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: working.port.unwrap_or(DEFAULT_PORT),
            database: working.database,
            user: working.user,
            password: working.password,
            ssl: working.ssl.unwrap_or(false),
            application_name: working.application_name,
        })
    }

    /// Native configuration for tokio-postgres.
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config.host(&self.host).port(self.port);
        if let Some(database) = &self.database {
            config.dbname(database);
        }
        if let Some(user) = &self.user {
            config.user(user);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        if let Some(name) = &self.application_name {
            config.application_name(name);
        }
        config.ssl_mode(if self.ssl {
            SslMode::Require
        } else {
            SslMode::Prefer
        });
        config
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// URL-derived fields. `None` means the URL did not specify the field.
#[derive(Debug, Default, PartialEq, Eq)]
struct UrlFields {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    ssl: Option<bool>,
    application_name: Option<String>,
}

impl UrlFields {
    fn overlay(self, working: &mut ConnectionOverrides) {
        working.host = self.host.or(working.host.take());
        working.port = self.port.or(working.port);
        working.database = self.database.or(working.database.take());
        working.user = self.user.or(working.user.take());
        working.password = self.password.or(working.password.take());
        working.ssl = self.ssl.or(working.ssl);
        working.application_name = self.application_name.or(working.application_name.take());
    }
}

fn parse_url(raw: &str) -> Result<UrlFields> {
    let has_scheme = raw.split_once("://").is_some_and(|(scheme, _)| {
        scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    });
    if !has_scheme {
        return Err(AdapterError::MalformedDescriptor(
            "missing `scheme://` prefix".to_string(),
        ));
    }

    let url = Url::parse(raw).map_err(|e| AdapterError::MalformedDescriptor(e.to_string()))?;

    let mut fields = UrlFields {
        host: url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .and_then(non_empty),
        port: url.port(),
        database: non_empty(decode(url.path().trim_matches('/'))),
        user: non_empty(decode(url.username())),
        password: url.password().map(decode),
        ..UrlFields::default()
    };

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "sslmode" => {
                fields.ssl = match value.as_ref() {
                    "disable" | "allow" | "prefer" => Some(false),
                    "require" | "verify-ca" | "verify-full" => Some(true),
                    _ => fields.ssl,
                }
            }
            "ssl" => fields.ssl = Some(matches!(value.as_ref(), "true" | "1")),
            "application_name" => fields.application_name = non_empty(value.into_owned()),
            _ => {}
        }
    }

    Ok(fields)
}
