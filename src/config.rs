//! Connection settings and connection string assembly.
//!
//! Settings are passed explicitly to [`Connector::connect`](crate::Connector::connect);
//! there is no process-wide configuration.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DaoError, Result};

/// Default connect timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Discrete credential fields a connection string is built from.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionSettings {
    /// Host name, optionally with a port as `host:port` or `host,port`.
    pub server: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Connect timeout. libpq counts whole seconds, so fractions round up
    /// and anything shorter than a second becomes one second.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_seconds")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl ConnectionSettings {
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            timeout: default_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load from environment variables.
    ///
    /// Reads `PGDAO_SERVER`, `PGDAO_DATABASE`, `PGDAO_USERNAME`,
    /// `PGDAO_PASSWORD` and optionally `PGDAO_TIMEOUT` (seconds).
    /// Returns `Ok(None)` when `PGDAO_SERVER` is not set.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(server) = std::env::var("PGDAO_SERVER") else {
            return Ok(None);
        };

        let required = |key: &str| {
            std::env::var(key)
                .map_err(|_| DaoError::Config(format!("{} is not set", key)))
        };

        let mut settings = Self::new(
            server,
            required("PGDAO_DATABASE")?,
            required("PGDAO_USERNAME")?,
            std::env::var("PGDAO_PASSWORD").unwrap_or_default(),
        );

        if let Ok(timeout) = std::env::var("PGDAO_TIMEOUT") {
            let secs = timeout.parse::<u64>().map_err(|_| {
                DaoError::Config(format!("PGDAO_TIMEOUT is not a number: {}", timeout))
            })?;
            settings.timeout = Duration::from_secs(secs);
        }

        Ok(Some(settings))
    }

    /// Splits `server` into host and optional port.
    fn host_and_port(&self) -> (&str, Option<&str>) {
        let split = self.server.rsplit_once(',').or_else(|| {
            // bare IPv6 addresses keep their colons
            self.server
                .rsplit_once(':')
                .filter(|(host, _)| !host.contains(':'))
        });
        match split {
            Some((host, port)) if is_port(port.trim()) => (host.trim(), Some(port.trim())),
            _ => (self.server.trim(), None),
        }
    }

    /// Builds a libpq key/value connection string.
    ///
    /// `application_name` is the running executable's name when it can be
    /// determined.
    pub fn connection_string(&self) -> String {
        self.connection_string_for(application_name().as_deref())
    }

    fn connection_string_for(&self, application: Option<&str>) -> String {
        let (host, port) = self.host_and_port();

        let mut parts = vec![format!("host={}", quote(host))];
        if let Some(port) = port {
            parts.push(format!("port={}", port));
        }
        parts.push(format!("dbname={}", quote(&self.database)));
        parts.push(format!("user={}", quote(&self.username)));
        parts.push(format!("password={}", quote(&self.password)));
        parts.push(format!("connect_timeout={}", self.timeout_secs()));
        if let Some(application) = application {
            parts.push(format!("application_name={}", quote(application)));
        }

        parts.join(" ")
    }

    // 0 means "wait forever" to libpq
    fn timeout_secs(&self) -> u64 {
        let secs = self.timeout.as_secs() + u64::from(self.timeout.subsec_nanos() > 0);
        secs.max(1)
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Single-quotes a value, escaping `\` and `'`.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

fn is_port(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn application_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    let stem = exe.file_stem()?.to_str()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    // Serializes tests that touch process environment
    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings::new("db.local", "shop", "app", "s3cret")
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_connection_string() {
        assert_eq!(
            settings().connection_string_for(Some("billing")),
            "host='db.local' dbname='shop' user='app' password='s3cret' \
             connect_timeout=5 application_name='billing'"
        );
    }

    #[test]
    fn test_connection_string_without_application_name() {
        assert_eq!(
            settings().connection_string_for(None),
            "host='db.local' dbname='shop' user='app' password='s3cret' connect_timeout=5"
        );
    }

    #[test]
    fn test_connection_string_with_port() {
        let mut s = settings();
        s.server = "db.local,6432".to_string();
        assert!(s
            .connection_string_for(None)
            .starts_with("host='db.local' port=6432 dbname="));

        s.server = "db.local:6432".to_string();
        assert!(s
            .connection_string_for(None)
            .starts_with("host='db.local' port=6432 dbname="));

        s.server = "::1".to_string();
        assert!(s
            .connection_string_for(None)
            .starts_with("host='::1' dbname="));
    }

    #[test]
    fn test_connection_string_escapes_quotes() {
        let mut s = settings();
        s.password = r"it's\here".to_string();
        assert!(s
            .connection_string_for(None)
            .contains(r"password='it\'s\\here'"));
    }

    #[test]
    fn test_connection_string_parses_as_postgres_config() {
        let mut s = settings();
        s.server = "db.local:6432".to_string();
        s.password = "it's".to_string();
        let config: tokio_postgres::Config = s.connection_string().parse().unwrap();
        assert_eq!(config.get_dbname(), Some("shop"));
        assert_eq!(config.get_user(), Some("app"));
        assert_eq!(config.get_password(), Some("it's".as_bytes()));
        assert_eq!(config.get_ports(), &[6432]);
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(5)));
    }

    #[test]
    fn test_sub_second_timeout_rounds_up() {
        let s = settings().with_timeout(Duration::from_millis(500));
        assert!(s.connection_string_for(None).ends_with("connect_timeout=1"));
        let config: tokio_postgres::Config = s.connection_string().parse().unwrap();
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(1)));

        let s = settings().with_timeout(Duration::ZERO);
        assert!(s.connection_string_for(None).ends_with("connect_timeout=1"));

        let s = settings().with_timeout(Duration::from_millis(2500));
        assert!(s.connection_string_for(None).ends_with("connect_timeout=3"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", settings());
        assert!(rendered.contains("db.local"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_deserialize_with_default_timeout() {
        let json = r#"{
            "server": "db.local",
            "database": "shop",
            "username": "app",
            "password": "s3cret"
        }"#;
        let s: ConnectionSettings = serde_json::from_str(json).unwrap();
        assert_eq!(s.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let json = r#"{
            "server": "db.local",
            "database": "shop",
            "username": "app",
            "password": "s3cret",
            "timeout": 3
        }"#;
        let s: ConnectionSettings = serde_json::from_str(json).unwrap();
        assert_eq!(s.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_from_env() {
        let _lock = env_lock().lock();
        std::env::remove_var("PGDAO_SERVER");
        assert!(ConnectionSettings::from_env().unwrap().is_none());

        std::env::set_var("PGDAO_SERVER", "db.local");
        std::env::set_var("PGDAO_DATABASE", "shop");
        std::env::set_var("PGDAO_USERNAME", "app");
        std::env::set_var("PGDAO_PASSWORD", "s3cret");
        std::env::set_var("PGDAO_TIMEOUT", "9");
        let s = ConnectionSettings::from_env().unwrap().unwrap();
        assert_eq!(s, settings().with_timeout(Duration::from_secs(9)));

        std::env::set_var("PGDAO_TIMEOUT", "soon");
        assert!(matches!(
            ConnectionSettings::from_env(),
            Err(DaoError::Config(message)) if message.contains("PGDAO_TIMEOUT")
        ));

        std::env::remove_var("PGDAO_TIMEOUT");
        std::env::remove_var("PGDAO_DATABASE");
        assert!(matches!(
            ConnectionSettings::from_env(),
            Err(DaoError::Config(message)) if message == "PGDAO_DATABASE is not set"
        ));

        for key in [
            "PGDAO_SERVER",
            "PGDAO_DATABASE",
            "PGDAO_USERNAME",
            "PGDAO_PASSWORD",
            "PGDAO_TIMEOUT",
        ] {
            std::env::remove_var(key);
        }
    }
}
