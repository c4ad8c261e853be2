use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tokio_postgres::{Config as TokioPgConnectOptions, config::SslMode as TokioPgSslMode};

use crate::shared::ValidationError;

const APP_NAME_EXPORTER: &str = "archive_exporter";

/// Session settings applied to every export connection.
///
/// The session runs in UTC so that `timestamp` columns compare against the `timestamptz`
/// watermark as UTC. Statements never time out, a single `FETCH` over a large table may run
/// for a long time.
pub static ETL_EXPORT_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        datestyle: "ISO".to_string(),
        intervalstyle: "postgres".to_string(),
        extra_float_digits: 3,
        client_encoding: "UTF8".to_string(),
        timezone: "UTC".to_string(),
        statement_timeout: 0,
        idle_in_transaction_session_timeout: 0,
        application_name: APP_NAME_EXPORTER.to_string(),
    });

/// Server side session parameters passed through the `options` startup parameter.
#[derive(Debug, Clone)]
pub struct PgConnectionOptions {
    pub datestyle: String,
    pub intervalstyle: String,
    pub extra_float_digits: i32,
    pub client_encoding: String,
    pub timezone: String,
    pub statement_timeout: u32,
    pub idle_in_transaction_session_timeout: u32,
    pub application_name: String,
}

impl PgConnectionOptions {
    /// Returns a space separated list of `-c key=value` pairs.
    pub fn to_options_string(&self) -> String {
        format!(
            "-c datestyle={} -c intervalstyle={} -c extra_float_digits={} -c client_encoding={} -c timezone={} -c statement_timeout={} -c idle_in_transaction_session_timeout={} -c application_name={}",
            self.datestyle,
            self.intervalstyle,
            self.extra_float_digits,
            self.client_encoding,
            self.timezone,
            self.statement_timeout,
            self.idle_in_transaction_session_timeout,
            self.application_name
        )
    }
}

/// Configuration for connecting to the source Postgres database.
///
/// This intentionally does not implement [`Serialize`] to avoid leaking the password.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name of the database holding the archive tables.
    pub name: String,
    pub username: String,
    pub password: Option<SecretString>,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    pub const DEFAULT_PORT: u16 = 5432;

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.tls.validate()
    }
}

fn default_port() -> u16 {
    PgConnectionConfig::DEFAULT_PORT
}

/// TLS settings for Postgres connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: String::new(),
            enabled: false,
        }
    }

    /// Checks that certificates are provided whenever TLS is enabled.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.trim().is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts [`PgConnectionConfig`] into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Creates options targeting the server without selecting a database, used for
    /// administrative statements such as `create database`.
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> Output;

    fn with_db(&self, options: Option<&PgConnectionOptions>) -> Output;
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> TokioPgConnectOptions {
        // Only the ssl mode is set here, certificates are handed to rustls when connecting.
        let ssl_mode = if self.tls.enabled {
            TokioPgSslMode::Require
        } else {
            TokioPgSslMode::Prefer
        };

        let mut config = TokioPgConnectOptions::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.username)
            .ssl_mode(ssl_mode);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        if let Some(opts) = options {
            config.options(opts.to_options_string());
        }

        config
    }

    fn with_db(&self, options: Option<&PgConnectionOptions>) -> TokioPgConnectOptions {
        let mut config: TokioPgConnectOptions = self.without_db(options);
        config.dbname(&self.name);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_config(tls: TlsConfig) -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5433,
            name: "feed_archiver".to_string(),
            username: "feed_archiver".to_string(),
            password: Some(SecretString::from("secret")),
            tls,
        }
    }

    #[test]
    fn export_options_run_in_utc_without_timeouts() {
        assert_eq!(
            ETL_EXPORT_OPTIONS.to_options_string(),
            "-c datestyle=ISO -c intervalstyle=postgres -c extra_float_digits=3 -c client_encoding=UTF8 -c timezone=UTC -c statement_timeout=0 -c idle_in_transaction_session_timeout=0 -c application_name=archive_exporter"
        );
    }

    #[test]
    fn with_db_selects_the_database() {
        let config = connection_config(TlsConfig::disabled());

        let options: TokioPgConnectOptions = config.with_db(Some(&ETL_EXPORT_OPTIONS));
        assert_eq!(options.get_dbname(), Some("feed_archiver"));
        assert_eq!(options.get_user(), Some("feed_archiver"));
        assert_eq!(options.get_ports(), &[5433]);
        assert_eq!(options.get_password(), Some("secret".as_bytes()));

        let options: TokioPgConnectOptions = config.without_db(None);
        assert_eq!(options.get_dbname(), None);
    }

    #[test]
    fn tls_requires_root_certificates() {
        let config = connection_config(TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        });

        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingTrustedRootCerts)
        ));
        assert!(connection_config(TlsConfig::disabled()).validate().is_ok());
    }
}
