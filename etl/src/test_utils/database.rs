use config::shared::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
use tokio::runtime::Handle;
use tokio_postgres::{Client, Config, NoTls};
use uuid::Uuid;

/// Schema in which test tables are created.
pub const TEST_DATABASE_SCHEMA: &str = "test";

/// Generates the connection configuration of a fresh test database.
///
/// Configuration is read from environment variables:
/// - `TESTS_DATABASE_HOST`: Postgres server hostname (required)
/// - `TESTS_DATABASE_PORT`: Postgres server port (required)
/// - `TESTS_DATABASE_USERNAME`: Database user (required)
/// - `TESTS_DATABASE_PASSWORD`: Database password (optional)
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        // Unique per test so tests never see each other's tables.
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig::disabled(),
    }
}

/// A database created for one test and dropped when this value is dropped.
///
/// Dropping blocks on the cleanup, so tests must run on the multi threaded runtime.
pub struct PgDatabase {
    pub config: PgConnectionConfig,
    pub client: Client,
}

impl PgDatabase {
    /// Creates the database described by `config` and connects to it.
    ///
    /// # Panics
    ///
    /// Panics if the server is unreachable or the database cannot be created.
    pub async fn new(config: PgConnectionConfig) -> Self {
        let admin = connect(config.without_db(None)).await;
        admin
            .execute(&format!(r#"create database "{}";"#, config.name), &[])
            .await
            .expect("Failed to create database");

        let client = connect(config.with_db(None)).await;

        Self { config, client }
    }
}

impl Drop for PgDatabase {
    fn drop(&mut self) {
        let config = self.config.clone();
        tokio::task::block_in_place(move || {
            Handle::current().block_on(drop_pg_database(&config));
        });
    }
}

/// Creates a new test database with the [`TEST_DATABASE_SCHEMA`] schema.
///
/// # Panics
///
/// Panics if the database or the schema cannot be created.
pub async fn spawn_source_database() -> PgDatabase {
    let database = PgDatabase::new(local_pg_connection_config()).await;

    database
        .client
        .execute(&format!("create schema {TEST_DATABASE_SCHEMA}"), &[])
        .await
        .expect("Failed to create test schema");

    database
}

async fn connect(config: Config) -> Client {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .expect("Failed to connect to Postgres");
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("warning: test postgres connection failed: {err}");
        }
    });

    client
}

/// Terminates all connections to the test database and drops it.
///
/// Errors are printed and otherwise ignored so cleanup never fails a test.
async fn drop_pg_database(config: &PgConnectionConfig) {
    let options: Config = config.without_db(None);
    let (client, connection) = match options.connect(NoTls).await {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!("warning: failed to connect to Postgres for cleanup: {e}");
            return;
        }
    };
    tokio::spawn(connection);

    if let Err(e) = client
        .execute(
            "select pg_terminate_backend(pid) from pg_stat_activity \
             where datname = $1 and pid <> pg_backend_pid()",
            &[&config.name],
        )
        .await
    {
        eprintln!(
            "warning: failed to terminate connections for database {}: {}",
            config.name, e
        );
    }

    if let Err(e) = client
        .execute(&format!(r#"drop database if exists "{}";"#, config.name), &[])
        .await
    {
        eprintln!("warning: failed to drop database {}: {}", config.name, e);
    }
}
