use chrono::{DateTime, NaiveDateTime, Utc};
use config::shared::{ETL_EXPORT_OPTIONS, IntoConnectOptions, PgConnectionConfig};
use pg_escape::quote_identifier;
use rustls::ClientConfig;
use serde_json::Value;
use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Column, Config, Connection, NoTls, Row, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{ErrorKind, EtlResult};
use crate::source::{RowCursor, RowSource};
use crate::types::{Record, TableName, Watermark};
use crate::{bail, etl_error};

const ID_COLUMN: &str = "id";
const ARCHIVED_ON_COLUMN: &str = "archived_on";
const DATA_COLUMN: &str = "data";

static CURSOR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Spawns a background task to monitor a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        let result = connection.await;

        match result {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => info!("postgres connection terminated successfully"),
        }
    }
    .instrument(span);

    // The `Client` terminates the connection when dropped, so the handle is not tracked.
    tokio::spawn(task);
}

/// Reads archive tables through server side cursors.
///
/// Each table is read inside its own read only, repeatable read transaction so the row count
/// and the cursor observe the same snapshot. Tables are exported one after the other on the
/// same connection.
#[derive(Debug, Clone)]
pub struct PgSource {
    client: Arc<Client>,
    fetch_size: usize,
}

impl PgSource {
    /// Establishes a connection to Postgres. The connection uses TLS if configured in the
    /// supplied [`PgConnectionConfig`].
    pub async fn connect(
        pg_connection_config: &PgConnectionConfig,
        fetch_size: usize,
    ) -> EtlResult<Self> {
        let client = match pg_connection_config.tls.enabled {
            true => connect_tls(pg_connection_config).await?,
            false => connect_no_tls(pg_connection_config).await?,
        };

        Ok(Self::from_client(client, fetch_size))
    }

    /// Wraps an already connected client.
    pub fn from_client(client: Client, fetch_size: usize) -> Self {
        Self {
            client: Arc::new(client),
            fetch_size: fetch_size.max(1),
        }
    }

    async fn count_rows(&self, table: &TableName, filter: &str) -> EtlResult<u64> {
        let query = format!(
            "select count(*) from {}{filter}",
            table.as_quoted_identifier()
        );
        let count: i64 = self.client.query_one(&query, &[]).await?.try_get(0)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn declare_cursor(
        &self,
        table: &TableName,
        watermark: Option<Watermark>,
    ) -> EtlResult<(u64, String)> {
        let filter = watermark
            .map(|watermark| format!(" where {}", watermark.sql_filter()))
            .unwrap_or_default();

        let estimated_rows = self.count_rows(table, &filter).await?;

        let cursor_name = format!(
            "archive_export_{}",
            CURSOR_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let query = format!(
            "declare {} no scroll cursor for select * from {}{filter} order by {}",
            quote_identifier(&cursor_name),
            table.as_quoted_identifier(),
            quote_identifier(ID_COLUMN)
        );
        self.client.batch_execute(&query).await?;

        Ok((estimated_rows, cursor_name))
    }
}

impl RowSource for PgSource {
    type Cursor = PgTableCursor;

    async fn open(
        &self,
        table: &TableName,
        watermark: Option<Watermark>,
    ) -> EtlResult<(u64, Self::Cursor)> {
        self.client
            .batch_execute("begin transaction isolation level repeatable read read only;")
            .await?;

        let (estimated_rows, cursor_name) = match self.declare_cursor(table, watermark).await {
            Ok(declared) => declared,
            Err(err) => {
                if let Err(rollback_err) = self.client.batch_execute("rollback;").await {
                    warn!(%table, error = %rollback_err, "failed to roll back the export transaction");
                }

                return Err(err);
            }
        };

        debug!(%table, cursor = %cursor_name, estimated_rows, "declared export cursor");

        let cursor = PgTableCursor {
            client: self.client.clone(),
            table: table.clone(),
            cursor_name,
            fetch_size: self.fetch_size,
            exhausted: false,
        };

        Ok((estimated_rows, cursor))
    }
}

/// Cursor over one table, valid until the enclosing transaction ends.
#[derive(Debug)]
pub struct PgTableCursor {
    client: Arc<Client>,
    table: TableName,
    cursor_name: String,
    fetch_size: usize,
    exhausted: bool,
}

impl RowCursor for PgTableCursor {
    async fn next_chunk(&mut self) -> EtlResult<Option<Vec<Record>>> {
        if self.exhausted {
            return Ok(None);
        }

        let query = format!(
            "fetch forward {} from {}",
            self.fetch_size,
            quote_identifier(&self.cursor_name)
        );
        let rows = self.client.query(&query, &[]).await?;

        // A short chunk means the server has no rows left, which saves the last round trip.
        if rows.len() < self.fetch_size {
            self.exhausted = true;
        }

        let Some(first_row) = rows.first() else {
            return Ok(None);
        };

        let layout = RecordLayout::try_new(first_row.columns(), &self.table)?;
        let records = rows
            .iter()
            .map(|row| layout.decode(row))
            .collect::<EtlResult<Vec<_>>>()?;

        Ok(Some(records))
    }

    async fn close(self) -> EtlResult<()> {
        self.client.batch_execute("commit;").await?;

        Ok(())
    }

    async fn abort(self) -> EtlResult<()> {
        self.client.batch_execute("rollback;").await?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum IdType {
    Int2,
    Int4,
    Int8,
}

#[derive(Debug, Clone, Copy)]
enum TimestampType {
    Timestamp,
    TimestampTz,
}

/// Positions and types of the columns a [`Record`] is decoded from.
#[derive(Debug, Clone, Copy)]
struct RecordLayout {
    id: (usize, IdType),
    archived_on: Option<(usize, TimestampType)>,
    data: usize,
}

impl RecordLayout {
    fn try_new(columns: &[Column], table: &TableName) -> EtlResult<Self> {
        let position = |name: &str| columns.iter().position(|column| column.name() == name);

        let Some(id_index) = position(ID_COLUMN) else {
            bail!(
                ErrorKind::SourceSchemaError,
                "Archive table has no id column",
                format!("table {table} has no `{ID_COLUMN}` column")
            );
        };
        let id_type = match columns[id_index].type_() {
            typ if *typ == Type::INT8 => IdType::Int8,
            typ if *typ == Type::INT4 => IdType::Int4,
            typ if *typ == Type::INT2 => IdType::Int2,
            typ => bail!(
                ErrorKind::SourceSchemaError,
                "Archive table has an unsupported id column type",
                format!("column `{ID_COLUMN}` of table {table} has type {typ}")
            ),
        };

        let archived_on = match position(ARCHIVED_ON_COLUMN) {
            Some(index) => {
                let timestamp_type = match columns[index].type_() {
                    typ if *typ == Type::TIMESTAMPTZ => TimestampType::TimestampTz,
                    typ if *typ == Type::TIMESTAMP => TimestampType::Timestamp,
                    typ => bail!(
                        ErrorKind::SourceSchemaError,
                        "Archive table has an unsupported archived_on column type",
                        format!("column `{ARCHIVED_ON_COLUMN}` of table {table} has type {typ}")
                    ),
                };
                Some((index, timestamp_type))
            }
            None => None,
        };

        let Some(data_index) = position(DATA_COLUMN) else {
            bail!(
                ErrorKind::SourceSchemaError,
                "Archive table has no data column",
                format!("table {table} has no `{DATA_COLUMN}` column")
            );
        };
        let data_type = columns[data_index].type_();
        if *data_type != Type::JSONB && *data_type != Type::JSON {
            bail!(
                ErrorKind::SourceSchemaError,
                "Archive table has an unsupported data column type",
                format!("column `{DATA_COLUMN}` of table {table} has type {data_type}")
            );
        }

        Ok(Self {
            id: (id_index, id_type),
            archived_on,
            data: data_index,
        })
    }

    fn decode(&self, row: &Row) -> EtlResult<Record> {
        let (id_index, id_type) = self.id;
        let id = match id_type {
            IdType::Int8 => row.try_get::<_, Option<i64>>(id_index)?,
            IdType::Int4 => row.try_get::<_, Option<i32>>(id_index)?.map(i64::from),
            IdType::Int2 => row.try_get::<_, Option<i16>>(id_index)?.map(i64::from),
        };
        let Some(id) = id else {
            bail!(ErrorKind::InvalidData, "Archive row has a null id");
        };

        let archived_on = match self.archived_on {
            Some((index, TimestampType::TimestampTz)) => {
                row.try_get::<_, Option<DateTime<Utc>>>(index)?
            }
            Some((index, TimestampType::Timestamp)) => row
                .try_get::<_, Option<NaiveDateTime>>(index)?
                .map(|archived_on| archived_on.and_utc()),
            None => None,
        };

        let payload = row
            .try_get::<_, Option<Value>>(self.data)?
            .unwrap_or(Value::Null);

        Ok(Record::new(id, archived_on, payload))
    }
}

/// Establishes a connection to Postgres without TLS encryption.
async fn connect_no_tls(pg_connection_config: &PgConnectionConfig) -> EtlResult<Client> {
    let config: Config = pg_connection_config.with_db(Some(&ETL_EXPORT_OPTIONS));

    let (client, connection) = config.connect(NoTls).await?;
    spawn_postgres_connection::<NoTls>(connection);

    info!("successfully connected to postgres without tls");

    Ok(client)
}

/// Establishes a TLS-encrypted connection to Postgres.
async fn connect_tls(pg_connection_config: &PgConnectionConfig) -> EtlResult<Client> {
    let config: Config = pg_connection_config.with_db(Some(&ETL_EXPORT_OPTIONS));

    let mut root_store = rustls::RootCertStore::empty();
    let mut root_certs_reader =
        BufReader::new(pg_connection_config.tls.trusted_root_certs.as_bytes());
    for cert in rustls_pemfile::certs(&mut root_certs_reader) {
        let cert = cert.map_err(|err| {
            etl_error!(
                ErrorKind::EncryptionError,
                "Trusted root certificates could not be parsed",
                err.to_string(),
                source: err
            )
        })?;
        root_store.add(cert)?;
    }

    let tls_config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let (client, connection) = config.connect(MakeRustlsConnect::new(tls_config)).await?;
    spawn_postgres_connection::<MakeRustlsConnect>(connection);

    info!("successfully connected to postgres with tls");

    Ok(client)
}
