//! Error types and result definitions for export operations.
//!
//! [`EtlError`] carries an [`ErrorKind`], a static description, optional dynamic detail, an
//! optional source error and the callsite location and backtrace captured at creation. Kinds
//! are grouped into the coarse [`ErrorClass`] taxonomy that decides how a run reacts to a
//! failure.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for export operations using [`EtlError`] as the error type.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for export operations.
#[derive(Debug, Clone)]
pub struct EtlError {
    payload: Box<ErrorPayload>,
}

/// Specific categories of errors that can occur during an export run.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    SourceConnectionFailed,
    DestinationConnectionFailed,

    // Query & Execution Errors
    SourceQueryFailed,
    DestinationQueryFailed,
    SourceOperationCanceled,
    SourceDatabaseShutdown,

    // Schema & Data Errors
    SourceSchemaError,
    MalformedRecord,
    ConversionError,
    InvalidData,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SourceIoError,
    DestinationIoError,
    SerializationError,
    DeserializationError,

    // Security & Authentication Errors
    EncryptionError,
    AuthenticationError,

    // State Errors
    InvalidState,

    // General Errors
    SourceError,
    DestinationError,

    Unknown,
}

/// Coarse classification of [`ErrorKind`]s.
///
/// Every class is fatal to a run, the class only tells where the failure originated.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
pub enum ErrorClass {
    /// Connection, query or cursor failures of the source database.
    SourceFailure,
    /// A record whose shape is invalid for the active sink.
    MalformedRecord,
    /// Write or flush failures of a sink.
    SinkFailure,
    Other,
}

impl ErrorKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::SourceConnectionFailed
            | ErrorKind::SourceQueryFailed
            | ErrorKind::SourceOperationCanceled
            | ErrorKind::SourceDatabaseShutdown
            | ErrorKind::SourceSchemaError
            | ErrorKind::SourceIoError
            | ErrorKind::SourceError
            | ErrorKind::AuthenticationError => ErrorClass::SourceFailure,
            ErrorKind::MalformedRecord => ErrorClass::MalformedRecord,
            ErrorKind::DestinationConnectionFailed
            | ErrorKind::DestinationQueryFailed
            | ErrorKind::DestinationIoError
            | ErrorKind::DestinationError => ErrorClass::SinkFailure,
            ErrorKind::ConversionError
            | ErrorKind::InvalidData
            | ErrorKind::ConfigError
            | ErrorKind::IoError
            | ErrorKind::SerializationError
            | ErrorKind::DeserializationError
            | ErrorKind::EncryptionError
            | ErrorKind::InvalidState
            | ErrorKind::Unknown => ErrorClass::Other,
        }
    }
}

impl EtlError {
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    pub fn class(&self) -> ErrorClass {
        self.payload.kind.class()
    }

    pub fn description(&self) -> &str {
        &self.payload.description
    }

    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the callsite at which this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        self.payload.kind == other.payload.kind
            && self.payload.description == other.payload.description
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        write_detail(payload.detail.as_deref(), f, 1)?;
        write_backtrace(payload.backtrace.as_ref(), f, 1)?;

        Ok(())
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Writes a captured backtrace with indentation, skipping disabled backtraces.
fn write_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() && !rendered_backtrace.contains("disabled backtrace")
    {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

/// Maps serialization failures to [`ErrorKind::SerializationError`] and parse failures to
/// [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => {
                (ErrorKind::SerializationError, "JSON serialization failed")
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError::from_source(kind, description, err)
    }
}

/// Maps Postgres errors based on their SQLSTATE code.
impl From<tokio_postgres::Error> for EtlError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> EtlError {
        let (kind, description) = match err.code() {
            Some(sqlstate) => {
                use tokio_postgres::error::SqlState;

                match *sqlstate {
                    SqlState::CONNECTION_EXCEPTION
                    | SqlState::CONNECTION_DOES_NOT_EXIST
                    | SqlState::CONNECTION_FAILURE
                    | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                    | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
                    | SqlState::TOO_MANY_CONNECTIONS
                    | SqlState::IDLE_SESSION_TIMEOUT => (
                        ErrorKind::SourceConnectionFailed,
                        "PostgreSQL connection failed",
                    ),

                    SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                        ErrorKind::AuthenticationError,
                        "PostgreSQL authentication failed",
                    ),

                    SqlState::DATA_EXCEPTION
                    | SqlState::INVALID_TEXT_REPRESENTATION
                    | SqlState::INVALID_DATETIME_FORMAT
                    | SqlState::DATETIME_FIELD_OVERFLOW
                    | SqlState::NUMERIC_VALUE_OUT_OF_RANGE => (
                        ErrorKind::ConversionError,
                        "PostgreSQL data conversion failed",
                    ),

                    SqlState::UNDEFINED_TABLE
                    | SqlState::UNDEFINED_COLUMN
                    | SqlState::UNDEFINED_SCHEMA
                    | SqlState::UNDEFINED_FUNCTION => (
                        ErrorKind::SourceSchemaError,
                        "PostgreSQL schema object not found",
                    ),

                    SqlState::SYNTAX_ERROR
                    | SqlState::SYNTAX_ERROR_OR_ACCESS_RULE_VIOLATION
                    | SqlState::INSUFFICIENT_PRIVILEGE => (
                        ErrorKind::SourceQueryFailed,
                        "PostgreSQL syntax or access error",
                    ),

                    SqlState::INVALID_CURSOR_STATE
                    | SqlState::INVALID_CURSOR_NAME
                    | SqlState::DUPLICATE_CURSOR => {
                        (ErrorKind::SourceQueryFailed, "PostgreSQL cursor error")
                    }

                    SqlState::ACTIVE_SQL_TRANSACTION
                    | SqlState::NO_ACTIVE_SQL_TRANSACTION
                    | SqlState::IN_FAILED_SQL_TRANSACTION
                    | SqlState::IDLE_IN_TRANSACTION_SESSION_TIMEOUT => (
                        ErrorKind::SourceQueryFailed,
                        "PostgreSQL transaction state error",
                    ),

                    SqlState::QUERY_CANCELED | SqlState::OPERATOR_INTERVENTION => (
                        ErrorKind::SourceOperationCanceled,
                        "PostgreSQL query canceled",
                    ),

                    SqlState::ADMIN_SHUTDOWN
                    | SqlState::CRASH_SHUTDOWN
                    | SqlState::CANNOT_CONNECT_NOW => (
                        ErrorKind::SourceDatabaseShutdown,
                        "PostgreSQL database unavailable",
                    ),

                    SqlState::IO_ERROR | SqlState::DISK_FULL => {
                        (ErrorKind::SourceIoError, "PostgreSQL I/O error")
                    }

                    SqlState::DATA_CORRUPTED | SqlState::INDEX_CORRUPTED => {
                        (ErrorKind::SourceIoError, "PostgreSQL data corruption")
                    }

                    _ => (ErrorKind::SourceError, "PostgreSQL error"),
                }
            }
            None => classify_client_error(&err),
        };

        EtlError::from_source(kind, description, err)
    }
}

/// Classifies Postgres errors raised by the client rather than the server.
///
/// The kind of a [`tokio_postgres::Error`] is private; its `Display` output is the kind
/// message alone, which is what gets matched here.
fn classify_client_error(err: &tokio_postgres::Error) -> (ErrorKind, &'static str) {
    if err.is_closed() {
        return (
            ErrorKind::SourceConnectionFailed,
            "PostgreSQL connection closed",
        );
    }

    let message = err.to_string();
    if message.starts_with("error deserializing column")
        || message.starts_with("error serializing parameter")
    {
        (
            ErrorKind::ConversionError,
            "PostgreSQL value conversion failed",
        )
    } else if message.starts_with("invalid column")
        || message.starts_with("query returned an unexpected number of columns")
    {
        (
            ErrorKind::SourceSchemaError,
            "PostgreSQL result has an unexpected shape",
        )
    } else if message.starts_with("query returned an unexpected number of rows")
        || (message.starts_with("expected ") && message.contains(" parameters but got "))
    {
        (ErrorKind::SourceQueryFailed, "PostgreSQL query failed")
    } else {
        (
            ErrorKind::SourceConnectionFailed,
            "PostgreSQL connection failed",
        )
    }
}

/// Maps HTTP client errors of the bulk index sink.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::DestinationConnectionFailed,
                "HTTP connection to the index failed",
            )
        } else if err.is_decode() {
            (
                ErrorKind::DeserializationError,
                "HTTP response decoding failed",
            )
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "HTTP client configuration failed")
        } else {
            (ErrorKind::DestinationError, "HTTP request to the index failed")
        };

        EtlError::from_source(kind, description, err)
    }
}

impl From<rustls::Error> for EtlError {
    #[track_caller]
    fn from(err: rustls::Error) -> EtlError {
        EtlError::from_source(ErrorKind::EncryptionError, "TLS configuration failed", err)
    }
}
