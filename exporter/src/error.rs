use etl::error::{ErrorClass, EtlError};
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type ExporterResult<T> = Result<T, ExporterError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the exporter binary.
///
/// Wraps [`EtlError`] for failures of the run itself and provides variants for setup errors.
#[derive(Debug)]
pub enum ExporterError {
    /// The export run failed.
    Etl(EtlError),
    /// Configuration could not be loaded, validated or applied.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
}

impl ExporterError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            ExporterError::Etl(err) => match err.class() {
                ErrorClass::SourceFailure => "source failure",
                ErrorClass::MalformedRecord => "malformed record",
                ErrorClass::SinkFailure => "sink failure",
                ErrorClass::Other => "export error",
            },
            ExporterError::Config(_, _) => "configuration error",
            ExporterError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> &Backtrace {
        match self {
            ExporterError::Etl(err) => err.backtrace(),
            ExporterError::Config(_, cb) => &cb.0,
            ExporterError::Io(_, cb) => &cb.0,
        }
    }

    /// Creates a configuration error from any error type.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ExporterError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("exporter failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace() {
            out.push_str("backtrace:\n");
            out.push_str(&self.backtrace().to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for ExporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterError::Etl(err) => write!(f, "{err}"),
            ExporterError::Config(source, _) => write!(f, "configuration error: {source}"),
            ExporterError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for ExporterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExporterError::Etl(err) => err.source(),
            ExporterError::Config(source, _) => Some(source.as_ref()),
            ExporterError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<EtlError> for ExporterError {
    fn from(err: EtlError) -> Self {
        ExporterError::Etl(err)
    }
}
