//! Feed archive exporter binary.
//!
//! Exports archived records from Postgres into either a compressed cold storage archive or a
//! search index, depending on the configured destination.

use ::config::Environment;
use ::config::shared::ExporterConfig;
use telemetry::metrics::init_metrics;
use telemetry::tracing::init_tracing;
use tracing::{error, warn};

use crate::config::load_exporter_config;
use crate::core::run_export;
use crate::error::{ExporterError, ExporterResult};

mod config;
mod core;
mod error;

fn main() {
    if let Err(err) = run() {
        eprint!("{}", err.render_report());
        std::process::exit(1);
    }
}

/// Loads configuration, initializes telemetry, starts the async runtime and runs the export.
fn run() -> ExporterResult<()> {
    let exporter_config = load_exporter_config()?;

    let environment = Environment::load().map_err(ExporterError::config)?;
    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), environment).map_err(ExporterError::config)?;

    // Cargo's feature unification may enable more than one rustls provider, so the one used
    // for source TLS is selected explicitly.
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("a rustls crypto provider was already installed");
    }

    if let Some(metrics_config) = &exporter_config.metrics {
        init_metrics(metrics_config.listen_address, env!("CARGO_BIN_NAME"))
            .map_err(ExporterError::config)?;
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(exporter_config))?;

    Ok(())
}

async fn async_main(exporter_config: ExporterConfig) -> ExporterResult<()> {
    if let Err(err) = run_export(exporter_config).await {
        error!(error = %err, class = ?err.class(), "export failed");

        return Err(err.into());
    }

    Ok(())
}
