use config::load_config;
use config::shared::ExporterConfig;

use crate::error::{ExporterError, ExporterResult};

/// Loads and validates the exporter configuration.
///
/// Uses the standard configuration loading mechanism from [`config`] and validates the
/// resulting [`ExporterConfig`] before returning it.
pub fn load_exporter_config() -> ExporterResult<ExporterConfig> {
    let config = load_config::<ExporterConfig>().map_err(ExporterError::config)?;
    config.validate().map_err(ExporterError::config)?;

    Ok(config)
}
