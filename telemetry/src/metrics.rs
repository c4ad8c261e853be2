use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Installs the global Prometheus recorder and serves `/metrics` on `listen_address`.
///
/// Must be called at most once per process since the recorder is global. Without a
/// recorder every `metrics` macro call is a no-op, so callers skip this when metrics are
/// not configured.
pub fn init_metrics(listen_address: SocketAddr, app_name: &str) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(listen_address)
        .add_global_label("app", app_name)
        .install()?;

    Ok(())
}
