use serde::Deserialize;
use std::net::SocketAddr;

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    /// Address the `/metrics` listener binds to, e.g. `[::]:9000`.
    pub listen_address: SocketAddr,
}
