//! Prometheus metrics.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::config::MetricsSettings;
use crate::{Error, Result};

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are recorded at all.
    pub enabled: bool,
    /// Address for the scrape endpoint; `None` keeps metrics in-process.
    pub listen_addr: Option<SocketAddr>,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides
    /// (`COHORTCACHE_METRICS_ENABLED`, `COHORTCACHE_METRICS_PORT`).
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let mut enabled = settings.and_then(|s| s.enabled).unwrap_or(false);
        let mut port = settings.and_then(|s| s.port);

        if let Some(value) = parse_bool_env("COHORTCACHE_METRICS_ENABLED") {
            enabled = value;
        }
        if let Some(value) = parse_port_env("COHORTCACHE_METRICS_PORT") {
            port = Some(value);
        }

        Self {
            enabled,
            listen_addr: port.map(|p| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), p)),
        }
    }
}

/// Handle to the installed recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder.
///
/// With a listen address the exporter serves `/metrics` over HTTP and no
/// handle is returned; otherwise the handle renders metrics in-process.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed or the
/// listener cannot be started.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let Some(addr) = config.listen_addr else {
        let prometheus = builder
            .install_recorder()
            .map_err(|e| Error::OperationFailed {
                operation: "metrics_recorder_install".to_string(),
                cause: e.to_string(),
            })?;
        return Ok(Some(MetricsHandle { prometheus }));
    };

    // the exporter spawns its own runtime thread when none is running
    builder
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_listener_install".to_string(),
            cause: e.to_string(),
        })?;
    tracing::info!(%addr, "Serving Prometheus metrics");
    Ok(None)
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        let value = value.to_lowercase();
        value == "true" || value == "1" || value == "yes"
    })
}

fn parse_port_env(key: &str) -> Option<u16> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
}
