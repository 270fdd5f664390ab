use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder when a metrics file is configured.
/// Without it every `metrics::*!` call is a no-op.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if settings.telemetry().metrics_file.is_none() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

/// Writes the current snapshot in Prometheus text format (node_exporter
/// textfile collector layout). Does nothing if the recorder is not installed.
pub(crate) fn write_snapshot(path: &Path) -> anyhow::Result<()> {
    let Some(rendered) = render() else {
        return Ok(());
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))?;

    tracing::info!(path = %path.display(), "Metrics snapshot written");
    Ok(())
}
