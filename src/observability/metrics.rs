//! Prometheus metrics.
//!
//! Instrumented code records through the `metrics` facade macros. Without an
//! installed recorder those calls are no-ops, so libraries embedding the crate
//! pay nothing unless they opt in.

use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the Prometheus recorder as the global `metrics` recorder.
///
/// Returns `Ok(None)` when `enabled` is false.
///
/// # Errors
///
/// Returns an error if another recorder is already installed.
pub fn install_prometheus(enabled: bool) -> Result<Option<PrometheusHandle>> {
    if !enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_recorder_install".to_string(),
            cause: e.to_string(),
        })?;

    tracing::debug!("Prometheus recorder installed");
    Ok(Some(handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_installs_nothing() {
        assert!(install_prometheus(false).unwrap().is_none());
    }

    #[test]
    fn test_local_recorder_captures_breaker_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("circuit_breaker_transitions_total", "breaker" => "test")
                .increment(1);
        });

        let rendered = handle.render();
        assert!(rendered.contains("circuit_breaker_transitions_total"));
    }
}
