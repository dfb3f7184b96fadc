//! Metrics recorder initialization.

use {anyhow::Result, tracing::info};

/// Renders the metrics recorded since [`init_metrics`].
#[derive(Clone, Default)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    /// Metrics in Prometheus text format, or an empty string when collection
    /// is disabled.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle
                .as_ref()
                .map(|h| h.render())
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
    /// Labels added to every metric
    pub global_labels: Vec<(String, String)>,
}

/// Install the global metrics recorder.
///
/// Call once at startup. With the `prometheus` feature an in-process
/// Prometheus recorder is installed; without it, or when `enabled` is false,
/// nothing is installed and every metric call stays a no-op.
///
/// # Errors
///
/// Returns an error if the bucket layout is rejected or another recorder is
/// already installed.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle::default());
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = prometheus_builder(&config)?.install_recorder()?;
        info!("prometheus metrics recorder installed");
        Ok(MetricsHandle {
            prometheus_handle: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        info!("metrics exporter not compiled in");
        Ok(MetricsHandle::default())
    }
}

#[cfg(feature = "prometheus")]
fn prometheus_builder(config: &MetricsRecorderConfig) -> Result<metrics_exporter_prometheus::PrometheusBuilder> {
    use {
        crate::buckets,
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_duration_seconds".to_string()), buckets::DURATION_SECONDS)?;
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    Ok(builder)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn disabled_renders_nothing() {
        let handle = init_metrics(MetricsRecorderConfig::default()).unwrap();
        assert!(handle.render().is_empty());
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn renders_recorded_values_with_global_labels() {
        use crate::{labels, webhook};

        let config = MetricsRecorderConfig {
            enabled: true,
            global_labels: vec![("instance".into(), "edge-1".into())],
        };
        let recorder = prometheus_builder(&config).unwrap().build_recorder();
        let handle = MetricsHandle {
            prometheus_handle: Some(recorder.handle()),
        };

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(webhook::INBOUND_REQUESTS_TOTAL, labels::STATUS => "200").increment(2);
            metrics::histogram!(webhook::PIPELINE_DURATION_SECONDS).record(0.2);
        });

        let out = handle.render();
        let line = out
            .lines()
            .find(|l| l.starts_with(webhook::INBOUND_REQUESTS_TOTAL))
            .unwrap();
        assert!(line.contains(r#"status="200""#), "{line}");
        assert!(line.contains(r#"instance="edge-1""#), "{line}");
        assert!(line.ends_with(" 2"), "{line}");
        assert!(out.contains("hookrelay_webhook_pipeline_duration_seconds_bucket{"));
    }
}
