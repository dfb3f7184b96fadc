//! Prometheus scrape endpoint.

use std::net::SocketAddr;

use {
    anyhow::{Context, Result},
    axum::{Router, extract::State, http::header, response::IntoResponse, routing::get},
    hookrelay_config::MetricsConfig,
    hookrelay_metrics::{MetricsHandle, MetricsRecorderConfig, init_metrics},
    tokio::task::JoinHandle,
    tracing::{info, warn},
};

fn router(handle: MetricsHandle) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(handle)
}

/// Unauthenticated so scrapers can reach it.
async fn prometheus_metrics(State(handle): State<MetricsHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

async fn serve(listen: &str, handle: MetricsHandle) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding the metrics endpoint on {listen}"))?;
    let addr = listener.local_addr()?;
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(handle)).await {
            warn!(error = %e, "metrics endpoint stopped");
        }
    });
    Ok((addr, task))
}

/// Install the recorder and, when enabled, serve `/metrics`.
///
/// Returns the endpoint task so the caller can abort it on shutdown.
pub async fn start(config: &MetricsConfig) -> Result<Option<JoinHandle<()>>> {
    let handle = init_metrics(MetricsRecorderConfig {
        enabled: config.enabled,
        global_labels: config
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })?;
    if !config.enabled || !config.prometheus_endpoint {
        return Ok(None);
    }
    let (addr, task) = serve(&config.listen, handle).await?;
    info!(%addr, "prometheus metrics endpoint listening");
    Ok(Some(task))
}
