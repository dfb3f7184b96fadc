//! Inbound HTTP listener.
//!
//! Requests are authenticated before the body is read, the body is streamed
//! under a hard cap, and accepted messages are acknowledged before any
//! processing happens.

use std::{
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    axum::{
        Router,
        body::{Body, BodyDataStream, Bytes},
        extract::State,
        http::{HeaderMap, Method, StatusCode, header},
        response::{IntoResponse, Response},
        routing::any,
    },
    bytes::BytesMut,
    futures::{FutureExt, StreamExt},
    tokio::sync::Semaphore,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use hookrelay_metrics::{counter, gauge, histogram, labels, webhook as webhook_metrics};

use crate::{
    auth,
    config::WebhookAccountConfig,
    error::{Error, Result},
    inbound,
    pipeline::Pipeline,
    runtime::WebhookRuntime,
    state::ActivityClock,
};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Oversized bodies are read and dropped up to this many extra bytes.
const MAX_DISCARD_BYTES: usize = 8 * 1024 * 1024;
const DISCARD_TIMEOUT: Duration = Duration::from_secs(5);

/// How long shutdown waits for in-flight pipelines.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct ListenerState {
    account_id: Arc<str>,
    token: Arc<str>,
    pipeline: Pipeline,
    activity: Arc<ActivityClock>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
}

/// A running listener.
pub struct ServerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the listener to stop. Returns immediately; safe to call repeatedly.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the listener, in-flight pipelines and the usage tracker
    /// have stopped. Call [`shutdown`](Self::shutdown) first.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "webhook listener task ended abnormally");
        }
    }
}

/// Bind the account's listener and start serving.
///
/// Also starts the usage tracker; it is stopped (with a final save) when the
/// listener shuts down.
pub async fn start_server(
    config: Arc<WebhookAccountConfig>,
    runtime: WebhookRuntime,
    activity: Arc<ActivityClock>,
) -> Result<ServerHandle> {
    let misconfigured = |message: &str| Error::Misconfigured {
        account_id: config.account_id.clone(),
        message: message.to_string(),
    };
    let token = config
        .inbound
        .token()
        .ok_or_else(|| misconfigured("inbound token is not set"))?;
    let path = config.inbound.path.clone();
    if !path.starts_with('/') || path == "/health" {
        return Err(misconfigured("inbound path must start with '/' and differ from /health"));
    }
    if config.inbound.max_concurrent == 0 {
        return Err(misconfigured("inbound.maxConcurrent must be at least 1"));
    }

    let addr = config.inbound.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| Error::Bind { addr, source })?;

    runtime.usage.start(&runtime.usage_bus);

    let tasks = TaskTracker::new();
    let state = ListenerState {
        account_id: Arc::from(config.account_id.as_str()),
        token: Arc::from(token),
        pipeline: Pipeline::new(runtime.clone(), Arc::clone(&config), Arc::clone(&activity)),
        activity,
        permits: Arc::new(Semaphore::new(config.inbound.max_concurrent)),
        tasks: tasks.clone(),
    };
    let app = Router::new()
        .route("/health", any(health))
        .route(&path, any(handle_inbound))
        .fallback(not_found)
        .with_state(state);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    let account_id = config.account_id.clone();
    let usage = runtime.usage.clone();
    let task = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!(%account_id, error = %e, "webhook listener failed");
        }

        tasks.close();
        if tokio::time::timeout(DRAIN_TIMEOUT, tasks.wait()).await.is_err() {
            warn!(%account_id, pending = tasks.len(), "in-flight messages did not finish before shutdown");
        }
        usage.stop().await;
        info!(%account_id, "webhook listener stopped");
    });

    info!(account_id = %config.account_id, addr = %local_addr, %path, "webhook listener started");
    Ok(ServerHandle {
        local_addr,
        cancel,
        task,
    })
}

fn respond(status: StatusCode, body: impl IntoResponse) -> Response {
    #[cfg(feature = "metrics")]
    counter!(webhook_metrics::INBOUND_REQUESTS_TOTAL, labels::STATUS => status.as_u16().to_string()).increment(1);
    (status, body).into_response()
}

async fn health() -> &'static str {
    "ok"
}

async fn not_found() -> Response {
    respond(StatusCode::NOT_FOUND, "not found")
}

async fn handle_inbound(
    State(state): State<ListenerState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method != Method::POST {
        let mut resp = respond(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        resp.headers_mut()
            .insert(header::ALLOW, header::HeaderValue::from_static("POST"));
        return resp;
    }

    if !auth::validate_bearer_token(&headers, &state.token) {
        debug!(account_id = %state.account_id, "rejecting unauthenticated request");
        return respond(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES as u64) {
        discard_rest(body.into_data_stream()).await;
        return respond(StatusCode::PAYLOAD_TOO_LARGE, "payload too large");
    }

    let bytes = match read_limited(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(BodyError::TooLarge) => return respond(StatusCode::PAYLOAD_TOO_LARGE, "payload too large"),
        Err(BodyError::Read) => return respond(StatusCode::BAD_REQUEST, "failed to read body"),
    };

    let msg = match inbound::decode_inbound(&bytes) {
        Ok(msg) => msg,
        Err(rejection) => {
            debug!(account_id = %state.account_id, %rejection, "rejecting malformed request");
            return respond(StatusCode::BAD_REQUEST, rejection.to_string());
        },
    };

    state.activity.mark_inbound();
    debug!(account_id = %state.account_id, sender = %msg.from, "accepted inbound message");
    spawn_pipeline(&state, msg);
    respond(StatusCode::OK, "ok")
}

/// Run the pipeline on a tracked task, bounded by the semaphore. Errors and
/// panics end here.
fn spawn_pipeline(state: &ListenerState, msg: inbound::InboundMessage) {
    let pipeline = state.pipeline.clone();
    let permits = Arc::clone(&state.permits);
    let account_id = Arc::clone(&state.account_id);
    state.tasks.spawn(async move {
        let Ok(_permit) = permits.acquire_owned().await else {
            return;
        };
        let sender = msg.from.clone();
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        gauge!(webhook_metrics::PIPELINES_ACTIVE).increment(1.0);

        let outcome = AssertUnwindSafe(pipeline.process(msg)).catch_unwind().await;

        #[cfg(feature = "metrics")]
        {
            gauge!(webhook_metrics::PIPELINES_ACTIVE).decrement(1.0);
            histogram!(webhook_metrics::PIPELINE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(())) => debug!(%account_id, %sender, elapsed_ms, "inbound message processed"),
            Ok(Err(e)) => warn!(%account_id, %sender, elapsed_ms, error = %e, "inbound message processing failed"),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(%account_id, %sender, panic = %message, "inbound message processing panicked");
            },
        }
    });
}

enum BodyError {
    TooLarge,
    Read,
}

async fn read_limited(body: Body, limit: usize) -> std::result::Result<Bytes, BodyError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(frame) = stream.next().await {
        let chunk = frame.map_err(|_| BodyError::Read)?;
        if buf.len() + chunk.len() > limit {
            drop(buf);
            discard_rest(stream).await;
            return Err(BodyError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Read and drop the remainder of a body, bounded in bytes and time.
async fn discard_rest(mut stream: BodyDataStream) {
    let drain = async {
        let mut seen = 0usize;
        while let Some(Ok(chunk)) = stream.next().await {
            seen += chunk.len();
            if seen > MAX_DISCARD_BYTES {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(DISCARD_TIMEOUT, drain).await;
}
