#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    axum::{Json, Router, routing::post},
    hookrelay_channels::{
        ChannelPlugin, InboundContext, PairingStore, ReplyDispatcher, ReplyKind, ReplySink,
        pairing::FilePairingStore,
    },
    hookrelay_common::types::ReplyPayload,
    hookrelay_routing::DefaultRouter,
    hookrelay_sessions::FileSessionStore,
    hookrelay_usage::{TokenUsageTracker, UsageEvent, UsageEventBus},
    hookrelay_webhook::{WebhookPlugin, WebhookRuntime, server::MAX_BODY_BYTES},
    serde_json::{Value, json},
    tokio::sync::mpsc,
};

const TOKEN: &str = "in-secret";
const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUg==";

/// Backend that records contexts, emits a usage event, and echoes the text.
struct EchoBackend {
    delay: Duration,
    seen: mpsc::UnboundedSender<InboundContext>,
    bus: UsageEventBus,
}

#[async_trait]
impl ReplyDispatcher for EchoBackend {
    async fn dispatch(&self, ctx: InboundContext, sink: Arc<dyn ReplySink>) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        let reply = format!("echo: {}", ctx.raw_body);
        self.seen.send(ctx).ok();
        self.bus.emit(UsageEvent::new("test", "echo", 3, 4));
        sink.deliver(ReplyPayload::text(reply), ReplyKind::Final).await
    }
}

struct Harness {
    plugin: WebhookPlugin,
    base: String,
    http: reqwest::Client,
    contexts: mpsc::UnboundedReceiver<InboundContext>,
    outbound: mpsc::UnboundedReceiver<Value>,
    pairing: Arc<FilePairingStore>,
    account: Value,
    dir: tempfile::TempDir,
}

async fn outbound_receiver() -> (String, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let router = Router::new().route(
        "/out",
        post(move |Json(body): Json<Value>| {
            let tx = tx.clone();
            async move {
                tx.send(body).ok();
                Json(json!({ "messageId": "m-1" }))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}/out"), rx)
}

async fn harness(dm: Value, delay: Duration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let (out_url, outbound) = outbound_receiver().await;
    let (seen, contexts) = mpsc::unbounded_channel();
    let bus = UsageEventBus::default();
    let pairing = Arc::new(FilePairingStore::new(dir.path().join("pairing")));

    let runtime = WebhookRuntime::new(
        Arc::new(EchoBackend {
            delay,
            seen,
            bus: bus.clone(),
        }),
        Arc::new(DefaultRouter::new("main")),
        Arc::new(FileSessionStore::open(dir.path().join("sessions.json")).unwrap()),
        Arc::clone(&pairing) as Arc<dyn PairingStore>,
        TokenUsageTracker::new(dir.path().join("usage.json"), Duration::from_secs(3600)),
        bus,
        dir.path(),
    );
    let account = json!({
        "inbound": { "host": "127.0.0.1", "port": 0, "token": TOKEN },
        "outbound": { "url": out_url, "token": "out-secret", "timeoutSeconds": 5 },
        "dm": dm
    });
    let mut plugin = WebhookPlugin::new(runtime);
    plugin.start_account("default", account.clone()).await.unwrap();
    let addr = plugin.local_addr("default").unwrap();

    Harness {
        plugin,
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        contexts,
        outbound,
        pairing,
        account,
        dir,
    }
}

fn open_dm() -> Value {
    json!({ "policy": "open", "allowFrom": ["*"] })
}

impl Harness {
    async fn post(&self, body: Value) -> reqwest::Response {
        self.http
            .post(format!("{}/", self.base))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn post_raw(&self, body: Vec<u8>) -> reqwest::Response {
        self.http
            .post(format!("{}/", self.base))
            .bearer_auth(TOKEN)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    let got = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(got.is_err(), "expected nothing, got {got:?}");
}

#[tokio::test]
async fn health_needs_no_auth() {
    let h = harness(open_dm(), Duration::ZERO).await;
    let resp = h.http.get(format!("{}/health", h.base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn protocol_errors_map_to_status_codes() {
    let h = harness(open_dm(), Duration::ZERO).await;
    let url = format!("{}/", h.base);
    let body = json!({ "from": "alice", "text": "hi" });

    let resp = h.http.post(&url).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = h.http.post(&url).bearer_auth("wrong").json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = h.http.get(&url).bearer_auth(TOKEN).send().await.unwrap();
    assert_eq!(resp.status(), 405);
    assert_eq!(resp.headers()["allow"], "POST");

    let resp = h.http.post(format!("{}/elsewhere", h.base)).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    assert_eq!(h.post_raw(b"{oops".to_vec()).await.status(), 400);
    assert_eq!(h.post_raw(Vec::new()).await.status(), 400);
    assert_eq!(h.post(json!({ "text": "no sender" })).await.status(), 400);
    let resp = h.post(json!({ "from": "alice" })).await;
    assert_eq!(resp.status(), 400);
    assert!(resp.text().await.unwrap().contains("text"));
}

#[tokio::test]
async fn vendor_header_authenticates() {
    let h = harness(open_dm(), Duration::ZERO).await;
    let resp = h
        .http
        .post(format!("{}/", h.base))
        .header("X-Hookrelay-Token", TOKEN)
        .json(&json!({ "from": "alice", "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

fn body_of_len(len: usize) -> Vec<u8> {
    let shell = json!({ "from": "alice", "text": "" }).to_string();
    let padding = "a".repeat(len - shell.len());
    let body = json!({ "from": "alice", "text": padding }).to_string();
    assert_eq!(body.len(), len);
    body.into_bytes()
}

#[tokio::test]
async fn body_cap_is_exactly_one_mebibyte() {
    let mut h = harness(open_dm(), Duration::ZERO).await;
    assert_eq!(h.post_raw(body_of_len(MAX_BODY_BYTES)).await.status(), 200);
    assert_eq!(h.post_raw(body_of_len(MAX_BODY_BYTES + 1)).await.status(), 413);

    // Only the accepted message reaches the backend.
    let ctx = recv(&mut h.contexts).await;
    assert!(ctx.raw_body.len() > MAX_BODY_BYTES - 64);
    assert!(ctx.raw_body.bytes().all(|b| b == b'a'));
    assert_silent(&mut h.contexts).await;
}

#[tokio::test]
async fn acknowledges_before_slow_backend_finishes() {
    let mut h = harness(open_dm(), Duration::from_secs(2)).await;
    let started = Instant::now();
    let resp = h.post(json!({ "from": "alice", "text": "slow" })).await;
    assert_eq!(resp.status(), 200);
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert!(h.contexts.try_recv().is_err());

    let ctx = recv(&mut h.contexts).await;
    assert_eq!(ctx.raw_body, "slow");
}

#[tokio::test]
async fn end_to_end_dispatch_and_reply() {
    let mut h = harness(open_dm(), Duration::ZERO).await;
    let resp = h
        .post(json!({ "from": "alice", "fromName": "Alice", "text": " hello ", "messageId": "x1" }))
        .await;
    assert_eq!(resp.status(), 200);

    let ctx = recv(&mut h.contexts).await;
    assert_eq!(ctx.raw_body, "hello");
    assert_eq!(ctx.from, "webhook:alice");
    assert_eq!(ctx.to, "webhook:default");
    assert_eq!(ctx.channel, "webhook");
    assert_eq!(ctx.agent_id, "main");
    assert_eq!(ctx.session_key, "agent:main:webhook:direct:alice");
    assert_eq!(ctx.message_id.as_deref(), Some("x1"));
    assert!(ctx.body.starts_with("[Webhook Alice "), "{}", ctx.body);
    assert!(ctx.body.ends_with("] hello"));
    assert!(!ctx.command_authorized);

    let out = recv(&mut h.outbound).await;
    assert_eq!(out["text"], "echo: hello");
    assert_eq!(out["to"], "alice");
    assert!(out.get("usage").is_none());

    // The second message in the session carries the elapsed time.
    h.post(json!({ "from": "alice", "text": "again" })).await;
    let ctx = recv(&mut h.contexts).await;
    assert!(ctx.body.starts_with("[Webhook alice +"), "{}", ctx.body);
}

#[tokio::test]
async fn inbound_media_is_saved_and_listed() {
    let mut h = harness(open_dm(), Duration::ZERO).await;
    h.post(json!({
        "from": "alice",
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": "see attached" },
                { "type": "image", "image": PNG_DATA_URL },
                { "type": "image", "image": "not base64 at all!!" }
            ]
        }]
    }))
    .await;

    let ctx = recv(&mut h.contexts).await;
    assert_eq!(ctx.raw_body, "see attached");
    assert_eq!(ctx.media_paths.len(), 1);
    assert_eq!(ctx.media_types, vec!["image/png"]);
    assert_eq!(ctx.media_path.as_deref(), Some(ctx.media_paths[0].as_str()));
    let path = std::path::Path::new(&ctx.media_paths[0]);
    assert!(path.starts_with(h.dir.path().join("media/webhook/default/inbound")));
    assert!(path.exists());
}

#[tokio::test]
async fn media_without_text_is_not_dispatched() {
    let mut h = harness(open_dm(), Duration::ZERO).await;
    let resp = h
        .post(json!({
            "from": "alice",
            "messages": [{
                "role": "user",
                "content": [{ "type": "image", "image": PNG_DATA_URL }]
            }]
        }))
        .await;
    assert_eq!(resp.status(), 200);
    assert_silent(&mut h.contexts).await;
    assert_silent(&mut h.outbound).await;
    assert!(!h.dir.path().join("media").exists());
}

#[tokio::test]
async fn pairing_handshake() {
    let mut h = harness(json!({ "policy": "pairing" }), Duration::ZERO).await;

    h.post(json!({ "from": "bob", "text": "hi" })).await;
    let out = recv(&mut h.outbound).await;
    assert_eq!(out["to"], "bob");
    let requests = h.pairing.list_requests("webhook").await.unwrap();
    assert_eq!(requests.len(), 1);
    let code = requests[0].code.clone();
    assert!(out["text"].as_str().unwrap().contains(&code));

    // Still pending: nothing is sent, nothing is dispatched.
    h.post(json!({ "from": "bob", "text": "hello?" })).await;
    assert_silent(&mut h.outbound).await;
    assert_silent(&mut h.contexts).await;

    h.pairing.approve("webhook", &code).await.unwrap().unwrap();
    h.post(json!({ "from": "bob", "text": "paired" })).await;
    assert_eq!(recv(&mut h.contexts).await.raw_body, "paired");
}

#[tokio::test]
async fn allowlist_drops_unknown_senders_silently() {
    let mut h = harness(json!({ "policy": "allowlist", "allowFrom": ["carol"] }), Duration::ZERO).await;
    let resp = h.post(json!({ "from": "mallory", "text": "let me in" })).await;
    assert_eq!(resp.status(), 200);
    assert_silent(&mut h.contexts).await;
    assert_silent(&mut h.outbound).await;

    h.post(json!({ "from": "carol", "text": "hi" })).await;
    assert_eq!(recv(&mut h.contexts).await.sender_id, "carol");
}

#[tokio::test]
async fn stop_flushes_usage_and_closes_listener() {
    let mut h = harness(open_dm(), Duration::ZERO).await;
    h.post(json!({ "from": "alice", "text": "count me" })).await;
    recv(&mut h.contexts).await;
    recv(&mut h.outbound).await;

    h.plugin.stop_account("default").await.unwrap();
    h.plugin.stop_account("default").await.unwrap();

    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(h.dir.path().join("usage.json")).unwrap()).unwrap();
    assert_eq!(saved["allTime"]["providers"]["test"]["echo"]["totalTokens"], 7);

    assert!(h.http.get(format!("{}/health", h.base)).send().await.is_err());
}

#[tokio::test]
async fn usage_keeps_counting_across_restart() {
    let mut h = harness(open_dm(), Duration::ZERO).await;
    h.post(json!({ "from": "alice", "text": "first" })).await;
    recv(&mut h.contexts).await;
    recv(&mut h.outbound).await;

    h.plugin.stop_account("default").await.unwrap();
    h.plugin
        .start_account("default", h.account.clone())
        .await
        .unwrap();
    h.base = format!("http://{}", h.plugin.local_addr("default").unwrap());

    h.post(json!({ "from": "alice", "text": "second" })).await;
    recv(&mut h.contexts).await;
    recv(&mut h.outbound).await;
    h.plugin.stop_account("default").await.unwrap();

    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(h.dir.path().join("usage.json")).unwrap()).unwrap();
    let echo = &saved["allTime"]["providers"]["test"]["echo"];
    assert_eq!(echo["requestCount"], 2);
    assert_eq!(echo["totalTokens"], 14);
}

#[tokio::test]
async fn refuses_second_account_and_bad_policy() {
    let mut h = harness(open_dm(), Duration::ZERO).await;
    let err = h
        .plugin
        .start_account("other", json!({ "inbound": { "port": 0, "token": "t" } }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("only one account"));

    h.plugin.stop_account("default").await.unwrap();
    let err = h
        .plugin
        .start_account(
            "default",
            json!({
                "inbound": { "host": "127.0.0.1", "port": 0, "token": "t" },
                "dm": { "policy": "open", "allowFrom": ["alice"] }
            }),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("allowFrom"));
}
