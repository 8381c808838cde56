use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weft_core::{
    deliver, deliver_async, deliver_timeout, Bus, Handler, Manager, ManagerConfig, Result,
    WeftError,
};

/// Caller-facing endpoint over one topic: the adapter shape that turns a
/// bus delivery into an ordinary request/response call.
struct ClientEndpoint {
    bus: Arc<Bus<Value>>,
    topic: String,
    timeout: Duration,
}

impl ClientEndpoint {
    fn new(bus: Arc<Bus<Value>>, topic: &str, timeout: Duration) -> Self {
        Self {
            bus,
            topic: topic.to_string(),
            timeout,
        }
    }

    async fn call(&self, request: Value) -> Result<Value> {
        deliver_timeout(&self.bus, &self.topic, request, self.timeout).await
    }
}

/// Squares `{"n": x}` requests.
struct SquareHandler;

#[async_trait]
impl Handler<Value> for SquareHandler {
    async fn handle(&self, body: Value) -> Result<Value> {
        let n = body
            .get("n")
            .and_then(Value::as_i64)
            .ok_or_else(|| WeftError::Handler("missing numeric field n".into()))?;
        Ok(json!({ "n": n, "squared": n * n }))
    }
}

/// Takes far longer than any caller is willing to wait.
struct SlowReportHandler;

#[async_trait]
impl Handler<Value> for SlowReportHandler {
    async fn handle(&self, body: Value) -> Result<Value> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(body)
    }
}

/// Logs whatever arrives; nobody waits for it.
struct AuditHandler;

#[async_trait]
impl Handler<Value> for AuditHandler {
    async fn handle(&self, body: Value) -> Result<Value> {
        info!(target: "request_reply", "audit: {}", body);
        Ok(Value::Null)
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,weft_core=info,request_reply=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(target: "request_reply", "Starting request/reply demo");

    // Configuration (defaults + WEFT_* env overrides)
    let cfg = ManagerConfig::from_env();
    let mut manager: Manager<Value> = Manager::new(cfg);

    manager.register("math.square", Arc::new(SquareHandler))?;
    manager.register("report.generate", Arc::new(SlowReportHandler))?;
    manager.register("audit.trail", Arc::new(AuditHandler))?;
    manager.listen()?;

    let bus = manager.bus();

    // Synchronous round trips through the endpoint adapter
    let square = ClientEndpoint::new(Arc::clone(&bus), "math.square", Duration::from_secs(2));
    for n in [3i64, 12, -7] {
        match square.call(json!({ "n": n })).await {
            Ok(reply) => info!(target: "request_reply", "square({n}) -> {reply}"),
            Err(e) => warn!(target: "request_reply", "square({n}) failed: {e}"),
        }
    }

    // A malformed request: the handler's error comes back to the caller
    if let Err(e) = square.call(json!({ "name": "not a number" })).await {
        info!(target: "request_reply", "malformed request rejected: {e}");
    }

    // A caller-managed token: give up on the slow report without tearing
    // anything else down
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    match deliver(&bus, "report.generate", json!({ "report": "annual" }), &cancel).await {
        Ok(reply) => warn!(target: "request_reply", "report finished unexpectedly: {reply}"),
        Err(e) => info!(target: "request_reply", "report abandoned: {e}"),
    }

    // Fire-and-forget: the audit trail never answers
    deliver_async(&bus, "audit.trail", json!({ "action": "demo_finished" })).await;

    manager.stop().await;
    info!(target: "request_reply", "Demo complete");
    Ok(())
}
