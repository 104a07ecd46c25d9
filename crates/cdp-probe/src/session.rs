//! Logical control session over an allocated browser process.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::debug;

use crate::allocator::BrowserProcess;
use crate::budget::Scope;
use crate::error::{Phase, ProbeError, ProbeErrorKind};
use crate::transport::{CdpTransport, CommandTarget};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// One attached target session, multiplexed over the process's control
/// connection. Torn down independently of, and before, the process.
pub struct PageSession {
    transport: Arc<dyn CdpTransport>,
    target_id: String,
    session_id: String,
}

impl PageSession {
    /// Create a blank target and attach to it. Fails when the endpoint is
    /// unreachable or the handshake outlives `scope`.
    pub async fn connect(scope: &Scope, process: &BrowserProcess) -> Result<Self, ProbeError> {
        let transport = process.transport();
        let result = scope
            .run(Phase::Connection, async {
                let created = transport
                    .send_command(
                        CommandTarget::Browser,
                        "Target.createTarget",
                        json!({ "url": "about:blank" }),
                    )
                    .await?;
                let target_id = created
                    .get("targetId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProbeError::new(ProbeErrorKind::Internal)
                            .with_hint("createTarget missing targetId")
                    })?
                    .to_string();

                let attached = transport
                    .send_command(
                        CommandTarget::Browser,
                        "Target.attachToTarget",
                        json!({ "targetId": target_id, "flatten": true }),
                    )
                    .await?;
                let session_id = attached
                    .get("sessionId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProbeError::new(ProbeErrorKind::Internal)
                            .with_hint("attachToTarget missing sessionId")
                    })?
                    .to_string();

                debug!(target: "cdp-probe", %target_id, "control session attached");

                Ok(Self {
                    transport: Arc::clone(&transport),
                    target_id,
                    session_id,
                })
            })
            .await;

        result.map_err(|err| err.classify(Phase::Connection))
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, ProbeError> {
        self.transport
            .send_command(
                CommandTarget::Session(self.session_id.clone()),
                method,
                params,
            )
            .await
    }

    /// Issue the navigation and wait for the document's load signal. The
    /// readiness wait is unbounded here; the caller's lifetime bounds it.
    pub async fn navigate(&self, url: &str) -> Result<(), ProbeError> {
        let response = self.send("Page.navigate", json!({ "url": url })).await?;

        if let Some(error_text) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(ProbeError::new(ProbeErrorKind::Internal)
                .with_hint(format!("navigation to {url} failed: {error_text}")));
        }

        loop {
            let response = self
                .send(
                    "Runtime.evaluate",
                    json!({
                        "expression": "document.readyState",
                        "returnByValue": true,
                    }),
                )
                .await?;

            let ready = response
                .get("result")
                .and_then(|v| v.get("value"))
                .and_then(Value::as_str)
                .map(|state| matches!(state, "interactive" | "complete"))
                .unwrap_or(false);

            if ready {
                return Ok(());
            }

            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Read the current document title.
    pub async fn read_title(&self) -> Result<String, ProbeError> {
        let response = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": "document.title",
                    "returnByValue": true,
                }),
            )
            .await?;

        response
            .get("result")
            .and_then(|v| v.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ProbeError::new(ProbeErrorKind::Internal)
                    .with_hint("title evaluation returned no value")
            })
    }

    /// Close the target. Best-effort and bounded: teardown must not fail
    /// the invocation or outlast the budget, and the process teardown
    /// behind it reclaims the target regardless.
    pub async fn close(&self) {
        let close = self.transport.send_command(
            CommandTarget::Browser,
            "Target.closeTarget",
            json!({ "targetId": self.target_id }),
        );

        match tokio::time::timeout(CLOSE_GRACE, close).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                debug!(target: "cdp-probe", %err, "target close failed during teardown");
            }
            Err(_) => {
                debug!(target: "cdp-probe", "target close timed out during teardown");
            }
        }
    }
}
