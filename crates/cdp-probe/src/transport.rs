//! Command transport over the browser's DevTools connection.
//!
//! One loop owns the websocket: commands arrive over an mpsc control
//! channel, responses are matched back to their callers through an
//! in-flight call map. The transport also owns the child process; closing
//! the transport terminates it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ProbeError, ProbeErrorKind};
use crate::metrics;
use crate::util::extract_ws_url;

/// Addressing for a protocol command: the browser endpoint itself or an
/// attached target session.
#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

/// Seam between the probe and the wire. Fakes implement this in tests.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, ProbeError>;

    /// Tear down the connection and the process behind it. Idempotent.
    async fn shutdown(&self);
}

struct ControlMessage {
    target: CommandTarget,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, ProbeError>>,
}

pub struct ChromiumTransport {
    command_tx: mpsc::Sender<ControlMessage>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
    command_timeout: Duration,
}

impl ChromiumTransport {
    /// Launch the configured browser, scrape its DevTools endpoint and
    /// start the command loop.
    pub async fn start(
        config: BrowserConfig,
        launch_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let mut child = config.launch().map_err(|err| {
            ProbeError::new(ProbeErrorKind::Internal)
                .with_hint(format!("failed to launch browser: {err}"))
        })?;

        let ws_url = match extract_ws_url(&mut child, launch_timeout).await {
            Ok(url) => url,
            Err(err) => {
                if let Err(kill_err) = child.kill().await {
                    debug!(target: "cdp-probe", ?kill_err, "failed to kill unready browser child");
                }
                return Err(
                    ProbeError::new(ProbeErrorKind::Internal).with_hint(err.to_string())
                );
            }
        };

        let conn = match Connection::<CdpEventMessage>::connect(&ws_url).await {
            Ok(conn) => conn,
            Err(err) => {
                if let Err(kill_err) = child.kill().await {
                    debug!(target: "cdp-probe", ?kill_err, "failed to kill unconnected browser child");
                }
                return Err(ProbeError::new(ProbeErrorKind::Internal)
                    .with_hint(format!("devtools connect failed: {err}")));
            }
        };

        let (command_tx, command_rx) = mpsc::channel(64);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();

        let loop_task = tokio::spawn(async move {
            let result = Self::run_loop(conn, command_rx).await;
            loop_alive.store(false, Ordering::Relaxed);
            if let Err(err) = result {
                warn!(target: "cdp-probe", %err, "command loop terminated with error");
            }
        });

        info!(target: "cdp-probe", url = %ws_url, "browser connection established");

        Ok(Self {
            command_tx,
            loop_task: Mutex::new(Some(loop_task)),
            child: Mutex::new(Some(child)),
            alive,
            command_timeout,
        })
    }

    /// False once the command loop has exited, whether cleanly or not.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn run_loop(
        mut conn: Connection<CdpEventMessage>,
        mut command_rx: mpsc::Receiver<ControlMessage>,
    ) -> Result<(), ProbeError> {
        let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, ProbeError>>> =
            HashMap::new();

        loop {
            tokio::select! {
                Some(cmd) = command_rx.recv() => {
                    Self::handle_command(&mut conn, cmd, &mut inflight)?;
                }
                message = conn.next() => {
                    match message {
                        Some(Ok(Message::Response(resp))) => {
                            Self::handle_response(resp, &mut inflight);
                        }
                        Some(Ok(Message::Event(_))) => {
                            metrics::record_event();
                        }
                        Some(Err(err)) => {
                            let probe_err = map_cdp_error(err);
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(probe_err.clone()));
                            }
                            return Err(probe_err);
                        }
                        None => {
                            let err = ProbeError::new(ProbeErrorKind::Internal)
                                .with_hint("devtools connection closed");
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(err.clone()));
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn handle_command(
        conn: &mut Connection<CdpEventMessage>,
        cmd: ControlMessage,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, ProbeError>>>,
    ) -> Result<(), ProbeError> {
        let session = match cmd.target {
            CommandTarget::Browser => None,
            CommandTarget::Session(session_id) => Some(CdpSessionId::from(session_id)),
        };

        let method_id: MethodId = cmd.method.clone().into();
        match conn.submit_command(method_id, session, cmd.params) {
            Ok(call_id) => {
                inflight.insert(call_id, cmd.responder);
                Ok(())
            }
            Err(err) => {
                let probe_err = map_cdp_error(CdpError::Serde(err));
                let _ = cmd.responder.send(Err(probe_err.clone()));
                Err(probe_err)
            }
        }
    }

    fn handle_response(
        resp: Response,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, ProbeError>>>,
    ) {
        let entry = inflight.remove(&resp.id);
        let result = Self::extract_payload(resp);

        if let Some(sender) = entry {
            let _ = sender.send(result);
        }
    }

    fn extract_payload(resp: Response) -> Result<Value, ProbeError> {
        if let Some(result) = resp.result {
            Ok(result)
        } else if let Some(error) = resp.error {
            Err(ProbeError::new(ProbeErrorKind::Internal)
                .with_hint(format!("cdp error {}: {}", error.code, error.message)))
        } else {
            Err(ProbeError::new(ProbeErrorKind::Internal).with_hint("empty cdp response"))
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, ProbeError> {
        let started = std::time::Instant::now();
        metrics::record_command(method);

        let (resp_tx, resp_rx) = oneshot::channel();
        let message = ControlMessage {
            target,
            method: method.to_string(),
            params,
            responder: resp_tx,
        };

        self.command_tx.send(message).await.map_err(|err| {
            metrics::record_command_failure(method);
            ProbeError::new(ProbeErrorKind::Internal).with_hint(err.to_string())
        })?;

        let outcome = match tokio::time::timeout(self.command_timeout, resp_rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(ProbeError::new(ProbeErrorKind::Internal)
                .with_hint("command response channel closed")),
            Err(_) => Err(ProbeError::new(ProbeErrorKind::Internal)
                .with_hint(format!("command {method} timed out on the wire"))),
        };

        match outcome {
            Ok(value) => {
                metrics::record_command_success(method, started.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(err)
            }
        }
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);

        if let Some(task) = self.loop_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                warn!(target: "cdp-probe", ?err, "failed to kill browser child");
            } else {
                debug!(target: "cdp-probe", "browser child terminated");
            }
        }
    }
}

impl Drop for ChromiumTransport {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);

        if let Ok(mut guard) = self.loop_task.try_lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }

        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(target: "cdp-probe", ?err, "failed to kill browser child");
                        }
                    });
                } else {
                    debug!(target: "cdp-probe", "no runtime available to kill browser child");
                }
            }
        }
    }
}

fn map_cdp_error(err: CdpError) -> ProbeError {
    ProbeError::new(ProbeErrorKind::Internal).with_hint(err.to_string())
}
