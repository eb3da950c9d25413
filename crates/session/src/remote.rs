//! Renderer process driven over a JSON-lines protocol.
//!
//! Requests go to the renderer's stdin, one JSON object per line:
//!
//! ```text
//! {"id":1,"method":"renderFrame","params":{...}}
//! ```
//!
//! The renderer answers on stdout with `{"id":1,"result":...}` or
//! `{"id":1,"error":{"kind":"navigation","message":"..."}}`, and may emit
//! unsolicited events at any time:
//!
//! ```text
//! {"event":"assetError","kind":"image","message":"..."}
//! {"event":"console","message":"..."}
//! ```
//!
//! Binary results are base64 strings under `data`, optionally as a data URL.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use framecast_common::config::RendererConfig;
use framecast_common::error::{AssetErrorKind, FramecastError, FramecastResult};
use framecast_document::Document;

use crate::capture::AssetError;
use crate::options::RenderOptions;
use crate::session::{
    next_session_id, AssetErrorReceiver, AssetErrorSender, DocumentFormat, FrameRequest, Session,
    SessionFactory, SessionId, SessionSetting,
};

/// Target used for renderer console output.
const RENDERER_LOG_TARGET: &str = "framecast::renderer";

type Reply = oneshot::Sender<FramecastResult<Value>>;

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: String,
}

impl RemoteError {
    fn into_error(self, method: &str) -> FramecastError {
        let message = if self.message.is_empty() {
            format!("{method}: renderer reported an error")
        } else {
            format!("{method}: {}", self.message)
        };
        match self.kind.as_deref() {
            Some("navigation") | Some("process") => FramecastError::navigation(message),
            Some("timeout") => FramecastError::timeout(message),
            _ => FramecastError::render(message),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum Event {
    AssetError {
        #[serde(default)]
        kind: Option<AssetErrorKind>,
        message: String,
    },
    Console {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Incoming {
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<RemoteError>,
    },
    Event(Event),
}

/// State shared between a session and its stdout reader task.
#[derive(Default)]
struct Channel {
    pending: Mutex<HashMap<u64, (String, Reply)>>,
    sink: Mutex<Option<AssetErrorSender>>,
    closed: AtomicBool,
}

impl Channel {
    fn dispatch(&self, line: &str) {
        let incoming: Incoming = match serde_json::from_str(line) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::debug!(target: RENDERER_LOG_TARGET, "Ignoring malformed line ({e}): {line}");
                return;
            }
        };
        match incoming {
            Incoming::Response { id, result, error } => {
                let entry = self
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id);
                let Some((method, reply)) = entry else {
                    tracing::debug!(id, "Response for unknown request");
                    return;
                };
                let outcome = match error {
                    Some(error) => Err(error.into_error(&method)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = reply.send(outcome);
            }
            Incoming::Event(Event::AssetError { kind, message }) => {
                let error = match kind {
                    Some(kind) => AssetError::new(kind, message),
                    None => AssetError::from_message(message),
                };
                let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
                match sink.as_ref() {
                    Some(tx) => {
                        let _ = tx.send(error);
                    }
                    None => tracing::warn!(kind = %error.kind, "Asset error with no sink installed: {}", error.message),
                }
            }
            Incoming::Event(Event::Console { message }) => {
                tracing::debug!(target: RENDERER_LOG_TARGET, "{}", message);
            }
        }
    }

    /// Mark the channel closed and fail every request still waiting.
    fn fail_pending(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (_, (method, reply)) in drained {
            let _ = reply.send(Err(FramecastError::navigation(format!("{method}: {reason}"))));
        }
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// A session backed by one renderer process.
pub struct RemoteSession {
    id: SessionId,
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Child>,
    channel: Arc<Channel>,
    next_request: AtomicU64,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl RemoteSession {
    /// Start a renderer process and attach to its stdio.
    pub fn spawn(config: &RendererConfig) -> FramecastResult<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        if let Some(key) = &config.key {
            cmd.arg("--key").arg(key);
        }
        if let Some(url) = &config.client_url {
            cmd.arg("--client-url").arg(url);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            FramecastError::session(format!(
                "Failed to start renderer '{}': {e}",
                config.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FramecastError::session("Failed to capture renderer stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FramecastError::session("Failed to capture renderer stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: RENDERER_LOG_TARGET, "{}", line);
                }
            });
        }

        let id = next_session_id();
        let channel = Arc::new(Channel::default());
        let reader = tokio::spawn(read_loop(id, stdout, Arc::clone(&channel)));

        Ok(Self {
            id,
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(child),
            channel,
            next_request: AtomicU64::new(1),
            timeout: Duration::from_millis(config.protocol_timeout_ms),
            reader,
        })
    }

    async fn request(&self, method: &str, params: Value) -> FramecastResult<Value> {
        if self.channel.closed.load(Ordering::SeqCst) {
            return Err(FramecastError::navigation(format!(
                "{method}: renderer process is not running"
            )));
        }

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.channel
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, (method.to_string(), tx));
        // The reader may have closed the channel between the check and the insert.
        if self.channel.closed.load(Ordering::SeqCst) {
            self.forget(id);
            return Err(FramecastError::navigation(format!(
                "{method}: renderer process is not running"
            )));
        }

        let mut line = serde_json::to_string(&json!({
            "id": id,
            "method": method,
            "params": params,
        }))?;
        line.push('\n');
        tracing::debug!(session = self.id, id, method, "Sending renderer request");

        let write = async {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        if let Err(e) = write.await {
            self.forget(id);
            return Err(FramecastError::navigation(format!(
                "{method}: failed to write to renderer: {e}"
            )));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(FramecastError::navigation(format!(
                "{method}: renderer dropped the request"
            ))),
            Err(_) => {
                self.forget(id);
                Err(FramecastError::timeout(format!(
                    "{method} did not complete within {} ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    fn forget(&self, id: u64) {
        self.channel
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    async fn request_bytes(&self, method: &str, params: Value) -> FramecastResult<Vec<u8>> {
        let result = self.request(method, params).await?;
        decode_payload(&result).map_err(|e| FramecastError::render(format!("{method}: {e}")))
    }
}

async fn read_loop(id: SessionId, stdout: ChildStdout, channel: Arc<Channel>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => channel.dispatch(&line),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(session = id, "Failed to read renderer output: {}", e);
                break;
            }
        }
    }
    tracing::debug!(session = id, "Renderer output closed");
    channel.fail_pending("renderer process exited");
}

/// Decode a binary result: `{"data": "<base64>"}`, a bare base64 string, or
/// either form as a data URL.
fn decode_payload(result: &Value) -> Result<Vec<u8>, String> {
    let encoded = match result {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| "result has no 'data' field".to_string())?,
        other => return Err(format!("expected binary payload, got {other}")),
    };
    let encoded = match encoded.split_once("base64,") {
        Some((_, rest)) if encoded.starts_with("data:") => rest,
        _ => encoded,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("invalid base64 payload: {e}"))
}

#[async_trait::async_trait]
impl Session for RemoteSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn load(&self, document: &Document) -> FramecastResult<()> {
        let document = document.to_json_value()?;
        self.request("load", json!({ "document": document })).await?;
        Ok(())
    }

    async fn configure(&self, setting: SessionSetting) -> FramecastResult<()> {
        self.request("configure", serde_json::to_value(setting)?).await?;
        Ok(())
    }

    async fn seek(&self, time_ms: f64) -> FramecastResult<()> {
        self.request("seek", json!({ "timeMs": time_ms })).await?;
        Ok(())
    }

    async fn render_frame(&self, request: &FrameRequest) -> FramecastResult<Vec<u8>> {
        self.request_bytes("renderFrame", serde_json::to_value(request)?)
            .await
    }

    async fn export_document(
        &self,
        format: DocumentFormat,
        options: &RenderOptions,
    ) -> FramecastResult<Vec<u8>> {
        self.request_bytes(
            "exportDocument",
            json!({ "format": format, "options": options }),
        )
        .await
    }

    async fn evaluate(&self, function: &str, args: Vec<Value>) -> FramecastResult<Value> {
        self.request("evaluate", json!({ "function": function, "args": args }))
            .await
    }

    async fn install_error_sink(&self) -> FramecastResult<AssetErrorReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.channel.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        self.request("installErrorSink", Value::Null).await?;
        Ok(rx)
    }

    async fn close(&self) -> FramecastResult<()> {
        if self.channel.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.request("close", Value::Null).await {
            tracing::debug!(session = self.id, "Renderer close request failed: {}", e);
        }
        self.channel.fail_pending("session closed");

        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(session = self.id, %status, "Renderer exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(session = self.id, "Failed to wait for renderer: {}", e);
            }
            Err(_) => {
                tracing::warn!(session = self.id, "Renderer did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Spawns one renderer process per session.
#[derive(Debug, Clone)]
pub struct RemoteSessionFactory {
    config: RendererConfig,
}

impl RemoteSessionFactory {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl SessionFactory for RemoteSessionFactory {
    async fn open(&self) -> FramecastResult<Arc<dyn Session>> {
        let session = RemoteSession::spawn(&self.config)?;
        tracing::info!(session = session.id(), command = %self.config.command, "Started renderer");
        Ok(Arc::new(session))
    }
}
