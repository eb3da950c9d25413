//! In-process renderer double for tests.
//!
//! [`FakeRenderer`] is a [`SessionFactory`] whose sessions record every call
//! and answer deterministically. Frame bytes are the requested timestamp
//! formatted as text, so callers can check which frame landed where.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_document::Document;

use crate::capture::AssetError;
use crate::options::RenderOptions;
use crate::session::{
    next_session_id, AssetErrorReceiver, AssetErrorSender, DocumentFormat, FrameRequest, Session,
    SessionFactory, SessionId, SessionSetting,
};

/// Behaviour knobs shared by every session of a [`FakeRenderer`].
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    /// Sleep inside every `render_frame` and `evaluate` call.
    pub delay: Duration,
    /// Report this asset error when a frame at the given time is rendered.
    pub asset_error_at: Option<(f64, AssetError)>,
    /// Report this asset error while loading the document.
    pub asset_error_on_load: Option<AssetError>,
    /// Fail `render_frame` with a navigation error at the given time.
    pub crash_at: Option<f64>,
    /// Bytes returned by `export_document`.
    pub export_bytes: Vec<u8>,
    /// Value returned by `evaluate`.
    pub evaluate_result: Value,
}

/// A recorded session call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load { pages: usize },
    Configure(SessionSetting),
    Seek(f64),
    Render(FrameRequest),
    Export(DocumentFormat),
    Evaluate(String),
    InstallSink,
    Close,
}

#[derive(Default)]
struct Inner {
    behavior: Mutex<FakeBehavior>,
    calls: Mutex<Vec<(SessionId, Call)>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Factory for recording fake sessions.
#[derive(Clone, Default)]
pub struct FakeRenderer {
    inner: Arc<Inner>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        let renderer = Self::new();
        renderer.set_behavior(behavior);
        renderer
    }

    pub fn set_behavior(&self, behavior: FakeBehavior) {
        *self.inner.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    pub fn factory(&self) -> Arc<dyn SessionFactory> {
        Arc::new(self.clone())
    }

    /// Every call made so far, in order, tagged with the session id.
    pub fn calls(&self) -> Vec<(SessionId, Call)> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Timestamps of all rendered frames, in call order.
    pub fn rendered_times(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|(_, call)| match call {
                Call::Render(request) => request.time_ms,
                _ => None,
            })
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SessionFactory for FakeRenderer {
    async fn open(&self) -> FramecastResult<Arc<dyn Session>> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            id: next_session_id(),
            inner: Arc::clone(&self.inner),
            sink: Mutex::new(None),
        }))
    }
}

/// One fake session.
pub struct FakeSession {
    id: SessionId,
    inner: Arc<Inner>,
    sink: Mutex<Option<AssetErrorSender>>,
}

impl FakeSession {
    fn record(&self, call: Call) {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((self.id, call));
    }

    fn behavior(&self) -> FakeBehavior {
        self.inner
            .behavior
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn report(&self, error: AssetError) {
        if let Some(tx) = self.sink.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            let _ = tx.send(error);
        }
    }
}

#[async_trait::async_trait]
impl Session for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn load(&self, document: &Document) -> FramecastResult<()> {
        self.record(Call::Load {
            pages: document.pages.len(),
        });
        if let Some(error) = self.behavior().asset_error_on_load {
            self.report(error);
        }
        Ok(())
    }

    async fn configure(&self, setting: SessionSetting) -> FramecastResult<()> {
        self.record(Call::Configure(setting));
        Ok(())
    }

    async fn seek(&self, time_ms: f64) -> FramecastResult<()> {
        self.record(Call::Seek(time_ms));
        Ok(())
    }

    async fn render_frame(&self, request: &FrameRequest) -> FramecastResult<Vec<u8>> {
        let behavior = self.behavior();
        self.record(Call::Render(request.clone()));
        if !behavior.delay.is_zero() {
            tokio::time::sleep(behavior.delay).await;
        }
        let time = request.time_ms.unwrap_or(0.0);
        if behavior.crash_at == Some(time) {
            return Err(FramecastError::navigation("renderer crashed"));
        }
        if let Some((at, error)) = behavior.asset_error_at {
            if at == time {
                self.report(error);
            }
        }
        Ok(time.to_string().into_bytes())
    }

    async fn export_document(
        &self,
        format: DocumentFormat,
        _options: &RenderOptions,
    ) -> FramecastResult<Vec<u8>> {
        self.record(Call::Export(format));
        Ok(self.behavior().export_bytes)
    }

    async fn evaluate(&self, function: &str, _args: Vec<Value>) -> FramecastResult<Value> {
        let behavior = self.behavior();
        self.record(Call::Evaluate(function.to_string()));
        if !behavior.delay.is_zero() {
            tokio::time::sleep(behavior.delay).await;
        }
        Ok(behavior.evaluate_result)
    }

    async fn install_error_sink(&self) -> FramecastResult<AssetErrorReceiver> {
        self.record(Call::InstallSink);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        Ok(rx)
    }

    async fn close(&self) -> FramecastResult<()> {
        self.record(Call::Close);
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
