//! Job execution against renderer sessions.
//!
//! A job is an async closure run against exactly one session. The runner
//! owns the busy-set, applies per-job settings, wires the asset-error
//! channel, and decides which error wins when a job finishes.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use framecast_common::clock::FrameTimer;
use framecast_common::error::{FramecastError, FramecastResult};

use crate::capture::ErrorCapture;
use crate::options::RenderOptions;
use crate::session::{Session, SessionFactory, SessionId};

/// How sessions are assigned to jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// One session opened at connect time and reused; concurrent jobs fail
    /// with [`FramecastError::Busy`].
    #[default]
    Shared,
    /// A new session per job, closed when the job finishes.
    Parallel,
}

/// Runner settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerConfig {
    pub mode: SessionMode,

    /// Log per-job timing at `info`.
    pub profile: bool,
}

impl RunnerConfig {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            profile: false,
        }
    }
}

/// Everything a job gets to work with.
#[derive(Clone)]
pub struct JobContext {
    pub session: Arc<dyn Session>,
    pub options: RenderOptions,
    /// The job's asset-error capture; poll with `check()` between steps to
    /// fail early.
    pub errors: Arc<ErrorCapture>,
}

type BusySet = Arc<Mutex<HashSet<SessionId>>>;

/// Membership of one session in the busy-set. Dropping it removes the entry.
struct BusyGuard {
    busy: BusySet,
    session_id: SessionId,
}

impl BusyGuard {
    fn acquire(busy: &BusySet, session_id: SessionId) -> FramecastResult<Self> {
        let mut set = busy.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(session_id) {
            return Err(FramecastError::Busy { session_id });
        }
        Ok(Self {
            busy: Arc::clone(busy),
            session_id,
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut set = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.session_id);
    }
}

/// Runs jobs against sessions from a [`SessionFactory`].
pub struct JobRunner {
    factory: Arc<dyn SessionFactory>,
    config: RunnerConfig,
    shared: Option<Arc<dyn Session>>,
    busy: BusySet,
}

impl JobRunner {
    /// Create a runner. In shared mode the session is opened immediately.
    pub async fn connect(
        factory: Arc<dyn SessionFactory>,
        config: RunnerConfig,
    ) -> FramecastResult<Self> {
        let shared = match config.mode {
            SessionMode::Shared => {
                let session = factory.open().await?;
                tracing::info!(session = session.id(), "Opened shared renderer session");
                Some(session)
            }
            SessionMode::Parallel => None,
        };
        Ok(Self {
            factory,
            config,
            shared,
            busy: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.config.mode
    }

    /// Whether a session is currently executing a job.
    pub fn is_busy(&self, session_id: SessionId) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&session_id)
    }

    /// Run `job` against a session.
    ///
    /// Captured asset errors supersede the job's own result, unless the job
    /// failed with a navigation/process error.
    pub async fn run<T, F, Fut>(&self, options: &RenderOptions, job: F) -> FramecastResult<T>
    where
        F: FnOnce(JobContext) -> Fut + Send,
        Fut: Future<Output = FramecastResult<T>> + Send,
        T: Send,
    {
        let session = match (&self.shared, self.config.mode) {
            (Some(session), SessionMode::Shared) => Arc::clone(session),
            _ => self.factory.open().await?,
        };
        let parallel = self.config.mode == SessionMode::Parallel;

        let result = match BusyGuard::acquire(&self.busy, session.id()) {
            Ok(guard) => {
                let result = self.run_on(&session, options, job).await;
                drop(guard);
                result
            }
            Err(busy) => Err(busy),
        };

        if parallel {
            if let Err(e) = session.close().await {
                tracing::warn!(session = session.id(), "Failed to close session: {}", e);
            }
        }
        result
    }

    async fn run_on<T, F, Fut>(
        &self,
        session: &Arc<dyn Session>,
        options: &RenderOptions,
        job: F,
    ) -> FramecastResult<T>
    where
        F: FnOnce(JobContext) -> Fut + Send,
        Fut: Future<Output = FramecastResult<T>> + Send,
        T: Send,
    {
        let rx = session.install_error_sink().await?;
        let errors = Arc::new(ErrorCapture::new(rx, options.error_policy()));

        for setting in options.session_settings() {
            tracing::debug!(session = session.id(), ?setting, "Configuring session");
            session.configure(setting).await?;
        }

        let timer = self.config.profile.then(FrameTimer::start);
        let ctx = JobContext {
            session: Arc::clone(session),
            options: options.clone(),
            errors: Arc::clone(&errors),
        };
        let outcome = job(ctx).await;
        if let Some(timer) = timer {
            tracing::info!(
                session = session.id(),
                elapsed_ms = timer.elapsed_ms(),
                ok = outcome.is_ok(),
                "Job finished"
            );
        }

        resolve_outcome(outcome, errors.take())
    }

    /// Close the shared session, if any.
    pub async fn close(&self) -> FramecastResult<()> {
        if let Some(session) = &self.shared {
            tracing::info!(session = session.id(), "Closing shared renderer session");
            session.close().await?;
        }
        Ok(())
    }
}

/// Combine a job result with the error captured after it settled.
fn resolve_outcome<T>(
    outcome: FramecastResult<T>,
    captured: Option<FramecastError>,
) -> FramecastResult<T> {
    match (outcome, captured) {
        (Err(e), captured) if e.is_navigation() => {
            if let Some(captured) = captured {
                tracing::warn!("Discarding captured error after navigation failure: {}", captured);
            }
            Err(e)
        }
        (Err(e), Some(captured)) => {
            tracing::debug!("Captured error supersedes job error: {}", e);
            Err(captured)
        }
        (Ok(_), Some(captured)) => Err(captured),
        (outcome, None) => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_common::error::AssetErrorKind;

    #[test]
    fn test_busy_guard_releases_on_drop() {
        let busy: BusySet = Arc::new(Mutex::new(HashSet::new()));
        let guard = BusyGuard::acquire(&busy, 7).unwrap();
        assert!(matches!(
            BusyGuard::acquire(&busy, 7),
            Err(FramecastError::Busy { session_id: 7 })
        ));
        drop(guard);
        assert!(BusyGuard::acquire(&busy, 7).is_ok());
    }

    #[test]
    fn test_captured_error_supersedes_success() {
        let result = resolve_outcome(
            Ok(42),
            Some(FramecastError::asset(AssetErrorKind::Image, "broken")),
        );
        assert!(matches!(result, Err(FramecastError::Asset { .. })));
    }

    #[test]
    fn test_captured_error_preferred_over_generic_error() {
        let result: FramecastResult<()> = resolve_outcome(
            Err(FramecastError::render("toDataURL failed")),
            Some(FramecastError::asset(AssetErrorKind::Font, "font timeout")),
        );
        assert!(matches!(
            result,
            Err(FramecastError::Asset {
                kind: AssetErrorKind::Font,
                ..
            })
        ));
    }

    #[test]
    fn test_navigation_error_is_returned_as_is() {
        let result: FramecastResult<()> = resolve_outcome(
            Err(FramecastError::navigation("renderer exited")),
            Some(FramecastError::asset(AssetErrorKind::Image, "broken")),
        );
        assert!(matches!(result, Err(FramecastError::Navigation { .. })));
    }

    #[test]
    fn test_no_capture_keeps_outcome() {
        assert_eq!(resolve_outcome(Ok(1), None).unwrap(), 1);
    }
}
