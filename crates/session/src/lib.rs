//! Framecast Session
//!
//! Everything between the export pipeline and an external renderer:
//! - [`Session`]: one addressable renderer context (a loaded document plus
//!   frame and document export capabilities)
//! - [`RemoteSession`]: a renderer process driven over a JSON-lines protocol
//! - [`JobRunner`]: busy-set tracking, per-job configuration, and the
//!   asset-error capture protocol
//! - [`RenderOptions`]: caller-facing render settings

pub mod capture;
pub mod options;
pub mod remote;
pub mod runner;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use capture::{AssetError, ErrorCapture, ErrorPolicy};
pub use options::{PdfUnit, RenderOptions};
pub use remote::{RemoteSession, RemoteSessionFactory};
pub use runner::{JobContext, JobRunner, RunnerConfig, SessionMode};
pub use session::{
    AssetErrorReceiver, AssetErrorSender, DocumentFormat, FrameRequest, Session, SessionFactory,
    SessionId, SessionSetting, next_session_id,
};
