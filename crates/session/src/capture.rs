//! Asynchronous asset-error capture.
//!
//! A renderer reports failures from deferred work (an unreachable image, a
//! font that never loads) on a side channel instead of the call that
//! triggered them. [`ErrorCapture`] drains that channel and applies the
//! caller's skip flags.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TryRecvError;

use framecast_common::error::{AssetErrorKind, FramecastError};

use crate::session::AssetErrorReceiver;

/// One failure reported on a session's asset-error channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetError {
    pub kind: AssetErrorKind,
    pub message: String,
}

impl AssetError {
    pub fn new(kind: AssetErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from a bare message, classifying it by content.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: AssetErrorKind::classify(&message),
            message,
        }
    }

    pub fn into_error(self) -> FramecastError {
        match self.kind {
            AssetErrorKind::Timeout => FramecastError::timeout(self.message),
            kind => FramecastError::asset(kind, self.message),
        }
    }
}

/// Which asset errors a job tolerates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub skip_font_error: bool,
    pub skip_image_error: bool,
}

impl ErrorPolicy {
    /// Whether an error of `kind` is swallowed. Timeouts never are.
    pub fn swallows(&self, kind: AssetErrorKind) -> bool {
        match kind {
            AssetErrorKind::Font => self.skip_font_error,
            AssetErrorKind::Image => self.skip_image_error,
            AssetErrorKind::Video | AssetErrorKind::Timeout | AssetErrorKind::Other => false,
        }
    }
}

/// Drains a session's asset-error channel for the duration of one job.
#[derive(Debug)]
pub struct ErrorCapture {
    rx: Mutex<AssetErrorReceiver>,
    policy: ErrorPolicy,
}

impl ErrorCapture {
    pub fn new(rx: AssetErrorReceiver, policy: ErrorPolicy) -> Self {
        Self {
            rx: Mutex::new(rx),
            policy,
        }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Consume every pending error and return the first one the policy does
    /// not swallow. Swallowed errors are logged.
    pub fn take(&self) -> Option<FramecastError> {
        let mut rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        let mut first: Option<AssetError> = None;
        loop {
            match rx.try_recv() {
                Ok(error) => {
                    if self.policy.swallows(error.kind) {
                        tracing::warn!(kind = %error.kind, "Skipping asset error: {}", error.message);
                    } else if first.is_none() {
                        first = Some(error);
                    } else {
                        tracing::debug!(kind = %error.kind, "Additional asset error: {}", error.message);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        first.map(AssetError::into_error)
    }

    /// Fail if an unskipped error has been captured since the last poll.
    pub fn check(&self) -> Result<(), FramecastError> {
        match self.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn capture(policy: ErrorPolicy) -> (mpsc::UnboundedSender<AssetError>, ErrorCapture) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ErrorCapture::new(rx, policy))
    }

    #[test]
    fn test_empty_channel_yields_nothing() {
        let (_tx, capture) = capture(ErrorPolicy::default());
        assert!(capture.take().is_none());
        assert!(capture.check().is_ok());
    }

    #[test]
    fn test_image_error_skipped_only_when_opted_in() {
        let (tx, strict) = capture(ErrorPolicy::default());
        tx.send(AssetError::new(AssetErrorKind::Image, "404 https://x/a.png")).unwrap();
        assert!(matches!(
            strict.take(),
            Some(FramecastError::Asset { kind: AssetErrorKind::Image, .. })
        ));

        let (tx, lenient) = capture(ErrorPolicy {
            skip_image_error: true,
            ..ErrorPolicy::default()
        });
        tx.send(AssetError::new(AssetErrorKind::Image, "404 https://x/a.png")).unwrap();
        assert!(lenient.take().is_none());
    }

    #[test]
    fn test_timeout_is_never_swallowed() {
        let (tx, capture) = capture(ErrorPolicy {
            skip_font_error: true,
            skip_image_error: true,
        });
        tx.send(AssetError::new(AssetErrorKind::Timeout, "assets took too long")).unwrap();
        assert!(matches!(capture.take(), Some(FramecastError::Timeout { .. })));
    }

    #[test]
    fn test_first_unskipped_error_wins_and_channel_is_drained() {
        let (tx, capture) = capture(ErrorPolicy {
            skip_font_error: true,
            ..ErrorPolicy::default()
        });
        tx.send(AssetError::from_message("Timeout for loading font Roboto")).unwrap();
        tx.send(AssetError::new(AssetErrorKind::Video, "first")).unwrap();
        tx.send(AssetError::new(AssetErrorKind::Other, "second")).unwrap();

        match capture.take() {
            Some(FramecastError::Asset { kind, message }) => {
                assert_eq!(kind, AssetErrorKind::Video);
                assert_eq!(message, "first");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(capture.take().is_none());
    }
}
