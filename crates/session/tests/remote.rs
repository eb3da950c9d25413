//! Drives `RemoteSession` against a tiny shell renderer.
#![cfg(unix)]

use framecast_common::config::RendererConfig;
use framecast_common::error::{AssetErrorKind, FramecastError};
use framecast_document::{Document, Page};
use framecast_session::{
    FrameRequest, RemoteSession, RenderOptions, Session, SessionSetting,
};

/// Answers every request with `null`, except `renderFrame` which first
/// reports an image error and then returns "hello" in base64.
const ECHO_RENDERER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -E 's/^\{"id":([0-9]+).*/\1/')
  case "$line" in
    *'"method":"renderFrame"'*)
      printf '{"event":"console","message":"rendering"}\n'
      printf '{"event":"assetError","kind":"image","message":"Can not load image"}\n'
      printf '{"id":%s,"result":{"data":"aGVsbG8="}}\n' "$id" ;;
    *'"method":"evaluate"'*)
      printf '{"id":%s,"error":{"kind":"navigation","message":"page crashed"}}\n' "$id" ;;
    *'"method":"close"'*)
      printf '{"id":%s,"result":null}\n' "$id"
      exit 0 ;;
    *)
      printf '{"id":%s,"result":null}\n' "$id" ;;
  esac
done
"#;

fn shell_renderer(script: &str) -> RendererConfig {
    RendererConfig {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        protocol_timeout_ms: 5_000,
        ..RendererConfig::default()
    }
}

#[tokio::test]
async fn remote_session_round_trip() {
    let session = RemoteSession::spawn(&shell_renderer(ECHO_RENDERER)).unwrap();
    let mut errors = session.install_error_sink().await.unwrap();

    session
        .load(&Document::with_pages(vec![Page::new("p1", 1000.0)]))
        .await
        .unwrap();
    session
        .configure(SessionSetting::TextOverflow("resize".to_string()))
        .await
        .unwrap();
    session.seek(500.0).await.unwrap();

    let request = FrameRequest::from_options(&RenderOptions::default(), 1.0).at(500.0, None);
    let bytes = session.render_frame(&request).await.unwrap();
    assert_eq!(bytes, b"hello");

    let error = errors.try_recv().unwrap();
    assert_eq!(error.kind, AssetErrorKind::Image);

    let err = session.evaluate("anything", vec![]).await.unwrap_err();
    assert!(err.is_navigation());

    session.close().await.unwrap();
    // Closing twice is harmless, further requests fail.
    session.close().await.unwrap();
    assert!(session.seek(0.0).await.unwrap_err().is_navigation());
}

#[tokio::test]
async fn exited_renderer_fails_requests() {
    let session = RemoteSession::spawn(&shell_renderer("exit 0")).unwrap();
    let err = session.seek(0.0).await.unwrap_err();
    assert!(err.is_navigation(), "unexpected error: {err}");
}

#[tokio::test]
async fn silent_renderer_times_out() {
    let mut config = shell_renderer("while IFS= read -r line; do :; done");
    config.protocol_timeout_ms = 100;
    let session = RemoteSession::spawn(&config).unwrap();
    let err = session.seek(0.0).await.unwrap_err();
    assert!(matches!(err, FramecastError::Timeout { .. }));
}

#[test]
fn missing_renderer_binary_is_a_session_error() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let config = RendererConfig {
        command: "/nonexistent/framecast-renderer".to_string(),
        ..RendererConfig::default()
    };
    assert!(matches!(
        RemoteSession::spawn(&config),
        Err(FramecastError::Session { .. })
    ));
}
