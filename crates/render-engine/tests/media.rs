mod support;

use std::sync::Arc;

use serde_json::json;

use framecast_common::config::{DownloadConfig, RewriteMode};
use framecast_common::error::FramecastError;
use framecast_document::Document;
use framecast_render_engine::MediaPreparer;

use support::{FakeEncoder, FakeFetcher};

const CLIP: &str = "https://cdn.example.com/clips/intro.mp4";
const MUSIC: &str = "https://cdn.example.com/audio/theme";

fn fast_retries() -> DownloadConfig {
    DownloadConfig {
        backoff_base_ms: 0,
        backoff_max_ms: 0,
        ..DownloadConfig::default()
    }
}

fn document() -> Document {
    serde_json::from_value(json!({
        "pages": [
            {
                "id": "p1",
                "duration": 2000,
                "children": [
                    { "type": "video", "id": "v1", "src": CLIP, "duration": 4000 },
                    {
                        "type": "group",
                        "children": [
                            { "type": "video", "id": "v2", "src": CLIP, "duration": 4000 },
                            { "type": "image", "id": "i1", "src": "https://cdn.example.com/a.png" }
                        ]
                    }
                ]
            },
            {
                "id": "p2",
                "duration": 1000,
                "children": [
                    { "type": "video", "id": "v3", "src": CLIP, "duration": 4000 },
                    { "type": "video", "id": "v4", "src": "data:video/mp4;base64,AAAA" },
                    { "type": "audio", "id": "a0", "src": "blob:https://app.example.com/1" }
                ]
            }
        ],
        "audios": [ { "id": "music", "src": MUSIC, "duration": 9000 } ]
    }))
    .unwrap()
}

#[tokio::test]
async fn identical_urls_are_downloaded_once() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve(CLIP, Some("video/mp4"), b"clip-bytes")
            .serve(MUSIC, Some("audio/mpeg"), b"music-bytes"),
    );
    let preparer = MediaPreparer::new(fetcher.clone(), fast_retries());
    let source = document();
    let prepared = preparer.prepare(&source).await.unwrap();

    assert_eq!(fetcher.request_count(CLIP), 1);
    assert_eq!(fetcher.request_count(MUSIC), 1);
    assert_eq!(fetcher.requests().len(), 2);
    assert_eq!(prepared.download_count(), 2);

    // The caller's document is untouched.
    assert_eq!(source.media_refs()[0].src, CLIP);

    let refs = prepared.document().media_refs();
    let clip_sources: Vec<&str> = refs
        .iter()
        .filter(|m| m.id.starts_with('v') && m.id != "v4")
        .map(|m| m.src.as_str())
        .collect();
    assert_eq!(clip_sources.len(), 3);
    assert!(clip_sources.iter().all(|src| src.starts_with("file://")));
    assert!(clip_sources.windows(2).all(|pair| pair[0] == pair[1]));

    let local = prepared.local_path(clip_sources[0]).unwrap();
    assert_eq!(local.extension().unwrap(), "mp4");
    assert_eq!(std::fs::read(&local).unwrap(), b"clip-bytes");
    assert_eq!(prepared.local_path(CLIP).unwrap(), local);

    // No extension in the URL: the content type decides.
    let music = prepared.local_path(MUSIC).unwrap();
    assert_eq!(music.extension().unwrap(), "mp3");

    // Inline and blob sources are left alone.
    let v4 = refs.iter().find(|m| m.id == "v4").unwrap();
    assert_eq!(v4.src, "data:video/mp4;base64,AAAA");
    let a0 = refs.iter().find(|m| m.id == "a0").unwrap();
    assert_eq!(a0.src, "blob:https://app.example.com/1");
    assert!(prepared.local_path(&v4.src).is_none());

    prepared.cleanup().unwrap();
}

#[tokio::test]
async fn cleanup_removes_downloads_and_is_idempotent() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve(CLIP, Some("video/mp4"), b"clip")
            .serve(MUSIC, None, b"music"),
    );
    let prepared = MediaPreparer::new(fetcher, fast_retries())
        .prepare(&document())
        .await
        .unwrap();

    let local = prepared.local_path(CLIP).unwrap();
    let dir = prepared.cleanup_handle().path().unwrap();
    assert!(local.exists());

    prepared.cleanup().unwrap();
    assert!(!local.exists());
    assert!(!dir.exists());
    prepared.cleanup().unwrap();
    prepared.cleanup_handle().cleanup().unwrap();
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve(CLIP, Some("video/mp4"), b"clip")
            .serve(MUSIC, Some("audio/mpeg"), b"music")
            .fail(CLIP, 2),
    );
    let prepared = MediaPreparer::new(fetcher.clone(), fast_retries())
        .prepare(&document())
        .await
        .unwrap();

    assert_eq!(fetcher.request_count(CLIP), 3);
    assert_eq!(std::fs::read(prepared.local_path(CLIP).unwrap()).unwrap(), b"clip");
}

#[tokio::test]
async fn exhausted_retries_report_url_and_attempts() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve(MUSIC, Some("audio/mpeg"), b"music")
            .fail(CLIP, 10),
    );
    let err = MediaPreparer::new(fetcher.clone(), fast_retries())
        .prepare(&document())
        .await
        .unwrap_err();

    match err {
        FramecastError::Download { url, attempts, message } => {
            assert_eq!(url, CLIP);
            assert_eq!(attempts, 3);
            assert!(message.contains("connection reset"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fetcher.request_count(CLIP), 3);
}

#[tokio::test]
async fn data_url_rewrite_inlines_downloads() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve(CLIP, Some("video/mp4"), b"hello")
            .serve(MUSIC, None, b"hello"),
    );
    let config = DownloadConfig {
        rewrite: RewriteMode::DataUrl,
        ..fast_retries()
    };
    let prepared = MediaPreparer::new(fetcher, config)
        .prepare(&document())
        .await
        .unwrap();

    let refs = prepared.document().media_refs();
    let v1 = refs.iter().find(|m| m.id == "v1").unwrap();
    assert_eq!(v1.src, "data:video/mp4;base64,aGVsbG8=");
    let music = refs.iter().find(|m| m.id == "music").unwrap();
    assert_eq!(music.src, "data:application/octet-stream;base64,aGVsbG8=");

    // The multiplexer still finds the file behind the original URL and
    // behind the rewritten data URL.
    let local = prepared.local_path(CLIP).unwrap();
    assert!(local.exists());
    assert_eq!(prepared.local_path(&v1.src), Some(local));
    assert!(prepared.local_path(&music.src).unwrap().exists());
}

#[tokio::test]
async fn videos_are_normalized_to_webm() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve(CLIP, Some("video/mp4"), b"clip")
            .serve(MUSIC, Some("audio/mpeg"), b"music"),
    );
    let encoder = Arc::new(FakeEncoder::new());
    let config = DownloadConfig {
        normalize_video: true,
        ..fast_retries()
    };
    let prepared = MediaPreparer::new(fetcher, config)
        .with_encoder(encoder.clone())
        .prepare(&document())
        .await
        .unwrap();

    // Only the video is transcoded.
    let calls = encoder.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].join(" ").contains("-c:v libvpx -crf 30 -b:v 1000k"));

    let local = prepared.local_path(CLIP).unwrap();
    assert_eq!(local.extension().unwrap(), "webm");
    assert_eq!(prepared.local_path(MUSIC).unwrap().extension().unwrap(), "mp3");
}

#[tokio::test]
async fn document_without_remote_media_needs_no_downloads() {
    let fetcher = Arc::new(FakeFetcher::new());
    let source: Document = serde_json::from_value(json!({
        "pages": [ { "id": "p1", "children": [ { "type": "text", "text": "hi" } ] } ]
    }))
    .unwrap();
    let prepared = MediaPreparer::new(fetcher.clone(), fast_retries())
        .prepare(&source)
        .await
        .unwrap();

    assert!(fetcher.requests().is_empty());
    assert_eq!(prepared.download_count(), 0);
    assert_eq!(prepared.document(), &source);
    prepared.cleanup().unwrap();
}
