use std::sync::Arc;

use serde_json::json;

use framecast_common::error::AssetErrorKind;
use framecast_document::{Document, Page};
use framecast_render_engine::Exporter;
use framecast_session::testing::{Call, FakeBehavior, FakeRenderer};
use framecast_session::{
    AssetError, DocumentFormat, JobRunner, RenderOptions, RunnerConfig, SessionMode, SessionSetting,
};

fn document() -> Document {
    Document::with_pages(vec![Page::new("p1", 1000.0), Page::new("p2", 2000.0)])
}

async fn exporter(renderer: &FakeRenderer) -> Exporter {
    let runner = JobRunner::connect(renderer.factory(), RunnerConfig::new(SessionMode::Shared))
        .await
        .unwrap();
    Exporter::new(Arc::new(runner))
}

#[tokio::test]
async fn image_export_loads_applies_pixel_ratio_and_renders() {
    let renderer = FakeRenderer::new();
    let exporter = exporter(&renderer).await;
    let options = RenderOptions {
        pixel_ratio: Some(2.0),
        ..RenderOptions::default()
    };

    let url = exporter.to_data_url(&document(), &options).await.unwrap();
    // The fake renders the current time ("0") as the image body.
    assert_eq!(url, "data:image/png;base64,MA==");

    let calls: Vec<Call> = renderer.calls().into_iter().map(|(_, call)| call).collect();
    assert_eq!(calls[0], Call::InstallSink);
    assert_eq!(calls[1], Call::Load { pages: 2 });
    assert_eq!(calls[2], Call::Configure(SessionSetting::ElementsPixelRatio(2.0)));
    match &calls[3] {
        Call::Render(request) => {
            assert_eq!(request.pixel_ratio, 2.0);
            assert_eq!(request.time_ms, None);
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn image_defaults_to_pixel_ratio_one() {
    let renderer = FakeRenderer::new();
    let exporter = exporter(&renderer).await;
    let base64 = exporter
        .to_image_base64(&document(), &RenderOptions::default())
        .await
        .unwrap();
    assert_eq!(base64, "MA==");
    assert!(renderer
        .calls()
        .iter()
        .any(|(_, call)| *call == Call::Configure(SessionSetting::ElementsPixelRatio(1.0))));
}

#[tokio::test]
async fn jpeg_data_url_uses_requested_mime() {
    let renderer = FakeRenderer::new();
    let exporter = exporter(&renderer).await;
    let options = RenderOptions {
        mime_type: Some("image/jpeg".to_string()),
        quality: Some(0.8),
        ..RenderOptions::default()
    };
    let url = exporter.to_data_url(&document(), &options).await.unwrap();
    assert!(url.starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn pdf_and_gif_exports() {
    let renderer = FakeRenderer::with_behavior(FakeBehavior {
        export_bytes: b"%PDF".to_vec(),
        ..FakeBehavior::default()
    });
    let exporter = exporter(&renderer).await;
    let options = RenderOptions::default();

    let pdf = exporter.to_pdf_data_url(&document(), &options).await.unwrap();
    assert_eq!(pdf, "data:application/pdf;base64,JVBERg==");
    assert_eq!(exporter.to_pdf_base64(&document(), &options).await.unwrap(), "JVBERg==");
    let gif = exporter.to_gif_data_url(&document(), &options).await.unwrap();
    assert!(gif.starts_with("data:image/gif;base64,"));
    assert_eq!(exporter.to_gif_base64(&document(), &options).await.unwrap(), "JVBERg==");

    let exports: Vec<DocumentFormat> = renderer
        .calls()
        .into_iter()
        .filter_map(|(_, call)| match call {
            Call::Export(format) => Some(format),
            _ => None,
        })
        .collect();
    assert_eq!(
        exports,
        vec![DocumentFormat::Pdf, DocumentFormat::Pdf, DocumentFormat::Gif, DocumentFormat::Gif]
    );
}

#[tokio::test]
async fn image_error_fails_export_unless_skipped() {
    let renderer = FakeRenderer::with_behavior(FakeBehavior {
        asset_error_on_load: Some(AssetError::new(AssetErrorKind::Image, "Can not load image")),
        ..FakeBehavior::default()
    });
    let exporter = exporter(&renderer).await;

    let err = exporter
        .to_blob(&document(), &RenderOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.asset_kind(), Some(AssetErrorKind::Image));

    let options = RenderOptions {
        skip_image_error: true,
        ..RenderOptions::default()
    };
    assert_eq!(exporter.to_blob(&document(), &options).await.unwrap(), b"0");
}

#[tokio::test]
async fn custom_function_runs_with_or_without_document() {
    let renderer = FakeRenderer::with_behavior(FakeBehavior {
        evaluate_result: json!({ "pages": 2 }),
        ..FakeBehavior::default()
    });
    let exporter = exporter(&renderer).await;
    let options = RenderOptions::default();

    let value = exporter
        .run_custom(Some(&document()), "countPages", vec![], &options)
        .await
        .unwrap();
    assert_eq!(value, json!({ "pages": 2 }));

    exporter
        .run_custom(None, "ping", vec![json!(1)], &options)
        .await
        .unwrap();

    let loads = renderer
        .calls()
        .iter()
        .filter(|(_, call)| matches!(call, Call::Load { .. }))
        .count();
    assert_eq!(loads, 1);
    assert!(renderer
        .calls()
        .iter()
        .any(|(_, call)| *call == Call::Evaluate("ping".to_string())));
}
