//! Offline document backups.
//!
//! Replaces remote asset URLs in a raw document with data URLs so the
//! document renders without network access.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::fetch::Fetcher;
use crate::media::{data_url, is_remote, mime_for_extension, url_extension};

/// Keys whose string values are asset URLs.
const ASSET_KEYS: &[&str] = &["src", "maskSrc", "background"];

/// Outcome of [`inline_remote_assets`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    /// Distinct URLs inlined.
    pub inlined: usize,
    /// URLs kept as-is because their download failed.
    pub failed: Vec<String>,
}

/// Inline every remote asset of `document`.
///
/// Covers `src`, `maskSrc` and `background` values anywhere in the tree,
/// font `url`s, and `url(...)` references in font style `src`. Each URL is
/// downloaded once. A failed download keeps the original URL.
pub async fn inline_remote_assets(document: &mut Value, fetcher: &dyn Fetcher) -> BackupReport {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    collect_urls(document, &mut |url: &str| {
        if seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    });

    let mut report = BackupReport::default();
    let mut resolved: HashMap<String, String> = HashMap::new();
    for url in urls {
        tracing::info!(url = %url, "Downloading asset");
        match download_as_data_url(fetcher, &url).await {
            Ok(inlined) => {
                resolved.insert(url, inlined);
                report.inlined += 1;
            }
            Err(e) => {
                tracing::warn!(url = %url, "Failed to download asset, keeping URL: {}", e);
                report.failed.push(url);
            }
        }
    }

    if !resolved.is_empty() {
        replace_urls(document, &resolved);
    }
    report
}

async fn download_as_data_url(
    fetcher: &dyn Fetcher,
    url: &str,
) -> framecast_common::error::FramecastResult<String> {
    let response = fetcher.fetch(url).await?;
    let mime = response
        .content_type
        .clone()
        .filter(|ct| !ct.is_empty())
        .or_else(|| {
            url_extension(url)
                .and_then(|ext| mime_for_extension(&ext))
                .map(String::from)
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let bytes = response.bytes().await?;
    Ok(data_url(&mime, &bytes))
}

fn collect_urls(document: &Value, found: &mut impl FnMut(&str)) {
    if let Some(fonts) = document.get("fonts").and_then(Value::as_array) {
        for font in fonts {
            if let Some(url) = font.get("url").and_then(Value::as_str) {
                if is_remote(url) {
                    found(url);
                }
            }
            let styles = font.get("styles").and_then(Value::as_array);
            for style in styles.into_iter().flatten() {
                if let Some(src) = style.get("src").and_then(Value::as_str) {
                    for url in css_urls(src) {
                        if is_remote(url) {
                            found(url);
                        }
                    }
                }
            }
        }
    }
    collect_asset_values(document, found);
}

fn collect_asset_values(node: &Value, found: &mut impl FnMut(&str)) {
    match node {
        Value::Array(items) => {
            for item in items {
                collect_asset_values(item, found);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::String(s) if ASSET_KEYS.contains(&key.as_str()) && is_remote(s) => found(s),
                    Value::Array(_) | Value::Object(_) => collect_asset_values(value, found),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn replace_urls(document: &mut Value, resolved: &HashMap<String, String>) {
    if let Some(fonts) = document.get_mut("fonts").and_then(Value::as_array_mut) {
        for font in fonts {
            if let Some(url) = font.get_mut("url") {
                replace_string(url, resolved);
            }
            let Some(styles) = font.get_mut("styles").and_then(Value::as_array_mut) else {
                continue;
            };
            for style in styles {
                let Some(Value::String(src)) = style.get_mut("src") else {
                    continue;
                };
                let mut next = src.clone();
                for url in css_urls(src) {
                    if let Some(inlined) = resolved.get(url) {
                        next = next.replace(url, inlined);
                    }
                }
                *src = next;
            }
        }
    }
    replace_asset_values(document, resolved);
}

fn replace_asset_values(node: &mut Value, resolved: &HashMap<String, String>) {
    match node {
        Value::Array(items) => {
            for item in items {
                replace_asset_values(item, resolved);
            }
        }
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if ASSET_KEYS.contains(&key.as_str()) && value.is_string() {
                    replace_string(value, resolved);
                } else if value.is_array() || value.is_object() {
                    replace_asset_values(value, resolved);
                }
            }
        }
        _ => {}
    }
}

fn replace_string(value: &mut Value, resolved: &HashMap<String, String>) {
    let replacement = value.as_str().and_then(|s| resolved.get(s)).cloned();
    if let Some(replacement) = replacement {
        *value = Value::String(replacement);
    }
}

/// Targets of every `url(...)` in a CSS value, unquoted.
fn css_urls(css: &str) -> Vec<&str> {
    let mut urls = Vec::new();
    let mut rest = css;
    while let Some(start) = rest.find("url(") {
        let after = &rest[start + 4..];
        let Some(end) = after.find(')') else {
            break;
        };
        let target = after[..end].trim().trim_matches(|c| c == '"' || c == '\'');
        if !target.is_empty() {
            urls.push(target);
        }
        rest = &after[end + 1..];
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use framecast_common::error::{FramecastError, FramecastResult};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapFetcher {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> FramecastResult<FetchResponse> {
            self.requested.lock().unwrap().push(url.to_string());
            if url.contains("missing") {
                return Err(FramecastError::render("404"));
            }
            let content_type = url.contains("typed").then_some("image/png");
            Ok(FetchResponse::from_bytes(content_type, b"hi".to_vec()))
        }
    }

    #[test]
    fn test_css_urls() {
        let css = "url('https://f.io/a.woff2') format('woff2'), url(\"https://f.io/b.ttf\"), url(data:font/ttf;base64,AA)";
        assert_eq!(
            css_urls(css),
            vec!["https://f.io/a.woff2", "https://f.io/b.ttf", "data:font/ttf;base64,AA"]
        );
    }

    #[tokio::test]
    async fn test_inline_remote_assets() {
        let mut document = json!({
            "fonts": [{
                "fontFamily": "Brand",
                "url": "https://f.io/brand.woff2",
                "styles": [{ "src": "url('https://f.io/bold.ttf')", "fontWeight": "bold" }]
            }],
            "pages": [{
                "id": "p1",
                "background": "https://img.io/typed-bg",
                "children": [
                    { "type": "image", "src": "https://img.io/a.png", "maskSrc": "https://img.io/a.png" },
                    { "type": "image", "src": "https://img.io/missing.png" },
                    { "type": "text", "text": "https://not-an-asset.io" },
                    { "type": "image", "src": "data:image/png;base64,AA" }
                ]
            }]
        });
        let fetcher = MapFetcher::default();
        let report = inline_remote_assets(&mut document, &fetcher).await;

        assert_eq!(report.inlined, 4);
        assert_eq!(report.failed, vec!["https://img.io/missing.png".to_string()]);
        // a.png requested once despite two references.
        assert_eq!(fetcher.requested.lock().unwrap().len(), 5);

        assert_eq!(document["fonts"][0]["url"], "data:font/woff2;base64,aGk=");
        assert_eq!(
            document["fonts"][0]["styles"][0]["src"],
            "url('data:font/ttf;base64,aGk=')"
        );
        assert_eq!(document["pages"][0]["background"], "data:image/png;base64,aGk=");
        let children = &document["pages"][0]["children"];
        assert_eq!(children[0]["src"], "data:image/png;base64,aGk=");
        assert_eq!(children[0]["maskSrc"], "data:image/png;base64,aGk=");
        assert_eq!(children[1]["src"], "https://img.io/missing.png");
        assert_eq!(children[2]["text"], "https://not-an-asset.io");
        assert_eq!(children[3]["src"], "data:image/png;base64,AA");
    }
}
