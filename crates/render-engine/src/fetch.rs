//! Remote media retrieval.

use std::time::Duration;

use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};

use framecast_common::error::{FramecastError, FramecastResult};

/// Body of a fetched resource, delivered in chunks.
pub type ByteStream = BoxStream<'static, FramecastResult<Vec<u8>>>;

/// A successful GET response.
pub struct FetchResponse {
    /// `Content-Type` header without parameters, lowercased.
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl FetchResponse {
    /// Build a response from an in-memory body.
    pub fn from_bytes(content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.map(normalize_content_type),
            body: futures_util::stream::once(async move { Ok(bytes) }).boxed(),
        }
    }

    /// Collect the whole body.
    pub async fn bytes(self) -> FramecastResult<Vec<u8>> {
        self.body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }
}

/// GET-style retrieval of remote resources.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FramecastResult<FetchResponse>;
}

/// [`Fetcher`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> FramecastResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("framecast/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FramecastError::Other(e.into()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FramecastResult<FetchResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| FramecastError::Other(anyhow::Error::new(e).context(format!("GET {url}"))))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(normalize_content_type);

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| FramecastError::Other(e.into()))
            })
            .boxed();

        Ok(FetchResponse { content_type, body })
    }
}

/// `"Video/MP4; charset=binary"` -> `"video/mp4"`.
pub fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
