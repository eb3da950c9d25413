//! Test doubles for the network and the encoder.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_render_engine::{Encoder, EncoderOutput, FetchResponse, Fetcher};

/// Serves canned bodies and counts requests per URL.
#[derive(Default)]
pub struct FakeFetcher {
    bodies: Mutex<HashMap<String, (Option<String>, Vec<u8>)>>,
    failures: Mutex<HashMap<String, u32>>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, content_type: Option<&str>, body: &[u8]) -> Self {
        self.bodies.lock().unwrap().insert(
            url.to_string(),
            (content_type.map(String::from), body.to_vec()),
        );
        self
    }

    /// Fail the next `times` requests for `url`.
    pub fn fail(self, url: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), times);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> FramecastResult<FetchResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FramecastError::render(format!("connection reset: {url}")));
                }
            }
        }
        let body = self.bodies.lock().unwrap().get(url).cloned();
        match body {
            Some((content_type, bytes)) => Ok(FetchResponse::from_bytes(content_type.as_deref(), bytes)),
            None => Err(FramecastError::render(format!("404 Not Found: {url}"))),
        }
    }
}

/// Records encoder invocations and writes an empty file at the output path.
#[derive(Default)]
pub struct FakeEncoder {
    calls: Mutex<Vec<Vec<String>>>,
    silent: Mutex<Vec<String>>,
    fail_encode: bool,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_encode: true,
            ..Self::default()
        }
    }

    /// Report no audio stream for paths ending in `suffix`.
    pub fn silent(self, suffix: &str) -> Self {
        self.silent.lock().unwrap().push(suffix.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Paths passed with `-i`, for the most recent call.
    pub fn last_inputs(&self) -> Vec<PathBuf> {
        let calls = self.calls();
        let Some(args) = calls.last() else {
            return Vec::new();
        };
        args.windows(2)
            .filter(|pair| pair[0] == "-i")
            .map(|pair| PathBuf::from(&pair[1]))
            .collect()
    }
}

#[async_trait::async_trait]
impl Encoder for FakeEncoder {
    async fn probe_has_audio(&self, path: &Path) -> FramecastResult<bool> {
        let name = path.display().to_string();
        let silent = self.silent.lock().unwrap();
        Ok(!silent.iter().any(|suffix| name.ends_with(suffix.as_str())))
    }

    async fn encode(&self, args: &[String]) -> FramecastResult<EncoderOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        if self.fail_encode {
            return Err(FramecastError::Encoder {
                message: "ffmpeg exited with an error".to_string(),
                status: "exit status: 1".to_string(),
                stdout: String::new(),
                stderr: "Invalid argument".to_string(),
            });
        }
        if let Some(output) = args.last() {
            std::fs::write(output, b"")?;
        }
        Ok(EncoderOutput::default())
    }
}
