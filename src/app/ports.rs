use crate::error::Result;
use async_trait::async_trait;

// Fetch-side ports. Sources depend on these, never on reqwest directly, so a
// test can hand them canned payloads.

#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpGetResult>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// Drives a page the way a browser would and hands back the network
/// responses observed while it loaded.
#[async_trait]
pub trait PageCapturePort: Send + Sync {
    async fn capture(&self, page_url: &str) -> Result<Vec<CapturedResponse>>;
}

#[derive(Clone, Debug)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl CapturedResponse {
    pub fn is_json(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .contains("application/json")
    }
}
