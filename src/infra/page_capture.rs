use crate::app::ports::{CapturedResponse, PageCapturePort};
use crate::error::Result;
use crate::infra::http_client::ReqwestHttp;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, warn};

/// Page capture without a browser: the page URL is requested directly with a
/// JSON `Accept` header and the single response is reported as the only
/// captured network response. Sites that serve their listing data as JSON to
/// that request work unchanged; anything needing script execution needs a real
/// browser-backed `PageCapturePort`.
pub struct HttpPageCapture {
    http: ReqwestHttp,
}

impl HttpPageCapture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: ReqwestHttp::new()?,
        })
    }
}

#[async_trait]
impl PageCapturePort for HttpPageCapture {
    async fn capture(&self, page_url: &str) -> Result<Vec<CapturedResponse>> {
        let resp = self
            .http
            .client()
            .get(page_url)
            .header(ACCEPT, "application/json, text/html;q=0.8")
            .send()
            .await?;
        let url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = resp.bytes().await?.to_vec();
        debug!("Captured {} -> {} ({})", url, status, content_type);
        if !content_type.to_ascii_lowercase().contains("application/json") {
            warn!("{} answered with {:?} instead of JSON", url, content_type);
        }
        Ok(vec![CapturedResponse {
            url,
            status,
            content_type,
            body,
        }])
    }
}
