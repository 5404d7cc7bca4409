//! Direct structured-API strategy.
//!
//! Calls the platform's space listing endpoint
//! (`/x/space/arc/search?mid=...&pn=...&order=pubdate`) and hands the JSON
//! `data` payload to the typed decode path. Fastest of the three transports
//! and the most likely to be flagged: the platform answers flagged callers
//! with an explicit risk-control code instead of data.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::models::{PageResult, RawContent};
use crate::strategies::{DESKTOP_USER_AGENT, FetchStrategy};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

const LISTING_ENDPOINT: &str = "https://api.bilibili.com/x/space/arc/search";
const PAGE_SIZE: u32 = 30;
/// Risk-control codes the endpoint returns when anti-automation triggers.
const BLOCK_CODES: &[i64] = &[-352, -412];

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<serde_json::Value>,
}

/// Structured listing-API transport.
pub struct DirectApiStrategy {
    timeout: Duration,
    proxy: Option<String>,
    client: Option<reqwest::Client>,
}

impl DirectApiStrategy {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            timeout: config.timeout,
            proxy: config.proxy.clone(),
            client: None,
        }
    }

    fn client(&self) -> Result<&reqwest::Client, CrawlError> {
        self.client
            .as_ref()
            .ok_or_else(|| CrawlError::Transport("strategy used before open()".into()))
    }
}

#[async_trait]
impl FetchStrategy for DirectApiStrategy {
    fn name(&self) -> &'static str {
        "direct-api"
    }

    #[instrument(level = "info", skip(self))]
    async fn open(&mut self) -> Result<(), CrawlError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(DESKTOP_USER_AGENT);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| CrawlError::Configuration(format!("bad proxy endpoint: {e}")))?,
            );
        }
        self.client = Some(builder.build()?);
        debug!("Direct API client ready");
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn fetch_page(&self, uid: u64, page: u32) -> Result<PageResult, CrawlError> {
        let response = self
            .client()?
            .get(LISTING_ENDPOINT)
            .query(&[
                ("mid", uid.to_string()),
                ("pn", page.to_string()),
                ("ps", PAGE_SIZE.to_string()),
                ("order", "pubdate".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 412 {
            return Err(CrawlError::SecurityBlock(
                "listing endpoint answered HTTP 412".into(),
            ));
        }
        if !status.is_success() {
            return Err(CrawlError::Transport(format!(
                "listing endpoint answered HTTP {status}"
            )));
        }

        let envelope: ApiEnvelope = response.json().await?;
        if BLOCK_CODES.contains(&envelope.code) {
            return Err(CrawlError::SecurityBlock(format!(
                "risk control code {}: {}",
                envelope.code, envelope.message
            )));
        }
        if envelope.code != 0 {
            return Err(CrawlError::Transport(format!(
                "listing endpoint code {}: {}",
                envelope.code, envelope.message
            )));
        }

        let data = envelope.data.unwrap_or(serde_json::Value::Null);
        let has_more = data
            .pointer("/list/vlist")
            .and_then(|v| v.as_array())
            .is_some_and(|v| !v.is_empty());

        info!(page, has_more, "Fetched listing page via API");
        Ok(PageResult {
            raw: RawContent::Json(data),
            page,
            has_more,
        })
    }

    async fn close(&mut self) {
        self.client = None;
    }
}
