//! Simulated-client strategy.
//!
//! Issues plain hypertext requests that look like a person's browser: a
//! realistic desktop identity, the accept headers a browser sends, a
//! referer inside the site, and a persistent cookie session warmed up
//! against the homepage before the first listing request. The returned
//! markup goes through the parsing fallback chain.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::models::{PageResult, RawContent};
use crate::parse;
use crate::strategies::{DESKTOP_USER_AGENT, FetchStrategy};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

const HOME_URL: &str = "https://www.bilibili.com";

/// Persistent-session HTTP transport with a browser identity.
pub struct SimulatedClientStrategy {
    timeout: Duration,
    proxy: Option<String>,
    client: Option<reqwest::Client>,
}

impl SimulatedClientStrategy {
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

    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        headers
    }

    fn listing_url(uid: u64, page: u32) -> Result<Url, CrawlError> {
        Url::parse_with_params(
            &format!("https://space.bilibili.com/{uid}/video"),
            &[("tid", "0"), ("pn", &page.to_string()), ("order", "pubdate")],
        )
        .map_err(|e| CrawlError::Configuration(format!("bad listing url: {e}")))
    }
}

#[async_trait]
impl FetchStrategy for SimulatedClientStrategy {
    fn name(&self) -> &'static str {
        "simulated-client"
    }

    #[instrument(level = "info", skip(self))]
    async fn open(&mut self) -> Result<(), CrawlError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(DESKTOP_USER_AGENT)
            .default_headers(Self::browser_headers())
            .cookie_store(true);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| CrawlError::Configuration(format!("bad proxy endpoint: {e}")))?,
            );
        }
        let client = builder.build()?;

        // Warm-up visit so the session carries the cookies a real visitor
        // would have before opening a creator's space.
        let response = client.get(HOME_URL).send().await?;
        debug!(status = %response.status(), "Session warm-up request done");

        self.client = Some(client);
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn fetch_page(&self, uid: u64, page: u32) -> Result<PageResult, CrawlError> {
        let url = Self::listing_url(uid, page)?;
        let response = self
            .client()?
            .get(url)
            .header(REFERER, format!("https://space.bilibili.com/{uid}"))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 412 {
            return Err(CrawlError::SecurityBlock(
                "space listing answered HTTP 412".into(),
            ));
        }
        if !status.is_success() {
            return Err(CrawlError::Transport(format!(
                "space listing answered HTTP {status}"
            )));
        }

        let html = response.text().await?;
        if parse::looks_blocked(&html) {
            return Err(CrawlError::SecurityBlock(
                "listing page is an anti-automation interstitial".into(),
            ));
        }

        let has_more = parse::pager_has_next(&html);
        info!(page, has_more, bytes = html.len(), "Fetched listing page via HTTP");
        Ok(PageResult {
            raw: RawContent::Html(html),
            page,
            has_more,
        })
    }

    async fn close(&mut self) {
        self.client = None;
    }
}
