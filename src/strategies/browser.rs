//! Automated-browser strategy.
//!
//! Drives a real Chromium engine for listings the HTTP transports cannot
//! reach. The listing is a single-page application whose pagination state
//! lives client-side, so this strategy paginates by locating and clicking
//! the platform's own "next page" pager control instead of constructing
//! URLs. At session start a small script is injected to suppress the
//! automation-detectable properties of the browser environment
//! (`navigator.webdriver` and friends).
//!
//! `headless_chrome` is a blocking API; every browser interaction runs on
//! the blocking pool so no network call pins a scheduler thread. Humanized
//! pacing between simulated scroll/click actions happens inside those
//! blocking sections with durations sampled up front.
//!
//! Because clicking the pager mutates tab state, `fetch_page` tracks the
//! page the tab currently shows and only clicks when it is behind the
//! requested page. A retry of the same page after a failed content wait
//! re-reads the current DOM instead of clicking again; re-clicking would
//! silently skip a page of records.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::models::{PageResult, RawContent};
use crate::pacing::RateLimiter;
use crate::parse;
use crate::strategies::FetchStrategy;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const LISTING_CONTENT: &str = ".bili-video-card, .small-item";
const PAGER_NEXT: &str = ".be-pager-next";

/// Evaluated right after the tab is created and again after each
/// navigation, before the page's own scripts get a chance to fingerprint
/// the environment.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    window.chrome = window.chrome || { runtime: {} };
"#;

fn transport<E: std::fmt::Display>(e: E) -> CrawlError {
    CrawlError::Transport(e.to_string())
}

/// What `fetch_page` must do to the tab to show the requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PagerStep {
    /// Load the listing from scratch.
    Navigate,
    /// The tab is one page behind; activate the pager control.
    ClickNext,
    /// The tab already shows the requested page (a retry); re-read it.
    Reuse,
}

/// Decide the pager step from the page the tab currently shows (`current`,
/// 0 before the first navigation) and the page being requested.
fn plan_pager_step(current: u32, requested: u32) -> PagerStep {
    if requested <= 1 {
        PagerStep::Navigate
    } else if current < requested {
        PagerStep::ClickNext
    } else {
        PagerStep::Reuse
    }
}

/// Real-browser transport.
pub struct BrowserStrategy {
    headless: bool,
    timeout: Duration,
    limiter: RateLimiter,
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    /// Page the tab currently shows; shared with the blocking sections so a
    /// successful click is recorded even when the fetch fails afterwards.
    pager_page: Arc<AtomicU32>,
}

impl BrowserStrategy {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            headless: config.headless,
            timeout: config.timeout,
            limiter: RateLimiter::new(config.pacing),
            browser: None,
            tab: None,
            pager_page: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl FetchStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "automated-browser"
    }

    #[instrument(level = "info", skip(self))]
    async fn open(&mut self) -> Result<(), CrawlError> {
        let headless = self.headless;
        let (browser, tab) = tokio::task::spawn_blocking(
            move || -> Result<(Browser, Arc<Tab>), CrawlError> {
                let options = LaunchOptions::default_builder()
                    .headless(headless)
                    .window_size(Some((1280, 800)))
                    .build()
                    .map_err(|e| CrawlError::Transport(format!("launch options: {e}")))?;
                let browser = Browser::new(options)
                    .map_err(|e| CrawlError::Transport(format!("browser launch failed: {e}")))?;
                let tab = browser.new_tab().map_err(transport)?;
                tab.evaluate(STEALTH_SCRIPT, false).map_err(transport)?;
                Ok((browser, tab))
            },
        )
        .await
        .map_err(|e| CrawlError::Transport(format!("browser task failed: {e}")))??;

        debug!(headless, "Browser session ready");
        self.browser = Some(browser);
        self.tab = Some(tab);
        self.pager_page.store(0, Ordering::SeqCst);
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn fetch_page(&self, uid: u64, page: u32) -> Result<PageResult, CrawlError> {
        let tab = self
            .tab
            .clone()
            .ok_or_else(|| CrawlError::Transport("strategy used before open()".into()))?;
        let timeout = self.timeout;
        let click_pause = self.limiter.sample_action_delay();
        let scroll_pause = self.limiter.sample_action_delay();
        let pager = Arc::clone(&self.pager_page);

        let (html, content_seen) = tokio::task::spawn_blocking(
            move || -> Result<(String, bool), CrawlError> {
                match plan_pager_step(pager.load(Ordering::SeqCst), page) {
                    PagerStep::Navigate => {
                        let url = format!("https://space.bilibili.com/{uid}/video");
                        tab.navigate_to(&url).map_err(transport)?;
                        tab.wait_until_navigated().map_err(transport)?;
                        // Re-assert the stealth overrides in the new document.
                        tab.evaluate(STEALTH_SCRIPT, false).map_err(transport)?;
                        pager.store(1, Ordering::SeqCst);
                    }
                    PagerStep::ClickNext => {
                        // Pagination state is client-side: activate the pager
                        // control the way a person would.
                        let next = tab.find_element(PAGER_NEXT).map_err(|e| {
                            CrawlError::Transport(format!("next-page control unavailable: {e}"))
                        })?;
                        next.click().map_err(transport)?;
                        // The tab has advanced even if the content wait below
                        // fails; record it so a retry does not click again.
                        pager.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(click_pause);
                    }
                    PagerStep::Reuse => {
                        debug!(page, "Tab already shows requested page; re-reading DOM");
                    }
                }

                let content_seen = tab
                    .wait_for_element_with_custom_timeout(LISTING_CONTENT, timeout)
                    .is_ok();

                // Scroll to the bottom so lazily loaded cards render.
                tab.evaluate("window.scrollTo(0, document.body.scrollHeight)", false)
                    .map_err(transport)?;
                std::thread::sleep(scroll_pause);

                let html = tab.get_content().map_err(transport)?;
                Ok((html, content_seen))
            },
        )
        .await
        .map_err(|e| CrawlError::Transport(format!("browser task failed: {e}")))??;

        if parse::looks_blocked(&html) {
            return Err(CrawlError::SecurityBlock(
                "browser landed on an anti-automation interstitial".into(),
            ));
        }
        if !content_seen && !html.contains("__INITIAL_STATE__") {
            return Err(CrawlError::Transport(
                "timed out waiting for listing content".into(),
            ));
        }

        let has_more = parse::pager_has_next(&html);
        info!(page, has_more, bytes = html.len(), "Fetched listing page via browser");
        Ok(PageResult {
            raw: RawContent::Html(html),
            page,
            has_more,
        })
    }

    async fn close(&mut self) {
        self.tab = None;
        self.pager_page.store(0, Ordering::SeqCst);
        if let Some(browser) = self.browser.take() {
            // Dropping the handle kills the child process; keep that off
            // the async runtime.
            let result = tokio::task::spawn_blocking(move || drop(browser)).await;
            if let Err(e) = result {
                warn!(error = %e, "Browser teardown task failed");
            }
        }
    }
}
