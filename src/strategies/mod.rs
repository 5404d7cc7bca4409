//! Transport strategies for retrieving listing pages.
//!
//! Three structurally different transports hide behind one capability set,
//! so the pagination controller and orchestrator stay strategy-agnostic:
//!
//! | Strategy | Module | Transport | Block signal |
//! |----------|--------|-----------|--------------|
//! | Direct API | [`direct`] | structured listing endpoint | API code -352/-412, HTTP 412 |
//! | Simulated client | [`simulated`] | plain HTTP with browser identity | HTTP 412, interstitial markers |
//! | Automated browser | [`browser`] | real Chromium engine | interstitial markers |
//!
//! A strategy instance exclusively owns its session or browser handle for
//! the lifetime of one acquisition run. The orchestrator calls [`FetchStrategy::close`]
//! on every exit path; the browser strategy additionally tears its process
//! down on drop.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::models::{FetchMode, PageResult};
use async_trait::async_trait;

pub mod browser;
pub mod direct;
pub mod simulated;

/// Desktop browser identity presented by the HTTP strategies.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Escalation order auto mode expands to.
pub const AUTO_PRIORITY: &[FetchMode] =
    &[FetchMode::Direct, FetchMode::Simulated, FetchMode::Automated];

/// One concrete transport for retrieving a creator's listing pages.
///
/// The capability set is closed: exactly the three implementations above
/// exist, selected through [`build_strategies`]. All of them report failures
/// through the same [`CrawlError`] taxonomy.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name for logs and the final report.
    fn name(&self) -> &'static str;

    /// Acquire whatever session, connection or browser the transport needs.
    async fn open(&mut self) -> Result<(), CrawlError>;

    /// Fetch one listing page. Pages are requested sequentially starting
    /// at 1; the browser strategy relies on that ordering because its
    /// pagination state lives client-side.
    async fn fetch_page(&self, uid: u64, page: u32) -> Result<PageResult, CrawlError>;

    /// Release the session. Called on every exit path.
    async fn close(&mut self);
}

fn build_pinned(mode: FetchMode, config: &CrawlConfig) -> Box<dyn FetchStrategy> {
    match mode {
        FetchMode::Direct => Box::new(direct::DirectApiStrategy::new(config)),
        FetchMode::Simulated => Box::new(simulated::SimulatedClientStrategy::new(config)),
        FetchMode::Automated => Box::new(browser::BrowserStrategy::new(config)),
        FetchMode::Auto => build_pinned(AUTO_PRIORITY[0], config),
    }
}

/// Construct the ordered strategy list for a mode: a pinned mode yields its
/// single transport, `Auto` expands to the full priority list. Total over
/// every [`FetchMode`] value; never panics.
pub fn build_strategies(mode: FetchMode, config: &CrawlConfig) -> Vec<Box<dyn FetchStrategy>> {
    match mode {
        FetchMode::Auto => AUTO_PRIORITY
            .iter()
            .map(|&m| build_pinned(m, config))
            .collect(),
        pinned => vec![build_pinned(pinned, config)],
    }
}
