//! Auto-mode orchestration: strategy selection, escalation and the final
//! report.
//!
//! In auto mode the strategies are tried in a fixed priority order,
//! fastest and most fragile first:
//!
//! 1. direct structured API
//! 2. simulated HTTP client
//! 3. automated browser
//!
//! Escalation happens only on a terminal failure outcome from the current
//! strategy, never on partial success, and a strategy switch discards the
//! abandoned strategy's partial records so one run never mixes provenance.
//! The first strategy to finish pagination with an authoritative parse wins
//! (an empty in-window result is still a win: "no data in range" is valid
//! data). If every strategy comes up empty-handed the report says so
//! explicitly, and the synthetic generator is consulted only when the
//! caller enabled it.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::models::{
    AcquisitionReport, FailureKind, FetchRequest, Provenance, StrategyAttempt, StrategyOutcome,
};
use crate::pacing::RateLimiter;
use crate::pagination::paginate;
use crate::parse::synthetic_records;
use crate::retry::RetryPolicy;
use crate::strategies::{FetchStrategy, build_strategies};
use tracing::{info, instrument, warn};

/// One acquisition run: configuration snapshot plus the derived pacing and
/// retry policies. Immutable for the lifetime of the run.
pub struct Orchestrator {
    config: CrawlConfig,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(config: CrawlConfig) -> Self {
        let limiter = RateLimiter::new(config.pacing);
        let policy = RetryPolicy::new(config.retry_attempts, config.retry_base_delay);
        Self {
            config,
            limiter,
            policy,
        }
    }

    /// Run one acquisition. Configuration errors surface immediately,
    /// before any session is opened.
    #[instrument(level = "info", skip_all, fields(uid = req.uid, mode = ?req.mode))]
    pub async fn acquire(&self, req: &FetchRequest) -> Result<AcquisitionReport, CrawlError> {
        req.validate()?;
        self.acquire_with(req, build_strategies(req.mode, &self.config))
            .await
    }

    /// Escalation loop over an ordered strategy list. Separated from
    /// [`acquire`](Self::acquire) so tests can substitute strategies.
    pub(crate) async fn acquire_with(
        &self,
        req: &FetchRequest,
        strategies: Vec<Box<dyn FetchStrategy>>,
    ) -> Result<AcquisitionReport, CrawlError> {
        req.validate()?;

        let mut attempts: Vec<StrategyAttempt> = Vec::new();

        for mut strategy in strategies {
            let name = strategy.name();
            self.limiter.pause_before_action().await;
            info!(strategy = name, "Opening strategy session");

            if let Err(e) = strategy.open().await {
                warn!(strategy = name, error = %e, "Session open failed; escalating");
                attempts.push(StrategyAttempt {
                    strategy: name,
                    failure: FailureKind::from(&e),
                    detail: e.to_string(),
                });
                strategy.close().await;
                continue;
            }

            let outcome =
                paginate(strategy.as_ref(), &self.limiter, &self.policy, req, self.config.max_pages)
                    .await;
            // Session release on every exit path, win or lose.
            strategy.close().await;

            match outcome {
                StrategyOutcome::Success {
                    records,
                    pages,
                    provenance,
                } => {
                    info!(
                        strategy = name,
                        count = records.len(),
                        pages,
                        ?provenance,
                        "Acquisition complete"
                    );
                    return Ok(AcquisitionReport {
                        records,
                        provenance: Some(provenance),
                        pages_traversed: pages,
                        attempts,
                        synthetic_fallback: false,
                        authoritative: true,
                    });
                }
                StrategyOutcome::Blocked(reason) => attempts.push(StrategyAttempt {
                    strategy: name,
                    failure: FailureKind::Blocked,
                    detail: reason,
                }),
                StrategyOutcome::ParseFailure => attempts.push(StrategyAttempt {
                    strategy: name,
                    failure: FailureKind::Parse,
                    detail: "no parsing path produced records".into(),
                }),
                StrategyOutcome::TransportFailure(reason) => attempts.push(StrategyAttempt {
                    strategy: name,
                    failure: FailureKind::Transport,
                    detail: reason,
                }),
            }
            // Partial records from the failed strategy were discarded with
            // its outcome; the next strategy starts clean.
        }

        if self.config.allow_synthetic {
            let records = synthetic_records(req.uid, req.start_date, req.end_date);
            warn!(
                count = records.len(),
                "No strategy produced authoritative data; serving synthetic fallback"
            );
            return Ok(AcquisitionReport {
                records,
                provenance: Some(Provenance::Synthetic),
                pages_traversed: 0,
                attempts,
                synthetic_fallback: true,
                authoritative: false,
            });
        }

        warn!(
            attempted = attempts.len(),
            "No strategy produced authoritative data"
        );
        Ok(AcquisitionReport {
            records: Vec::new(),
            provenance: None,
            pages_traversed: 0,
            attempts,
            synthetic_fallback: false,
            authoritative: false,
        })
    }
}
