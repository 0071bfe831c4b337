//! Full harvest runs
//!
//! One run discovers every detail page, then visits them strictly in
//! listing order: cache probe, live scrape on a miss (paced), hand-off to
//! the [`RecordSink`]. A failing page is recorded and skipped. When the run
//! deadline passes, the page in flight is abandoned and the run stops.

use super::listing::LinkSource;
use super::Harvester;
use crate::error::Result;
use crate::models::SchoolRecord;
use crate::store::RunStatus;
use async_trait::async_trait;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Deadline shared by everything a run awaits
#[derive(Debug, Clone, Copy, Default)]
pub struct RunContext {
    deadline: Option<Instant>,
}

impl RunContext {
    pub fn unbounded() -> Self {
        Self { deadline: None }
    }

    pub fn with_deadline(limit: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + limit),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Await `fut` unless the deadline passes first; `None` on expiry
    pub async fn bound<F: Future>(&self, fut: F) -> Option<F::Output> {
        match self.deadline {
            None => Some(fut.await),
            Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        }
    }
}

/// A page that produced no stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub url: String,
    pub reason: String,
}

/// Counters accumulated over one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Links discovered on the listing
    pub total: usize,
    pub attempted: usize,
    pub from_cache: usize,
    pub newly_scraped: usize,
    /// Harvest failures plus detail rows that could not be stored
    pub errors: usize,
    pub persisted: usize,
    pub stat_errors: usize,
    pub quality_warnings: usize,
    pub deadline_exceeded: bool,
    pub failures: Vec<FailedItem>,
}

impl RunSummary {
    pub fn record_failure(&mut self, url: &str, reason: impl std::fmt::Display) {
        self.errors += 1;
        self.failures.push(FailedItem {
            url: url.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn status(&self) -> RunStatus {
        if self.deadline_exceeded {
            RunStatus::DeadlineExceeded
        } else if self.errors > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        }
    }
}

/// Outcome of storing one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub stat_errors: usize,
    pub quality_warnings: usize,
}

/// Destination of harvested records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Store one record; an `Err` means nothing usable was stored
    async fn accept(&self, record: &SchoolRecord) -> Result<SinkReport>;
}

/// Minimum gap between live scrapes
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Time left before the next live scrape may start
    pub fn remaining(&self) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub async fn wait(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            debug!("Pacing for {:?}", remaining);
            tokio::time::sleep(remaining).await;
        }
    }

    /// Note that a live scrape just finished
    pub fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}

/// Drives one harvest run
pub struct Orchestrator<'a> {
    listing: &'a dyn LinkSource,
    harvester: &'a Harvester,
    sink: &'a dyn RecordSink,
    pacing: Duration,
    progress: Option<ProgressBar>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        listing: &'a dyn LinkSource,
        harvester: &'a Harvester,
        sink: &'a dyn RecordSink,
        pacing: Duration,
    ) -> Self {
        Self {
            listing,
            harvester,
            sink,
            pacing,
            progress: None,
        }
    }

    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Run to completion or deadline.
    ///
    /// Only a failed listing fetch is an `Err`; everything after discovery
    /// ends up in the summary. A deadline passing while the listing is still
    /// being read yields an empty summary marked `deadline_exceeded`.
    pub async fn run(&self, ctx: &RunContext) -> Result<RunSummary> {
        let links = match ctx.bound(self.listing.discover()).await {
            Some(links) => links?,
            None => {
                warn!("Run deadline passed before the listing was read");
                return Ok(RunSummary {
                    deadline_exceeded: true,
                    ..Default::default()
                });
            }
        };

        let mut summary = RunSummary {
            total: links.len(),
            ..Default::default()
        };
        let mut pacer = Pacer::new(self.pacing);

        if let Some(bar) = &self.progress {
            bar.set_length(links.len() as u64);
        }

        for url in &links {
            if ctx.expired() {
                summary.deadline_exceeded = true;
                break;
            }

            let flow = self.visit(url, ctx, &mut pacer, &mut summary).await;
            if let Some(bar) = &self.progress {
                bar.inc(1);
            }
            if flow.is_break() {
                break;
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }

        info!(
            total = summary.total,
            from_cache = summary.from_cache,
            newly_scraped = summary.newly_scraped,
            persisted = summary.persisted,
            errors = summary.errors,
            deadline_exceeded = summary.deadline_exceeded,
            "Harvest run finished"
        );
        Ok(summary)
    }

    async fn visit(
        &self,
        url: &str,
        ctx: &RunContext,
        pacer: &mut Pacer,
        summary: &mut RunSummary,
    ) -> ControlFlow<()> {
        let record = match self.harvester.cached(url) {
            Some(record) => {
                summary.attempted += 1;
                summary.from_cache += 1;
                record
            }
            None => {
                if ctx.bound(pacer.wait()).await.is_none() {
                    summary.deadline_exceeded = true;
                    return ControlFlow::Break(());
                }
                if let Some(bar) = &self.progress {
                    bar.set_message(url.to_string());
                }

                summary.attempted += 1;
                let outcome = ctx.bound(self.harvester.scrape(url)).await;
                pacer.mark();

                match outcome {
                    Some(Ok(record)) => {
                        summary.newly_scraped += 1;
                        record
                    }
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "Harvest failed, skipping");
                        summary.record_failure(url, e);
                        return ControlFlow::Continue(());
                    }
                    None => {
                        warn!(url = %url, "Run deadline passed, abandoning page");
                        summary.record_failure(url, "run deadline exceeded");
                        summary.deadline_exceeded = true;
                        return ControlFlow::Break(());
                    }
                }
            }
        };

        match self.sink.accept(&record).await {
            Ok(report) => {
                summary.persisted += 1;
                summary.stat_errors += report.stat_errors;
                summary.quality_warnings += report.quality_warnings;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to store record");
                summary.record_failure(url, e);
            }
        }
        ControlFlow::Continue(())
    }
}
