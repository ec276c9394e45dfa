//! Lead pipeline state machine
//!
//! Leads move `pending -> scraped -> processed`. A scrape failure moves a
//! lead to `failed`; a generation failure leaves it `scraped` so it can be
//! regenerated without another scrape. `failed -> pending` only happens
//! through [`LeadPipeline::retry_failed`].
//!
//! Batches are strictly sequential. Each lead's transition is committed on
//! its own before the next lead starts, so a crash mid-batch leaves at most
//! one lead in a stale but retryable state.

mod pacer;

pub use pacer::*;

use crate::config::{IntegrityConfig, PipelineSettings};
use crate::error::{Error, Result};
use crate::generate::{GenerationRequest, GenerationService};
use crate::integrity::{IntegrityChecker, IntegrityStatus, RewriteMode};
use crate::meta::{LeadRecord, LeadStatus, LeadStore, LeadUpdate, PipelineRun, RunStatus};
use crate::positioning::{compute_positions, ComparativePosition, Metric, PeerFilter, PeerSource, Scope};
use crate::progress::{advance_progress, finish_progress, start_progress_bar};
use crate::scrape::ScrapeService;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error stored when a scrape returns no text
pub const EMPTY_CONTENT_ERROR: &str = "Empty content returned";

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scrape,
    Generate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Generate => "generate",
        }
    }

    /// Next stage to run for a backlog; scraping comes first
    pub fn next_for(remaining: &Remaining) -> Stage {
        if remaining.scrape > 0 {
            Stage::Scrape
        } else {
            Stage::Generate
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scrape" => Ok(Stage::Scrape),
            "generate" => Ok(Stage::Generate),
            _ => Err(Error::Validation(format!("Unknown stage: {}", s))),
        }
    }
}

/// Positions attached to leads as they are processed
#[derive(Clone)]
pub struct PositioningTarget {
    pub source: Arc<dyn PeerSource>,
    pub scope: Scope,
    pub metrics: Vec<Metric>,
}

/// Behavior that is not part of [`PipelineSettings`]
#[derive(Clone, Default)]
pub struct PipelineOptions {
    pub rewrite_mode: RewriteMode,
    /// Chunking and excerpt settings; the threshold comes from the settings
    pub integrity: IntegrityConfig,
    pub positioning: Option<PositioningTarget>,
    pub show_progress: bool,
}

/// Outcome for one lead in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadOutcome {
    pub lead_id: i64,
    pub website: String,
    pub status: LeadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<IntegrityStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_similarity: Option<f64>,
}

/// Work left after a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remaining {
    pub scrape: usize,
    pub generate: usize,
    pub total: usize,
}

/// Result of one batch invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub stage: Stage,
    pub processed: usize,
    pub results: Vec<LeadOutcome>,
    pub remaining: Remaining,
    pub should_continue: bool,
    /// Status transitions committed by this batch
    #[serde(skip)]
    pub committed: usize,
}

/// Result of draining the queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrainReport {
    pub batches: Vec<BatchReport>,
    pub remaining: Remaining,
    /// Set when a follow-up batch failed and ended the drain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_error: Option<String>,
}

impl DrainReport {
    pub fn processed(&self) -> usize {
        self.batches.iter().map(|b| b.processed).sum()
    }
}

/// Batch driver over the store and the two external services
pub struct LeadPipeline {
    settings: PipelineSettings,
    store: Arc<dyn LeadStore>,
    scraper: Arc<dyn ScrapeService>,
    generator: Arc<dyn GenerationService>,
    options: PipelineOptions,
    checker: IntegrityChecker,
    scrape_pacer: Pacer,
    generate_pacer: Pacer,
}

impl LeadPipeline {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn LeadStore>,
        scraper: Arc<dyn ScrapeService>,
        generator: Arc<dyn GenerationService>,
        options: PipelineOptions,
    ) -> Self {
        let checker =
            IntegrityChecker::new(&options.integrity).with_threshold(settings.similarity_threshold);
        let scrape_pacer = Pacer::new(settings.scrape_delay());
        let generate_pacer = Pacer::new(settings.generation_delay());

        Self {
            settings,
            store,
            scraper,
            generator,
            options,
            checker,
            scrape_pacer,
            generate_pacer,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Pending and scraped counts
    pub async fn remaining(&self) -> Result<Remaining> {
        let scrape = self.store.count_pending().await?;
        let generate = self.store.count_scraped().await?;
        Ok(Remaining {
            scrape,
            generate,
            total: scrape + generate,
        })
    }

    /// Run one batch of a stage.
    ///
    /// External service failures are absorbed into the affected lead; store
    /// failures and configuration problems fail the invocation.
    pub async fn run_stage(&self, stage: Stage, batch_size: usize) -> Result<BatchReport> {
        let batch_size = batch_size.max(1);
        let mut run = PipelineRun::new(stage.as_str(), batch_size);

        match self.process_batch(stage, batch_size).await {
            Ok((results, committed)) => {
                let succeeded = results.iter().filter(|r| r.error.is_none()).count();
                let errors: Vec<String> = results.iter().filter_map(|r| r.error.clone()).collect();
                run.finish(RunStatus::Completed, succeeded, errors.len(), &errors);
                self.record(&run).await;

                let remaining = self.remaining().await?;
                info!(
                    %stage,
                    processed = results.len(),
                    pending_scrape = remaining.scrape,
                    pending_generate = remaining.generate,
                    "Batch complete"
                );

                Ok(BatchReport {
                    stage,
                    processed: results.len(),
                    results,
                    should_continue: remaining.total > 0,
                    remaining,
                    committed,
                })
            }
            Err(e) => {
                run.finish(RunStatus::Failed, 0, 0, &[e.to_string()]);
                self.record(&run).await;
                Err(e)
            }
        }
    }

    async fn record(&self, run: &PipelineRun) {
        if let Err(e) = self.store.record_run(run).await {
            warn!("Failed to record pipeline run: {}", e);
        }
    }

    async fn process_batch(&self, stage: Stage, batch_size: usize) -> Result<(Vec<LeadOutcome>, usize)> {
        let leads = match stage {
            Stage::Scrape => self.store.select_pending(batch_size).await?,
            Stage::Generate => self.store.select_scraped(batch_size).await?,
        };

        if leads.is_empty() {
            info!(%stage, "No leads waiting");
            return Ok((Vec::new(), 0));
        }
        info!(%stage, count = leads.len(), "Processing batch");

        let pb = if self.options.show_progress {
            start_progress_bar(leads.len(), &format!("{} batch", stage))
        } else {
            None
        };

        let mut results = Vec::with_capacity(leads.len());
        let mut committed = 0;

        for lead in &leads {
            let (outcome, applied) = match stage {
                Stage::Scrape => {
                    self.scrape_pacer.ready().await;
                    self.scrape_lead(lead).await?
                }
                Stage::Generate => {
                    self.generate_pacer.ready().await;
                    self.generate_lead(lead).await?
                }
            };
            if applied {
                committed += 1;
            }
            results.push(outcome);
            advance_progress(&pb);
        }

        finish_progress(pb, &format!("{} batch done", stage));
        Ok((results, committed))
    }

    /// Scrape one pending lead. Returns the outcome and whether a status
    /// transition was committed.
    async fn scrape_lead(&self, lead: &LeadRecord) -> Result<(LeadOutcome, bool)> {
        debug!(lead_id = lead.id, website = %lead.website, "Scraping lead");

        let failure = match self.scraper.scrape(&lead.website).await {
            Ok(page) if !page.text.trim().is_empty() => {
                let applied = self
                    .store
                    .update_lead(lead.id, LeadUpdate::Scraped { text_content: page.text })
                    .await?;
                return Ok((outcome(lead, LeadStatus::Scraped, None), applied));
            }
            Ok(_) => EMPTY_CONTENT_ERROR.to_string(),
            Err(e) if e.is_service_error() => e.to_string(),
            Err(e) => return Err(e),
        };

        warn!(lead_id = lead.id, stage = "scrape", "Scrape failed: {}", failure);
        let applied = self
            .store
            .update_lead(lead.id, LeadUpdate::ScrapeFailed { error: failure.clone() })
            .await?;
        Ok((outcome(lead, LeadStatus::Failed, Some(failure)), applied))
    }

    /// Generate content for one scraped lead
    async fn generate_lead(&self, lead: &LeadRecord) -> Result<(LeadOutcome, bool)> {
        debug!(lead_id = lead.id, website = %lead.website, "Generating content");

        let source = lead.text_content.as_deref().unwrap_or_default();
        let mode = self.options.rewrite_mode;
        let request = GenerationRequest {
            source_text: source.to_string(),
            business_name: lead.business_name.clone(),
            location: lead.location(),
            rating: lead.rating,
            reviews_count: lead.reviews_count,
            rewrite_mode: mode,
        };

        let checked = match self.generator.generate(&request).await {
            Ok(content) => self
                .checker
                .check(source, &content.published_text(), mode)
                .map(|verdict| (content, verdict)),
            Err(e) => Err(e),
        };

        let (content, integrity) = match checked {
            Ok(pair) => pair,
            Err(e) if e.is_service_error() || matches!(e, Error::Validation(_)) => {
                let message = e.to_string();
                warn!(lead_id = lead.id, stage = "generate", "Generation failed: {}", message);
                self.store
                    .update_lead(lead.id, LeadUpdate::GenerationFailed { error: message.clone() })
                    .await?;
                return Ok((outcome(lead, LeadStatus::Scraped, Some(message)), false));
            }
            Err(e) => return Err(e),
        };

        if integrity.is_flagged() {
            warn!(
                lead_id = lead.id,
                max_similarity = integrity.max_similarity,
                "Generated content is too close to the source"
            );
        }

        let positions = self.attach_positions(lead, content.services.as_deref()).await;
        let verdict = integrity.status;
        let max_similarity = integrity.max_similarity;

        let applied = self
            .store
            .update_lead(
                lead.id,
                LeadUpdate::Processed {
                    fields: content.to_fields()?,
                    integrity,
                    positions,
                },
            )
            .await?;

        let mut result = outcome(lead, LeadStatus::Processed, None);
        result.integrity = Some(verdict);
        result.max_similarity = Some(max_similarity);
        Ok((result, applied))
    }

    /// Best effort: positioning problems never block processing
    async fn attach_positions(
        &self,
        lead: &LeadRecord,
        services: Option<&[String]>,
    ) -> Option<Vec<ComparativePosition>> {
        let target = self.options.positioning.as_ref()?;

        let mut subject = lead.subject();
        if let Some(services) = services {
            subject.services = services.to_vec();
        }

        let filter = match PeerFilter::for_scope(target.scope, &subject, None, None) {
            Ok(filter) => filter,
            Err(e) => {
                warn!(lead_id = lead.id, "Skipping positioning: {}", e);
                return None;
            }
        };

        match compute_positions(target.source.as_ref(), target.scope, &target.metrics, &subject, &filter).await {
            Ok(positions) => Some(positions),
            Err(e) => {
                warn!(lead_id = lead.id, "Positioning failed: {}", e);
                None
            }
        }
    }

    /// Run batches until the queue is drained.
    ///
    /// Scraping is prioritized over generation. A batch that commits no
    /// transition stalls its stage for the rest of the drain; the other stage
    /// keeps going while it has work. The drain ends when the queue is empty
    /// or every stage with work has stalled, and the number of progressing
    /// batches is bounded by the backlog at the start. A failure in the first
    /// batch is returned; a failure in a follow-up batch is logged and ends
    /// the drain, leaving committed work in place.
    pub async fn drain(&self, first: Option<Stage>, batch_size: usize) -> Result<DrainReport> {
        let batch_size = batch_size.max(1);
        let start = self.remaining().await?;
        let max_batches = max_batches_from(&start, batch_size, first);
        let mut stage = first.unwrap_or_else(|| Stage::next_for(&start));
        let mut stalled: Vec<Stage> = Vec::new();
        let mut progressed = 0;
        let mut report = DrainReport {
            remaining: start,
            ..Default::default()
        };

        debug!(max_batches, "Draining lead queue");

        loop {
            let batch = match self.run_stage(stage, batch_size).await {
                Ok(batch) => batch,
                Err(e) if report.batches.is_empty() => return Err(e),
                Err(e) => {
                    warn!("Continuation batch failed: {}", e);
                    report.continuation_error = Some(e.to_string());
                    break;
                }
            };

            if batch.committed == 0 {
                if batch.processed > 0 {
                    warn!(%stage, "Batch made no progress, skipping stage for this run");
                }
                stalled.push(stage);
            } else {
                progressed += 1;
            }

            let should_continue = batch.should_continue;
            report.remaining = batch.remaining;
            report.batches.push(batch);

            if !should_continue || progressed >= max_batches.max(1) {
                break;
            }
            match next_stage(&report.remaining, &stalled) {
                Some(next) => {
                    stage = next;
                    info!(next = %stage, "Auto-continuing");
                }
                None => break,
            }
        }

        Ok(report)
    }

    /// Reset every failed lead to pending
    pub async fn retry_failed(&self) -> Result<usize> {
        let reset = self.store.reset_failed().await?;
        info!(reset, "Reset failed leads to pending");
        Ok(reset)
    }
}

/// Batches needed to drain a backlog when every call succeeds: each pending
/// lead is visited once per stage, each scraped lead once.
pub fn max_batches(remaining: &Remaining, batch_size: usize) -> usize {
    let batch_size = batch_size.max(1);
    remaining.scrape.div_ceil(batch_size) + (remaining.scrape + remaining.generate).div_ceil(batch_size)
}

/// Like [`max_batches`], plus the generate pass over already scraped leads
/// that runs before scraping when the drain starts from generate.
pub fn max_batches_from(remaining: &Remaining, batch_size: usize, first: Option<Stage>) -> usize {
    let extra = match first {
        Some(Stage::Generate) => remaining.generate.div_ceil(batch_size.max(1)),
        _ => 0,
    };
    max_batches(remaining, batch_size) + extra
}

/// Next stage with work that has not stalled, scrape first
fn next_stage(remaining: &Remaining, stalled: &[Stage]) -> Option<Stage> {
    [(Stage::Scrape, remaining.scrape), (Stage::Generate, remaining.generate)]
        .into_iter()
        .find(|(stage, backlog)| *backlog > 0 && !stalled.contains(stage))
        .map(|(stage, _)| stage)
}

fn outcome(lead: &LeadRecord, status: LeadStatus, error: Option<String>) -> LeadOutcome {
    LeadOutcome {
        lead_id: lead.id,
        website: lead.website.clone(),
        status,
        error,
        integrity: None,
        max_similarity: None,
    }
}
