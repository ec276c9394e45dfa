//! Run and retry command implementation

use crate::config::Config;
use crate::error::Result;
use crate::generate::ChatCompletionsClient;
use crate::meta::MetaDb;
use crate::pipeline::{
    BatchReport, LeadPipeline, PipelineOptions, PositioningTarget, Remaining, Stage,
};
use crate::scrape::FirecrawlClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Options for the run command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stage to start with; defaults to whichever has work, scrape first
    pub stage: Option<Stage>,
    /// Overrides `pipeline.batch_size`
    pub batch_size: Option<usize>,
    /// Run a single batch instead of draining the queue
    pub once: bool,
    pub show_progress: bool,
}

/// Result of a run invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub remaining: Remaining,
    pub should_continue: bool,
    pub batches: Vec<BatchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_error: Option<String>,
}

/// Build a pipeline wired to the configured HTTP services
pub fn build_pipeline(config: &Config, db: Arc<MetaDb>, show_progress: bool) -> Result<LeadPipeline> {
    let settings = config.pipeline_settings()?;
    let scraper = FirecrawlClient::new(&config.scrape, settings.scrape_api_key.clone())?;
    let generator = ChatCompletionsClient::new(&config.generation, settings.generation_api_key.clone())?;

    let positioning = if config.positioning.attach_on_generate {
        let (scope, metrics) = config.positioning_targets()?;
        Some(PositioningTarget {
            source: db.clone(),
            scope,
            metrics,
        })
    } else {
        None
    };

    let options = PipelineOptions {
        rewrite_mode: config.rewrite_mode()?,
        integrity: config.integrity.clone(),
        positioning,
        show_progress,
    };

    Ok(LeadPipeline::new(
        settings,
        db,
        Arc::new(scraper),
        Arc::new(generator),
        options,
    ))
}

/// Run one batch, or drain the queue when auto-continue is on
pub async fn cmd_run(config: &Config, db: Arc<MetaDb>, options: RunOptions) -> Result<RunSummary> {
    let pipeline = build_pipeline(config, db, options.show_progress)?;
    let batch_size = options.batch_size.unwrap_or(pipeline.settings().batch_size);

    if options.once || !config.pipeline.auto_continue {
        let stage = match options.stage {
            Some(stage) => stage,
            None => Stage::next_for(&pipeline.remaining().await?),
        };
        let batch = pipeline.run_stage(stage, batch_size).await?;
        return Ok(RunSummary {
            processed: batch.processed,
            remaining: batch.remaining,
            should_continue: batch.should_continue,
            batches: vec![batch],
            continuation_error: None,
        });
    }

    let report = pipeline.drain(options.stage, batch_size).await?;
    info!(
        batches = report.batches.len(),
        processed = report.processed(),
        "Drain finished"
    );

    Ok(RunSummary {
        processed: report.processed(),
        remaining: report.remaining,
        should_continue: report.remaining.total > 0,
        continuation_error: report.continuation_error.clone(),
        batches: report.batches,
    })
}

/// Result of a retry invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryReport {
    pub reset: usize,
}

/// Reset every failed lead to pending
pub async fn cmd_retry(db: &MetaDb) -> Result<RetryReport> {
    use crate::meta::LeadStore;

    let reset = db.reset_failed().await?;
    info!(reset, "Reset failed leads");
    Ok(RetryReport { reset })
}

pub fn print_run_summary(summary: &RunSummary) {
    for batch in &summary.batches {
        println!("\n▶ {} batch: {} lead(s)", batch.stage, batch.processed);
        for result in &batch.results {
            let marker = if result.error.is_some() { "✗" } else { "✓" };
            print!("  {} #{} {} → {}", marker, result.lead_id, result.website, result.status);
            if let (Some(verdict), Some(score)) = (result.integrity, result.max_similarity) {
                print!(" [integrity {} {:.3}]", verdict, score);
            }
            if let Some(error) = &result.error {
                print!(" ({})", error);
            }
            println!();
        }
    }

    println!("\n✓ Processed {} lead(s)", summary.processed);
    println!(
        "  Remaining: {} to scrape, {} to generate",
        summary.remaining.scrape, summary.remaining.generate
    );
    if let Some(error) = &summary.continuation_error {
        println!("  ⚠ Stopped early: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::meta::{LeadStatus, NewLead};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(scrape: &MockServer, generation: &MockServer, suffix: &str) -> (Config, Arc<MetaDb>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.scrape.base_url = scrape.uri();
        config.scrape.delay_ms = 0;
        config.generation.base_url = generation.uri();
        config.generation.delay_ms = 0;

        // Unique variable names keep parallel tests apart
        config.scrape.api_key_env = format!("LEADFORGE_TEST_SCRAPE_KEY_{}", suffix);
        config.generation.api_key_env = format!("LEADFORGE_TEST_LLM_KEY_{}", suffix);
        std::env::set_var(&config.scrape.api_key_env, "fc-test");
        std::env::set_var(&config.generation.api_key_env, "llm-test");

        let db = Arc::new(MetaDb::new(&config.paths.db_file).await.unwrap());
        (config, db, tmp)
    }

    fn generated() -> serde_json::Value {
        json!({
            "seo_title": "Calm Dental Care in Springfield",
            "seo_description": "Relaxed visits for every age.",
            "profile_content": "Patients describe unhurried appointments and clear explanations.",
            "faq": [{ "question": "Do they see children?", "answer": "Yes, from age three." }],
            "services": ["Cleanings"]
        })
    }

    async fn mount_services(scrape: &MockServer, generation: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "markdown": "Springfield Smiles offers cleanings, fillings and whitening for families." }
            })))
            .mount(scrape)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": generated().to_string() } }]
            })))
            .mount(generation)
            .await;
    }

    #[tokio::test]
    async fn test_run_drains_queue_end_to_end() {
        let scrape = MockServer::start().await;
        let generation = MockServer::start().await;
        mount_services(&scrape, &generation).await;
        let (config, db, _tmp) = setup(&scrape, &generation, "DRAIN").await;

        for site in ["one.example", "two.example", "three.example"] {
            db.insert_lead(&NewLead {
                website: site.to_string(),
                city: "Springfield".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let summary = cmd_run(
            &config,
            db.clone(),
            RunOptions {
                batch_size: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.remaining.total, 0);
        assert!(!summary.should_continue);
        assert_eq!(summary.batches.len(), 4);

        let processed = db.list_leads(Some(LeadStatus::Processed), 10).await.unwrap();
        assert_eq!(processed.len(), 3);
        assert!(processed.iter().all(|l| l.integrity().is_some()));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["remaining"]["scrape"], 0);
        assert_eq!(json["should_continue"], false);
    }

    #[tokio::test]
    async fn test_run_once_processes_single_batch() {
        let scrape = MockServer::start().await;
        let generation = MockServer::start().await;
        mount_services(&scrape, &generation).await;
        let (config, db, _tmp) = setup(&scrape, &generation, "ONCE").await;

        for i in 0..3 {
            db.insert_lead(&NewLead {
                website: format!("lead{}.example", i),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let summary = cmd_run(
            &config,
            db.clone(),
            RunOptions {
                stage: Some(Stage::Scrape),
                batch_size: Some(2),
                once: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.remaining, Remaining { scrape: 1, generate: 2, total: 3 });
        assert!(summary.should_continue);
    }

    #[tokio::test]
    async fn test_run_requires_credentials() {
        let scrape = MockServer::start().await;
        let generation = MockServer::start().await;
        let (mut config, db, _tmp) = setup(&scrape, &generation, "MISSING").await;
        config.scrape.api_key_env = "LEADFORGE_TEST_UNSET_KEY".to_string();

        let result = cmd_run(&config, db, RunOptions::default()).await;
        assert!(matches!(result, Err(Error::MissingCredential(_))));
    }

    #[tokio::test]
    async fn test_retry_resets_failed() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("retry.db")).await.unwrap();
        assert_eq!(cmd_retry(&db).await.unwrap().reset, 0);
    }
}
