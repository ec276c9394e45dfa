//! Status and costs command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::{CostEstimate, MetaDb, PipelineRun, PipelineStats};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub rewrite_mode: String,
    pub similarity_threshold: f64,
    pub stats: PipelineStats,
    pub completion_percent: u8,
    pub latest_run: Option<PipelineRun>,
}

/// Get pipeline status
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<StatusInfo> {
    info!("Getting status");

    let stats = db.get_pipeline_stats().await?;
    let latest_run = db.get_latest_run().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        rewrite_mode: config.generation.rewrite_mode.clone(),
        similarity_threshold: config.integrity.similarity_threshold,
        completion_percent: stats.completion_percent(),
        stats,
        latest_run,
    })
}

/// Estimate API spend from run history
pub async fn cmd_costs(config: &Config, db: &MetaDb) -> Result<CostEstimate> {
    db.get_cost_estimate(&config.costs).await
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 leadforge Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Rewrite mode: {}", status.rewrite_mode);
    println!("Similarity threshold: {:.2}", status.similarity_threshold);

    let stats = &status.stats;
    println!("\nLeads:");
    println!("  Pending: {}", stats.pending);
    println!("  Scraped: {}", stats.scraped);
    println!("  Processed: {}", stats.processed);
    println!("  Failed: {}", stats.failed);
    println!("  Total: {}", stats.total);
    println!("\n  With content: {}", stats.with_content);
    println!("  With SEO: {}", stats.with_seo);
    println!("  Flagged by integrity check: {}", stats.flagged);
    println!("  Completion: {}%", status.completion_percent);

    match &status.latest_run {
        Some(run) => {
            println!("\nLast batch:");
            println!("  Stage: {} ({})", run.stage, run.status);
            println!("  Started: {}", run.started_at);
            println!(
                "  Leads: {} processed, {} succeeded, {} failed",
                run.leads_processed, run.leads_succeeded, run.leads_failed
            );
        }
        None => println!("\nNo batches run yet. Use 'leadforge run' to start."),
    }
}

/// Print cost estimate to console
pub fn print_costs(costs: &CostEstimate) {
    println!("\n💰 Estimated API Costs\n");
    println!(
        "Scrapes: {} ({} succeeded, {} failed, {}% success)",
        costs.total_scrapes, costs.successful_scrapes, costs.failed_scrapes, costs.success_rate
    );
    println!("Generations: {}", costs.generations);
    println!("\n  Scrape cost: ${:.2}", costs.scrape_cost);
    println!("  Generation cost: ${:.2}", costs.generation_cost);
    println!("  Total: ${:.2}", costs.total_cost);
}
