//! Lead storage using SQLite
//!
//! This module handles all local storage including:
//! - Leads (business records and their pipeline state)
//! - Integrity checks (append-only verdict history)
//! - Pipeline runs (per-batch history and stats)
//! - Peer metric queries for comparative positioning

mod schema;

pub use schema::*;

use crate::config::{Config, CostConfig};
use crate::error::{Error, Result};
use crate::integrity::IntegrityResult;
use crate::positioning::{ComparativePosition, Metric, PeerFilter, PeerSource, Scope, Subject};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Pipeline state of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Pending,
    Scraped,
    Processed,
    Failed,
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::Pending => write!(f, "pending"),
            LeadStatus::Scraped => write!(f, "scraped"),
            LeadStatus::Processed => write!(f, "processed"),
            LeadStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for LeadStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(LeadStatus::Pending),
            "scraped" => Ok(LeadStatus::Scraped),
            "processed" => Ok(LeadStatus::Processed),
            "failed" => Ok(LeadStatus::Failed),
            _ => Err(Error::Validation(format!("Unknown lead status: {}", s))),
        }
    }
}

/// Pipeline run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A business lead
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: i64,
    pub website: String,
    pub city: String,
    pub business_name: Option<String>,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub years_active: Option<i64>,
    pub text_content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub profile_content: Option<String>,
    pub faq_json: Option<String>,
    pub services_json: Option<String>,
    pub unique_features_json: Option<String>,
    pub facts_json: Option<String>,
    pub signals_json: Option<String>,
    pub schema_markup_json: Option<String>,
    pub scrape_status: Option<String>,
    pub retry_count: i64,
    pub processing_error: Option<String>,
    pub scraped_at: Option<String>,
    pub processed_at: Option<String>,
    pub created_at: String,
    pub integrity_json: Option<String>,
    pub comparative_json: Option<String>,
}

impl LeadRecord {
    /// Current status; a missing status reads as pending
    pub fn status(&self) -> LeadStatus {
        self.scrape_status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LeadStatus::Pending)
    }

    /// Human-readable location for prompts
    pub fn location(&self) -> String {
        match &self.address {
            Some(address) if !address.trim().is_empty() => address.clone(),
            _ => self.city.clone(),
        }
    }

    pub fn services(&self) -> Vec<String> {
        self.services_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }

    /// Latest integrity verdict
    pub fn integrity(&self) -> Option<IntegrityResult> {
        self.integrity_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
    }

    /// Attached comparative positions
    pub fn positions(&self) -> Vec<ComparativePosition> {
        self.comparative_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }

    /// View of this lead as a positioning subject
    pub fn subject(&self) -> Subject {
        Subject {
            id: Some(self.id),
            address: self.address.clone(),
            rating: self.rating,
            reviews_count: self.reviews_count,
            years_active: self.years_active,
            services: self.services(),
        }
    }
}

/// Fields for a new lead
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub website: String,
    pub city: String,
    pub business_name: Option<String>,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub years_active: Option<i64>,
}

/// Generated profile fields, already serialized for storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedFields {
    pub seo_title: String,
    pub seo_description: String,
    pub profile_content: String,
    pub faq_json: String,
    pub services_json: String,
    pub unique_features_json: String,
    pub facts_json: String,
    pub signals_json: String,
    pub schema_markup_json: String,
}

/// A single state transition applied to one lead
#[derive(Debug, Clone)]
pub enum LeadUpdate {
    /// pending -> scraped
    Scraped { text_content: String },
    /// pending -> failed
    ScrapeFailed { error: String },
    /// scraped -> processed
    Processed {
        fields: GeneratedFields,
        integrity: IntegrityResult,
        positions: Option<Vec<ComparativePosition>>,
    },
    /// scraped stays scraped, error recorded
    GenerationFailed { error: String },
}

/// A pipeline batch record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub stage: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub batch_size: i64,
    pub leads_processed: i64,
    pub leads_succeeded: i64,
    pub leads_failed: i64,
    pub errors_json: Option<String>,
}

impl PipelineRun {
    pub fn new(stage: &str, batch_size: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            stage: stage.to_string(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            batch_size: batch_size as i64,
            leads_processed: 0,
            leads_succeeded: 0,
            leads_failed: 0,
            errors_json: None,
        }
    }

    /// Close the run with its outcome
    pub fn finish(&mut self, status: RunStatus, succeeded: usize, failed: usize, errors: &[String]) {
        self.completed_at = Some(Utc::now().to_rfc3339());
        self.status = status.to_string();
        self.leads_processed = (succeeded + failed) as i64;
        self.leads_succeeded = succeeded as i64;
        self.leads_failed = failed as i64;
        self.errors_json = if errors.is_empty() {
            None
        } else {
            serde_json::to_string(errors).ok()
        };
    }
}

/// A logged integrity verdict
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IntegrityCheck {
    pub id: i64,
    pub lead_id: i64,
    pub source_hash: String,
    pub max_similarity: f64,
    pub status: String,
    pub rewrite_mode: String,
    pub worst_pair_json: Option<String>,
    pub checked_at: String,
}

/// Record store the pipeline works against
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Pending leads without stored text, ascending id
    async fn select_pending(&self, limit: usize) -> Result<Vec<LeadRecord>>;

    /// Scraped leads with stored text, ascending id
    async fn select_scraped(&self, limit: usize) -> Result<Vec<LeadRecord>>;

    /// Apply a transition. Returns false when the lead has already left the
    /// state the transition starts from.
    async fn update_lead(&self, id: i64, update: LeadUpdate) -> Result<bool>;

    async fn count_pending(&self) -> Result<usize>;

    async fn count_scraped(&self) -> Result<usize>;

    /// Reset every failed lead to pending. Returns the number reset.
    async fn reset_failed(&self) -> Result<usize>;

    /// Persist a finished batch record
    async fn record_run(&self, _run: &PipelineRun) -> Result<()> {
        Ok(())
    }
}

const PENDING_PREDICATE: &str =
    "(scrape_status IS NULL OR scrape_status = 'pending') AND text_content IS NULL";

const SCRAPED_PREDICATE: &str = "scrape_status = 'scraped' AND text_content IS NOT NULL";

/// Lead database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the lead database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Create database with path directly (without full config)
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        let db = Self::open(db_path).await?;

        // Auto-initialize schema if needed
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    async fn open(db_path: &std::path::Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='leads'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Lead Operations =====

    /// Insert a new pending lead, returning its id
    pub async fn insert_lead(&self, lead: &NewLead) -> Result<i64> {
        if lead.website.trim().is_empty() {
            return Err(Error::Validation("website is required".to_string()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO leads (website, city, business_name, address, rating, reviews_count, years_active, scrape_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(lead.website.trim())
        .bind(lead.city.trim())
        .bind(&lead.business_name)
        .bind(&lead.address)
        .bind(lead.rating)
        .bind(lead.reviews_count)
        .bind(lead.years_active)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get lead by ID
    pub async fn get_lead(&self, id: i64) -> Result<Option<LeadRecord>> {
        let lead = sqlx::query_as::<_, LeadRecord>("SELECT * FROM leads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lead)
    }

    /// List leads, optionally filtered by status
    pub async fn list_leads(&self, status: Option<LeadStatus>, limit: usize) -> Result<Vec<LeadRecord>> {
        let filter = match status {
            None => "1 = 1",
            Some(LeadStatus::Pending) => "(scrape_status IS NULL OR scrape_status = 'pending')",
            Some(LeadStatus::Scraped) => "scrape_status = 'scraped'",
            Some(LeadStatus::Processed) => "scrape_status = 'processed'",
            Some(LeadStatus::Failed) => "scrape_status = 'failed'",
        };
        let query = format!("SELECT * FROM leads WHERE {} ORDER BY id LIMIT ?", filter);
        let leads = sqlx::query_as::<_, LeadRecord>(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(leads)
    }

    async fn select_where(&self, predicate: &str, limit: usize) -> Result<Vec<LeadRecord>> {
        let query = format!("SELECT * FROM leads WHERE {} ORDER BY id ASC LIMIT ?", predicate);
        let leads = sqlx::query_as::<_, LeadRecord>(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(leads)
    }

    async fn count_where(&self, predicate: &str) -> Result<usize> {
        let query = format!("SELECT COUNT(*) FROM leads WHERE {}", predicate);
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count as usize)
    }

    async fn lead_exists(&self, id: i64) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM leads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn apply_update(&self, id: i64, update: LeadUpdate) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let rows = match update {
            LeadUpdate::Scraped { text_content } => sqlx::query(
                r#"
                UPDATE leads SET
                    text_content = ?,
                    scrape_status = 'scraped',
                    processing_error = NULL,
                    scraped_at = ?
                WHERE id = ? AND (scrape_status IS NULL OR scrape_status = 'pending')
                "#,
            )
            .bind(text_content)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected(),

            LeadUpdate::ScrapeFailed { error } => sqlx::query(
                r#"
                UPDATE leads SET
                    scrape_status = 'failed',
                    processing_error = ?,
                    retry_count = retry_count + 1,
                    scraped_at = ?
                WHERE id = ? AND (scrape_status IS NULL OR scrape_status = 'pending')
                "#,
            )
            .bind(error)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected(),

            LeadUpdate::GenerationFailed { error } => sqlx::query(
                "UPDATE leads SET processing_error = ? WHERE id = ? AND scrape_status = 'scraped'",
            )
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected(),

            LeadUpdate::Processed {
                fields,
                integrity,
                positions,
            } => {
                let integrity_json = serde_json::to_string(&integrity)?;
                let worst_pair_json = integrity
                    .worst_chunk_pair
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                let comparative_json = positions.as_ref().map(serde_json::to_string).transpose()?;

                let mut tx = self.pool.begin().await?;

                let rows = sqlx::query(
                    r#"
                    UPDATE leads SET
                        seo_title = ?,
                        seo_description = ?,
                        profile_content = ?,
                        faq_json = ?,
                        services_json = ?,
                        unique_features_json = ?,
                        facts_json = ?,
                        signals_json = ?,
                        schema_markup_json = ?,
                        integrity_json = ?,
                        comparative_json = COALESCE(?, comparative_json),
                        scrape_status = 'processed',
                        processing_error = NULL,
                        processed_at = ?
                    WHERE id = ? AND scrape_status = 'scraped'
                    "#,
                )
                .bind(&fields.seo_title)
                .bind(&fields.seo_description)
                .bind(&fields.profile_content)
                .bind(&fields.faq_json)
                .bind(&fields.services_json)
                .bind(&fields.unique_features_json)
                .bind(&fields.facts_json)
                .bind(&fields.signals_json)
                .bind(&fields.schema_markup_json)
                .bind(&integrity_json)
                .bind(comparative_json)
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if rows > 0 {
                    sqlx::query(
                        r#"
                        INSERT INTO integrity_checks (lead_id, source_hash, max_similarity, status, rewrite_mode, worst_pair_json, checked_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(id)
                    .bind(&integrity.source_hash)
                    .bind(integrity.max_similarity)
                    .bind(integrity.status.to_string())
                    .bind(integrity.rewrite_mode.to_string())
                    .bind(worst_pair_json)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                rows
            }
        };

        if rows > 0 {
            return Ok(true);
        }
        if self.lead_exists(id).await? {
            debug!(lead_id = id, "Lead already moved on, update skipped");
            Ok(false)
        } else {
            Err(Error::LeadNotFound(id))
        }
    }

    /// Integrity verdict history for a lead, newest first
    pub async fn list_integrity_checks(&self, lead_id: i64) -> Result<Vec<IntegrityCheck>> {
        let checks = sqlx::query_as::<_, IntegrityCheck>(
            "SELECT * FROM integrity_checks WHERE lead_id = ? ORDER BY id DESC",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(checks)
    }

    /// Replace the comparative positions attached to a lead
    pub async fn set_positions(&self, id: i64, positions: &[ComparativePosition]) -> Result<()> {
        let json = serde_json::to_string(positions)?;
        let result = sqlx::query("UPDATE leads SET comparative_json = ? WHERE id = ?")
            .bind(json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::LeadNotFound(id));
        }
        Ok(())
    }

    // ===== Pipeline Run Operations =====

    /// Get the most recent pipeline run
    pub async fn get_latest_run(&self) -> Result<Option<PipelineRun>> {
        let run = sqlx::query_as::<_, PipelineRun>(
            "SELECT * FROM pipeline_runs ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    // ===== Statistics =====

    /// Lead counts per status
    pub async fn get_pipeline_stats(&self) -> Result<PipelineStats> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN scrape_status IS NULL OR scrape_status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN scrape_status = 'scraped' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN scrape_status = 'processed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN scrape_status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN text_content IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN seo_title IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN json_extract(integrity_json, '$.status') = 'flagged' THEN 1 ELSE 0 END), 0)
            FROM leads
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PipelineStats {
            total: row.0 as usize,
            pending: row.1 as usize,
            scraped: row.2 as usize,
            processed: row.3 as usize,
            failed: row.4 as usize,
            with_content: row.5 as usize,
            with_seo: row.6 as usize,
            flagged: row.7 as usize,
        })
    }

    /// Estimated API spend from the run history
    pub async fn get_cost_estimate(&self, costs: &CostConfig) -> Result<CostEstimate> {
        let (succeeded, failed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(leads_succeeded), 0), COALESCE(SUM(leads_failed), 0)
            FROM pipeline_runs WHERE stage = 'scrape'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let generations = self.count_where("scrape_status = 'processed'").await?;

        Ok(CostEstimate::from_counts(
            succeeded as usize,
            failed as usize,
            generations,
            costs,
        ))
    }
}

#[async_trait]
impl LeadStore for MetaDb {
    async fn select_pending(&self, limit: usize) -> Result<Vec<LeadRecord>> {
        self.select_where(PENDING_PREDICATE, limit).await
    }

    async fn select_scraped(&self, limit: usize) -> Result<Vec<LeadRecord>> {
        self.select_where(SCRAPED_PREDICATE, limit).await
    }

    async fn update_lead(&self, id: i64, update: LeadUpdate) -> Result<bool> {
        self.apply_update(id, update).await
    }

    async fn count_pending(&self) -> Result<usize> {
        self.count_where(PENDING_PREDICATE).await
    }

    async fn count_scraped(&self) -> Result<usize> {
        self.count_where(SCRAPED_PREDICATE).await
    }

    async fn reset_failed(&self) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE leads SET
                scrape_status = 'pending',
                processing_error = NULL,
                retry_count = 0
            WHERE scrape_status = 'failed'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn record_run(&self, run: &PipelineRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, stage, started_at, completed_at, status, batch_size, leads_processed, leads_succeeded, leads_failed, errors_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                completed_at = excluded.completed_at,
                status = excluded.status,
                leads_processed = excluded.leads_processed,
                leads_succeeded = excluded.leads_succeeded,
                leads_failed = excluded.leads_failed,
                errors_json = excluded.errors_json
            "#,
        )
        .bind(&run.id)
        .bind(&run.stage)
        .bind(&run.started_at)
        .bind(&run.completed_at)
        .bind(&run.status)
        .bind(run.batch_size)
        .bind(run.leads_processed)
        .bind(run.leads_succeeded)
        .bind(run.leads_failed)
        .bind(&run.errors_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PeerSource for MetaDb {
    async fn query_peers(&self, scope: Scope, metric: Metric, filter: &PeerFilter) -> Result<Vec<f64>> {
        let column = match metric {
            Metric::Rating => "rating",
            Metric::Reviews => "reviews_count",
            Metric::YearsActive => "years_active",
        };

        let mut query = format!(
            "SELECT CAST({} AS REAL) FROM leads WHERE {} IS NOT NULL",
            column, column
        );
        let mut binds: Vec<String> = Vec::new();

        for place in [&filter.city, &filter.area].into_iter().flatten() {
            query.push_str(" AND address LIKE ?");
            binds.push(format!("%{}%", place));
        }
        if let Some(service) = &filter.service {
            query.push_str(" AND services_json LIKE ?");
            binds.push(format!("%{}%", service));
        }
        if filter.exclude_id.is_some() {
            query.push_str(" AND id != ?");
        }

        let mut query_builder = sqlx::query_scalar::<_, f64>(&query);
        for bind in binds {
            query_builder = query_builder.bind(bind);
        }
        if let Some(id) = filter.exclude_id {
            query_builder = query_builder.bind(id);
        }

        let values = query_builder.fetch_all(&self.pool).await?;
        debug!(%scope, %metric, count = values.len(), "Fetched peer values");
        Ok(values)
    }
}

/// Lead counts per pipeline state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub pending: usize,
    pub scraped: usize,
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
    pub with_content: usize,
    pub with_seo: usize,
    pub flagged: usize,
}

impl PipelineStats {
    /// Percent of all leads that are processed
    pub fn completion_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        (self.processed as f64 / self.total as f64 * 100.0).round() as u8
    }
}

/// Estimated external API spend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total_scrapes: usize,
    pub successful_scrapes: usize,
    pub failed_scrapes: usize,
    pub generations: usize,
    pub scrape_cost: f64,
    pub generation_cost: f64,
    pub total_cost: f64,
    pub success_rate: u8,
}

impl CostEstimate {
    pub fn from_counts(successful: usize, failed: usize, generations: usize, costs: &CostConfig) -> Self {
        let total = successful + failed;
        let scrape_cost = successful as f64 * costs.scrape_unit_cost;
        let generation_cost = generations as f64 * costs.generation_unit_cost;
        let success_rate = if total > 0 {
            (successful as f64 / total as f64 * 100.0).round() as u8
        } else {
            0
        };

        Self {
            total_scrapes: total,
            successful_scrapes: successful,
            failed_scrapes: failed,
            generations,
            scrape_cost,
            generation_cost,
            total_cost: scrape_cost + generation_cost,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::{IntegrityChecker, RewriteMode};
    use crate::positioning::position;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = MetaDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    fn lead(website: &str) -> NewLead {
        NewLead {
            website: website.to_string(),
            city: "Springfield".to_string(),
            ..Default::default()
        }
    }

    fn fields() -> GeneratedFields {
        GeneratedFields {
            seo_title: "Gentle Dentistry in Springfield".to_string(),
            seo_description: "Family dental care".to_string(),
            profile_content: "A welcoming practice.".to_string(),
            faq_json: "[]".to_string(),
            services_json: r#"["Implants","Whitening"]"#.to_string(),
            unique_features_json: "[]".to_string(),
            facts_json: r#"["Open since 1998"]"#.to_string(),
            signals_json: "[]".to_string(),
            schema_markup_json: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_lead_crud() {
        let (db, _tmp) = setup_test_db().await;

        let id = db.insert_lead(&lead("smile.example")).await.unwrap();
        let loaded = db.get_lead(id).await.unwrap().unwrap();
        assert_eq!(loaded.website, "smile.example");
        assert_eq!(loaded.status(), LeadStatus::Pending);
        assert_eq!(loaded.retry_count, 0);

        assert!(db.get_lead(id + 100).await.unwrap().is_none());
        assert!(matches!(
            db.insert_lead(&lead("  ")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_select_pending_order_and_null_status() {
        let (db, _tmp) = setup_test_db().await;

        let a = db.insert_lead(&lead("a.example")).await.unwrap();
        let b = db.insert_lead(&lead("b.example")).await.unwrap();
        let c = db.insert_lead(&lead("c.example")).await.unwrap();

        sqlx::query("UPDATE leads SET scrape_status = NULL WHERE id = ?")
            .bind(b)
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query("UPDATE leads SET text_content = 'cached' WHERE id = ?")
            .bind(c)
            .execute(&db.pool)
            .await
            .unwrap();

        let pending = db.select_pending(10).await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(pending[1].status(), LeadStatus::Pending);
        assert_eq!(db.count_pending().await.unwrap(), 2);

        assert_eq!(db.select_pending(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scrape_transitions() {
        let (db, _tmp) = setup_test_db().await;
        let ok = db.insert_lead(&lead("ok.example")).await.unwrap();
        let bad = db.insert_lead(&lead("bad.example")).await.unwrap();

        let applied = db
            .update_lead(ok, LeadUpdate::Scraped { text_content: "Welcome.".to_string() })
            .await
            .unwrap();
        assert!(applied);

        db.update_lead(bad, LeadUpdate::ScrapeFailed { error: "timeout".to_string() })
            .await
            .unwrap();

        let ok_lead = db.get_lead(ok).await.unwrap().unwrap();
        assert_eq!(ok_lead.status(), LeadStatus::Scraped);
        assert!(ok_lead.scraped_at.is_some());

        let bad_lead = db.get_lead(bad).await.unwrap().unwrap();
        assert_eq!(bad_lead.status(), LeadStatus::Failed);
        assert_eq!(bad_lead.retry_count, 1);
        assert_eq!(bad_lead.processing_error.as_deref(), Some("timeout"));

        assert_eq!(db.count_scraped().await.unwrap(), 1);
        assert_eq!(db.count_pending().await.unwrap(), 0);

        // A second scrape result for an already scraped lead is not applied
        let applied = db
            .update_lead(ok, LeadUpdate::ScrapeFailed { error: "late".to_string() })
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(db.get_lead(ok).await.unwrap().unwrap().status(), LeadStatus::Scraped);

        assert!(matches!(
            db.update_lead(999, LeadUpdate::Scraped { text_content: "x".to_string() }).await,
            Err(Error::LeadNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_processed_transition_logs_verdict() {
        let (db, _tmp) = setup_test_db().await;
        let id = db.insert_lead(&lead("done.example")).await.unwrap();
        db.update_lead(id, LeadUpdate::Scraped { text_content: "Source text here.".to_string() })
            .await
            .unwrap();

        db.update_lead(id, LeadUpdate::GenerationFailed { error: "429".to_string() })
            .await
            .unwrap();
        let still = db.get_lead(id).await.unwrap().unwrap();
        assert_eq!(still.status(), LeadStatus::Scraped);
        assert_eq!(still.processing_error.as_deref(), Some("429"));

        let integrity = IntegrityChecker::default()
            .check("Source text here.", "Fresh words entirely.", RewriteMode::ClinicalScope)
            .unwrap();
        let positions = vec![position(Scope::City, Metric::Rating, 4.7, &[])];

        db.update_lead(
            id,
            LeadUpdate::Processed {
                fields: fields(),
                integrity: integrity.clone(),
                positions: Some(positions.clone()),
            },
        )
        .await
        .unwrap();

        let done = db.get_lead(id).await.unwrap().unwrap();
        assert_eq!(done.status(), LeadStatus::Processed);
        assert!(done.processing_error.is_none());
        assert!(done.processed_at.is_some());
        assert_eq!(done.seo_title.as_deref(), Some("Gentle Dentistry in Springfield"));
        assert_eq!(done.services(), vec!["Implants", "Whitening"]);
        assert_eq!(done.integrity(), Some(integrity));
        assert_eq!(done.positions(), positions);

        let checks = db.list_integrity_checks(id).await.unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].rewrite_mode, "clinical_scope");
        assert_eq!(checks[0].status, "passed");

        assert_eq!(db.count_scraped().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_failed_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;
        let a = db.insert_lead(&lead("a.example")).await.unwrap();
        let b = db.insert_lead(&lead("b.example")).await.unwrap();
        for id in [a, b] {
            db.update_lead(id, LeadUpdate::ScrapeFailed { error: "dns".to_string() })
                .await
                .unwrap();
        }

        assert_eq!(db.reset_failed().await.unwrap(), 2);
        let after_once: Vec<_> = db.list_leads(None, 10).await.unwrap();
        assert_eq!(db.reset_failed().await.unwrap(), 0);
        let after_twice: Vec<_> = db.list_leads(None, 10).await.unwrap();

        for (x, y) in after_once.iter().zip(&after_twice) {
            assert_eq!(x.status(), LeadStatus::Pending);
            assert_eq!(x.retry_count, 0);
            assert!(x.processing_error.is_none());
            assert_eq!(x.status(), y.status());
            assert_eq!(x.retry_count, y.retry_count);
        }
        assert_eq!(db.count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stats_and_costs() {
        let (db, _tmp) = setup_test_db().await;
        let a = db.insert_lead(&lead("a.example")).await.unwrap();
        let b = db.insert_lead(&lead("b.example")).await.unwrap();
        db.insert_lead(&lead("c.example")).await.unwrap();

        db.update_lead(a, LeadUpdate::Scraped { text_content: "Text.".to_string() })
            .await
            .unwrap();
        db.update_lead(b, LeadUpdate::ScrapeFailed { error: "404".to_string() })
            .await
            .unwrap();

        let stats = db.get_pipeline_stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.scraped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.with_content, 1);
        assert_eq!(stats.completion_percent(), 0);

        let mut run = PipelineRun::new("scrape", 5);
        run.finish(RunStatus::Completed, 1, 1, &["404".to_string()]);
        db.record_run(&run).await.unwrap();

        let latest = db.get_latest_run().await.unwrap().unwrap();
        assert_eq!(latest.id, run.id);
        assert_eq!(latest.leads_processed, 2);

        let costs = db.get_cost_estimate(&CostConfig::default()).await.unwrap();
        assert_eq!(costs.total_scrapes, 2);
        assert_eq!(costs.success_rate, 50);
        assert!((costs.scrape_cost - 0.01).abs() < 1e-9);
        assert_eq!(costs.generations, 0);
    }

    #[test]
    fn test_cost_estimate_from_counts() {
        let estimate = CostEstimate::from_counts(90, 10, 40, &CostConfig::default());
        assert_eq!(estimate.total_scrapes, 100);
        assert_eq!(estimate.success_rate, 90);
        assert!((estimate.scrape_cost - 0.9).abs() < 1e-9);
        assert!((estimate.generation_cost - 0.2).abs() < 1e-9);
        assert!((estimate.total_cost - 1.1).abs() < 1e-9);

        assert_eq!(CostEstimate::from_counts(0, 0, 0, &CostConfig::default()).success_rate, 0);
    }

    #[tokio::test]
    async fn test_query_peers_filters() {
        let (db, _tmp) = setup_test_db().await;

        let mut subject_id = 0;
        for (i, address) in [
            "1 Main St, Springfield, IL",
            "2 Oak Ave, Springfield, IL",
            "3 Elm Rd, Shelbyville, IL",
            "4 Pine Ct, Springfield, IL",
        ]
        .iter()
        .enumerate()
        {
            let id = db
                .insert_lead(&NewLead {
                    website: format!("lead{}.example", i),
                    city: String::new(),
                    address: Some(address.to_string()),
                    rating: if i == 3 { None } else { Some(4.0 + i as f64 * 0.25) },
                    reviews_count: Some(10 * (i as i64 + 1)),
                    ..Default::default()
                })
                .await
                .unwrap();
            if i == 0 {
                subject_id = id;
            }
        }

        let filter = PeerFilter {
            city: Some("Springfield".to_string()),
            exclude_id: Some(subject_id),
            ..Default::default()
        };
        let mut ratings = db.query_peers(Scope::City, Metric::Rating, &filter).await.unwrap();
        ratings.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(ratings, vec![4.25]);

        let reviews = db.query_peers(Scope::City, Metric::Reviews, &filter).await.unwrap();
        assert_eq!(reviews.len(), 2);

        let everyone = db
            .query_peers(Scope::City, Metric::Reviews, &PeerFilter::default())
            .await
            .unwrap();
        assert_eq!(everyone.len(), 4);
    }

    #[tokio::test]
    async fn test_query_peers_by_service() {
        let (db, _tmp) = setup_test_db().await;
        let id = db
            .insert_lead(&NewLead {
                website: "implants.example".to_string(),
                years_active: Some(12),
                ..Default::default()
            })
            .await
            .unwrap();
        db.update_lead(id, LeadUpdate::Scraped { text_content: "Text.".to_string() })
            .await
            .unwrap();
        let integrity = IntegrityChecker::default()
            .check("Text.", "Other.", RewriteMode::PatientExperience)
            .unwrap();
        db.update_lead(
            id,
            LeadUpdate::Processed {
                fields: fields(),
                integrity,
                positions: None,
            },
        )
        .await
        .unwrap();

        let filter = PeerFilter {
            service: Some("implants".to_string()),
            ..Default::default()
        };
        let years = db
            .query_peers(Scope::ServiceCluster, Metric::YearsActive, &filter)
            .await
            .unwrap();
        assert_eq!(years, vec![12.0]);
    }
}
