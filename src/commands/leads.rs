//! Lead entry and inspection commands

use crate::error::{Error, Result};
use crate::integrity::IntegrityResult;
use crate::meta::{IntegrityCheck, LeadRecord, LeadStatus, MetaDb, NewLead};
use crate::positioning::ComparativePosition;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One line of the lead listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSummary {
    pub id: i64,
    pub website: String,
    pub business_name: Option<String>,
    pub city: String,
    pub status: LeadStatus,
    pub retry_count: i64,
    pub processing_error: Option<String>,
}

impl From<&LeadRecord> for LeadSummary {
    fn from(lead: &LeadRecord) -> Self {
        Self {
            id: lead.id,
            website: lead.website.clone(),
            business_name: lead.business_name.clone(),
            city: lead.city.clone(),
            status: lead.status(),
            retry_count: lead.retry_count,
            processing_error: lead.processing_error.clone(),
        }
    }
}

/// Full view of one lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadDetail {
    pub lead: LeadRecord,
    pub status: LeadStatus,
    pub integrity: Option<IntegrityResult>,
    pub positions: Vec<ComparativePosition>,
    pub integrity_checks: Vec<IntegrityCheck>,
}

/// Queue a new pending lead
pub async fn cmd_add_lead(db: &MetaDb, lead: NewLead) -> Result<LeadSummary> {
    let id = db.insert_lead(&lead).await?;
    info!(lead_id = id, website = %lead.website, "Added lead");

    let record = db.get_lead(id).await?.ok_or(Error::LeadNotFound(id))?;
    Ok(LeadSummary::from(&record))
}

/// List leads, optionally by status
pub async fn cmd_list_leads(db: &MetaDb, status: Option<LeadStatus>, limit: usize) -> Result<Vec<LeadSummary>> {
    let leads = db.list_leads(status, limit).await?;
    Ok(leads.iter().map(LeadSummary::from).collect())
}

/// Show one lead with its verdict history
pub async fn cmd_show_lead(db: &MetaDb, id: i64) -> Result<LeadDetail> {
    let lead = db.get_lead(id).await?.ok_or(Error::LeadNotFound(id))?;
    let integrity_checks = db.list_integrity_checks(id).await?;

    Ok(LeadDetail {
        status: lead.status(),
        integrity: lead.integrity(),
        positions: lead.positions(),
        integrity_checks,
        lead,
    })
}

pub fn print_leads(leads: &[LeadSummary]) {
    if leads.is_empty() {
        println!("No leads found. Use 'leadforge leads add <website>' to queue one.");
        return;
    }

    for lead in leads {
        println!(
            "#{:<5} {:<10} {}{}",
            lead.id,
            lead.status.to_string(),
            lead.website,
            lead.business_name
                .as_deref()
                .map(|n| format!(" ({})", n))
                .unwrap_or_default()
        );
        if let Some(error) = &lead.processing_error {
            println!("       ⚠ {} (retries: {})", error, lead.retry_count);
        }
    }
}

pub fn print_lead_detail(detail: &LeadDetail) {
    let lead = &detail.lead;
    println!("\n🏷  Lead #{}\n", lead.id);
    println!("Website: {}", lead.website);
    if let Some(name) = &lead.business_name {
        println!("Name: {}", name);
    }
    println!("Location: {}", lead.location());
    println!("Status: {}", detail.status);
    println!("Retries: {}", lead.retry_count);
    if let Some(error) = &lead.processing_error {
        println!("Last error: {}", error);
    }
    if let Some(text) = &lead.text_content {
        println!("Scraped text: {} chars", text.chars().count());
    }
    if let Some(title) = &lead.seo_title {
        println!("\nSEO title: {}", title);
    }
    if let Some(description) = &lead.seo_description {
        println!("SEO description: {}", description);
    }

    if let Some(integrity) = &detail.integrity {
        println!("\nIntegrity: {} (max similarity {:.3}, {})", integrity.status, integrity.max_similarity, integrity.rewrite_mode);
        if let Some(pair) = &integrity.worst_chunk_pair {
            println!("  Source:    {}", pair.source_chunk);
            println!("  Generated: {}", pair.generated_chunk);
        }
        println!("  Checks logged: {}", detail.integrity_checks.len());
    }

    if !detail.positions.is_empty() {
        println!("\nPositioning:");
        for position in &detail.positions {
            println!("  • {}", position.statement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("leads.db")).await.unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_add_list_show() {
        let (db, _tmp) = setup().await;

        let added = cmd_add_lead(
            &db,
            NewLead {
                website: " smile.example ".to_string(),
                business_name: Some("Smile Co".to_string()),
                rating: Some(4.9),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(added.website, "smile.example");
        assert_eq!(added.status, LeadStatus::Pending);

        let all = cmd_list_leads(&db, None, 10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(cmd_list_leads(&db, Some(LeadStatus::Failed), 10).await.unwrap().is_empty());

        let detail = cmd_show_lead(&db, added.id).await.unwrap();
        assert_eq!(detail.lead.rating, Some(4.9));
        assert!(detail.integrity.is_none());
        assert!(detail.integrity_checks.is_empty());
    }

    #[tokio::test]
    async fn test_show_missing_lead() {
        let (db, _tmp) = setup().await;
        assert!(matches!(cmd_show_lead(&db, 42).await, Err(Error::LeadNotFound(42))));
    }
}
