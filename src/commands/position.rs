//! On-demand comparative positioning for one lead

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::positioning::{compute_positions, ComparativePosition, Metric, PeerFilter, Scope};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Options for the position command
#[derive(Debug, Clone, Default)]
pub struct PositionOptions {
    /// Defaults to `positioning.scope`
    pub scope: Option<Scope>,
    /// Defaults to `positioning.metrics`
    pub metrics: Vec<Metric>,
    /// Required for neighborhood scope
    pub area: Option<String>,
    /// Service-cluster scope falls back to the lead's first service
    pub service: Option<String>,
    /// Store the result on the lead
    pub save: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub lead_id: i64,
    pub scope: Scope,
    pub positions: Vec<ComparativePosition>,
    pub saved: bool,
}

pub async fn cmd_position(
    config: &Config,
    db: &MetaDb,
    lead_id: i64,
    options: PositionOptions,
) -> Result<PositionReport> {
    let lead = db.get_lead(lead_id).await?.ok_or(Error::LeadNotFound(lead_id))?;

    let (default_scope, default_metrics) = config.positioning_targets()?;
    let scope = options.scope.unwrap_or(default_scope);
    let metrics = if options.metrics.is_empty() {
        default_metrics
    } else {
        options.metrics
    };

    let subject = lead.subject();
    let filter = PeerFilter::for_scope(
        scope,
        &subject,
        options.area.as_deref(),
        options.service.as_deref(),
    )?;

    let positions = compute_positions(db, scope, &metrics, &subject, &filter).await?;
    info!(lead_id, %scope, count = positions.len(), "Computed positions");

    if options.save {
        db.set_positions(lead_id, &positions).await?;
    }

    Ok(PositionReport {
        lead_id,
        scope,
        positions,
        saved: options.save,
    })
}

pub fn print_positions(report: &PositionReport) {
    println!("\n📍 Lead #{} ({} scope)\n", report.lead_id, report.scope);

    if report.positions.is_empty() {
        println!("No metrics available for this lead.");
        return;
    }

    for position in &report.positions {
        let detail = match position.percentile {
            Some(pct) => format!("{}th percentile of {} peers", pct, position.peer_count),
            None => format!(
                "{} peers, below the {} needed to compare",
                position.peer_count,
                position.scope.min_peers()
            ),
        };
        println!("• [{}] {}", position.metric, position.statement);
        println!("  {}", detail);
    }

    if report.saved {
        println!("\n✓ Saved to lead");
    }
}
