//! Comparative positioning
//!
//! Turns a business's own metrics into statements about where it stands
//! among its peers. Percentile claims are only made when the peer sample is
//! large enough for the scope; otherwise the statement falls back to the
//! subject's own value and makes no comparison.

mod percentile;

pub use percentile::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

/// Population a subject is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    City,
    Neighborhood,
    ServiceCluster,
}

impl Scope {
    /// Minimum peer sample size for a percentile claim
    pub fn min_peers(&self) -> usize {
        match self {
            Scope::City => 50,
            Scope::Neighborhood => 25,
            Scope::ServiceCluster => 30,
        }
    }

    /// Phrase used in rendered statements
    pub fn phrase(&self) -> &'static str {
        match self {
            Scope::City => "city-wide",
            Scope::Neighborhood => "neighborhood",
            Scope::ServiceCluster => "category",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::City => write!(f, "city"),
            Scope::Neighborhood => write!(f, "neighborhood"),
            Scope::ServiceCluster => write!(f, "service_cluster"),
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "city" => Ok(Scope::City),
            "neighborhood" => Ok(Scope::Neighborhood),
            "service_cluster" => Ok(Scope::ServiceCluster),
            _ => Err(Error::Validation(format!("Unknown scope: {}", s))),
        }
    }
}

/// Metric a subject is ranked on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Rating,
    Reviews,
    YearsActive,
}

impl Metric {
    /// The subject's own value for this metric, if known
    pub fn value_of(&self, subject: &Subject) -> Option<f64> {
        match self {
            Metric::Rating => subject.rating,
            Metric::Reviews => subject.reviews_count.map(|v| v as f64),
            Metric::YearsActive => subject.years_active.map(|v| v as f64),
        }
    }

    /// Statement made when the peer sample supports a percentile
    pub fn ranked_statement(&self, percentile: u8, scope: Scope, peer_count: usize) -> String {
        let label = percentile_label(percentile);
        let scope = scope.phrase();
        match self {
            Metric::Rating => format!(
                "Ranks in the {} for patient ratings {} (compared to {} practices).",
                label, scope, peer_count
            ),
            Metric::Reviews => format!(
                "Has {} review volume {} (among {} practices).",
                label, scope, peer_count
            ),
            Metric::YearsActive => format!(
                "Among the most established practices {} ({} for longevity among {} practices).",
                scope, label, peer_count
            ),
        }
    }

    /// Statement built from the subject's own value only
    pub fn fallback_statement(&self, value: f64) -> String {
        match self {
            Metric::Rating => format!(
                "Maintains a {:.1}-star rating, reflecting consistent patient satisfaction.",
                value
            ),
            Metric::Reviews => format!(
                "Has received {} patient reviews, demonstrating established community presence.",
                value.round() as i64
            ),
            Metric::YearsActive => {
                let years = value.round() as i64;
                let unit = if years == 1 { "year" } else { "years" };
                format!("Has been serving the community for {} {}.", years, unit)
            }
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Rating => write!(f, "rating"),
            Metric::Reviews => write!(f, "reviews"),
            Metric::YearsActive => write!(f, "years_active"),
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rating" => Ok(Metric::Rating),
            "reviews" => Ok(Metric::Reviews),
            "years_active" => Ok(Metric::YearsActive),
            _ => Err(Error::Validation(format!("Unknown metric: {}", s))),
        }
    }
}

/// A rendered comparative claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativePosition {
    pub scope: Scope,
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile: Option<u8>,
    pub peer_count: usize,
    pub statement: String,
    pub threshold_met: bool,
}

/// Position a subject value within a peer sample.
///
/// A percentile is only computed when the sample meets the scope's minimum.
pub fn position(scope: Scope, metric: Metric, subject_value: f64, peers: &[f64]) -> ComparativePosition {
    let peer_count = peers.len();
    let ranked = if peer_count >= scope.min_peers() {
        percentile(subject_value, peers)
    } else {
        None
    };

    match ranked {
        Some(pct) => ComparativePosition {
            scope,
            metric,
            percentile: Some(pct),
            peer_count,
            statement: metric.ranked_statement(pct, scope, peer_count),
            threshold_met: true,
        },
        None => ComparativePosition {
            scope,
            metric,
            percentile: None,
            peer_count,
            statement: metric.fallback_statement(subject_value),
            threshold_met: false,
        },
    }
}

/// The business being positioned
#[derive(Debug, Clone, Default)]
pub struct Subject {
    /// Store id, excluded from its own peer sample
    pub id: Option<i64>,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub years_active: Option<i64>,
    pub services: Vec<String>,
}

/// Peer selection criteria handed to a [`PeerSource`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerFilter {
    /// Address must mention this city
    pub city: Option<String>,
    /// Address must mention this area
    pub area: Option<String>,
    /// Listed services must include this one
    pub service: Option<String>,
    /// Record to leave out of the sample
    pub exclude_id: Option<i64>,
}

impl PeerFilter {
    /// Build the filter for a scope.
    ///
    /// City scope narrows by the city found in the subject's address and
    /// uses the whole population when none is found. Neighborhood scope needs
    /// an area and service-cluster scope needs a service (explicit or the
    /// subject's first listed one).
    pub fn for_scope(
        scope: Scope,
        subject: &Subject,
        area: Option<&str>,
        service: Option<&str>,
    ) -> Result<Self> {
        let mut filter = PeerFilter {
            exclude_id: subject.id,
            ..Default::default()
        };

        match scope {
            Scope::City => {
                filter.city = subject.address.as_deref().and_then(extract_city);
                if filter.city.is_none() {
                    debug!("No city in address, comparing against all leads");
                }
            }
            Scope::Neighborhood => {
                let area = area
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| Error::Validation("neighborhood scope requires an area".to_string()))?;
                filter.area = Some(area.to_string());
            }
            Scope::ServiceCluster => {
                let service = service
                    .map(str::to_string)
                    .or_else(|| subject.services.first().cloned())
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| {
                        Error::Validation("service_cluster scope requires a service".to_string())
                    })?;
                filter.service = Some(service.trim().to_string());
            }
        }

        Ok(filter)
    }
}

fn city_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([^,]+),?\s*[A-Z]{2}").expect("static regex"))
}

/// Pull a city out of a `"street, City, ST zip"` style address.
///
/// This is a heuristic, not geocoding: addresses without a recognizable
/// `", City, ST"` fragment yield `None`.
pub fn extract_city(address: &str) -> Option<String> {
    city_re()
        .captures(address)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Peer metric lookup
#[async_trait]
pub trait PeerSource: Send + Sync {
    /// Non-null values of `metric` for the peers selected by `filter`
    async fn query_peers(&self, scope: Scope, metric: Metric, filter: &PeerFilter) -> Result<Vec<f64>>;
}

/// Position a subject on each metric it has a value for
pub async fn compute_positions(
    source: &dyn PeerSource,
    scope: Scope,
    metrics: &[Metric],
    subject: &Subject,
    filter: &PeerFilter,
) -> Result<Vec<ComparativePosition>> {
    let mut positions = Vec::with_capacity(metrics.len());

    for &metric in metrics {
        let Some(value) = metric.value_of(subject) else {
            debug!(%metric, "Subject has no value, skipping");
            continue;
        };
        let peers = source.query_peers(scope, metric, filter).await?;
        debug!(%scope, %metric, peers = peers.len(), min = scope.min_peers(), "Peer sample");
        positions.push(position(scope, metric, value, &peers));
    }

    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedPeers {
        values: Vec<f64>,
        seen: Mutex<Vec<PeerFilter>>,
    }

    #[async_trait]
    impl PeerSource for FixedPeers {
        async fn query_peers(&self, _scope: Scope, _metric: Metric, filter: &PeerFilter) -> Result<Vec<f64>> {
            self.seen.lock().unwrap().push(filter.clone());
            Ok(self.values.clone())
        }
    }

    #[test]
    fn test_city_below_threshold_falls_back() {
        let peers: Vec<f64> = (1..=10).map(|v| v as f64 / 2.0).collect();
        let pos = position(Scope::City, Metric::Rating, 4.8, &peers);

        assert!(!pos.threshold_met);
        assert_eq!(pos.percentile, None);
        assert_eq!(pos.peer_count, 10);
        assert!(pos.statement.contains("4.8"), "{}", pos.statement);
    }

    #[test]
    fn test_city_top_decile() {
        let peers: Vec<f64> = (1..=60).map(|v| v as f64).collect();
        let pos = position(Scope::City, Metric::Reviews, 59.5, &peers);

        assert!(pos.threshold_met);
        assert_eq!(pos.percentile, Some(98));
        assert!(pos.statement.contains("top 10%"));
        assert!(pos.statement.contains("city-wide"));
        assert!(pos.statement.contains("60"));
    }

    #[test]
    fn test_threshold_per_scope() {
        let peers: Vec<f64> = (0..25).map(|v| v as f64).collect();
        assert!(position(Scope::Neighborhood, Metric::Rating, 3.0, &peers).threshold_met);
        assert!(!position(Scope::ServiceCluster, Metric::Rating, 3.0, &peers).threshold_met);
        assert!(!position(Scope::City, Metric::Rating, 3.0, &peers).threshold_met);
    }

    #[test]
    fn test_percentile_present_iff_threshold_met() {
        for n in [0usize, 1, 29, 30, 31, 80] {
            let peers: Vec<f64> = (0..n).map(|v| v as f64).collect();
            let pos = position(Scope::ServiceCluster, Metric::YearsActive, 12.0, &peers);
            assert_eq!(pos.percentile.is_some(), pos.threshold_met);
            assert_eq!(pos.threshold_met, n >= 30);
        }
    }

    #[test]
    fn test_fallback_statements() {
        assert_eq!(
            Metric::Reviews.fallback_statement(132.0),
            "Has received 132 patient reviews, demonstrating established community presence."
        );
        assert_eq!(
            Metric::YearsActive.fallback_statement(12.0),
            "Has been serving the community for 12 years."
        );
        assert!(Metric::Rating.fallback_statement(5.0).contains("5.0-star"));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!("city".parse::<Scope>().unwrap(), Scope::City);
        assert_eq!("service_cluster".parse::<Scope>().unwrap(), Scope::ServiceCluster);
        assert!(matches!("county".parse::<Scope>(), Err(Error::Validation(_))));
        assert_eq!("years_active".parse::<Metric>().unwrap(), Metric::YearsActive);
        assert!(matches!("smiles".parse::<Metric>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_extract_city() {
        assert_eq!(
            extract_city("123 Main St, Springfield, IL 62701"),
            Some("Springfield".to_string())
        );
        assert_eq!(
            extract_city("9 Elm Ave, Suite 4, Portland OR"),
            Some("Suite 4".to_string())
        );
        assert_eq!(extract_city("Somewhere downtown"), None);
        assert_eq!(extract_city("12 Oak Rd, springfield, il"), None);
    }

    #[test]
    fn test_filter_for_scope() {
        let subject = Subject {
            id: Some(7),
            address: Some("1 Pine St, Austin, TX 78701".to_string()),
            services: vec!["Implants".to_string()],
            ..Default::default()
        };

        let city = PeerFilter::for_scope(Scope::City, &subject, None, None).unwrap();
        assert_eq!(city.city.as_deref(), Some("Austin"));
        assert_eq!(city.exclude_id, Some(7));

        let cluster = PeerFilter::for_scope(Scope::ServiceCluster, &subject, None, None).unwrap();
        assert_eq!(cluster.service.as_deref(), Some("Implants"));

        assert!(PeerFilter::for_scope(Scope::Neighborhood, &subject, None, None).is_err());
        let hood = PeerFilter::for_scope(Scope::Neighborhood, &subject, Some("Zilker"), None).unwrap();
        assert_eq!(hood.area.as_deref(), Some("Zilker"));

        let unmatched = Subject {
            address: Some("rural route".to_string()),
            ..Default::default()
        };
        let all = PeerFilter::for_scope(Scope::City, &unmatched, None, None).unwrap();
        assert_eq!(all, PeerFilter::default());
    }

    #[tokio::test]
    async fn test_compute_positions_skips_missing_values() {
        let source = FixedPeers {
            values: (1..=60).map(|v| v as f64 / 12.0).collect(),
            seen: Mutex::new(Vec::new()),
        };
        let subject = Subject {
            id: Some(1),
            rating: Some(4.9),
            ..Default::default()
        };
        let filter = PeerFilter::for_scope(Scope::City, &subject, None, None).unwrap();

        let positions = compute_positions(
            &source,
            Scope::City,
            &[Metric::Rating, Metric::Reviews],
            &subject,
            &filter,
        )
        .await
        .unwrap();

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].metric, Metric::Rating);
        assert!(positions[0].threshold_met);
        assert_eq!(source.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_serialized_shape() {
        let pos = position(Scope::City, Metric::Rating, 4.5, &[]);
        let json = serde_json::to_value(&pos).unwrap();
        assert_eq!(json["scope"], "city");
        assert_eq!(json["metric"], "rating");
        assert!(json.get("percentile").is_none());
        assert_eq!(json["threshold_met"], false);
    }
}
