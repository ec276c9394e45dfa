//! Percentile rank of a subject within a peer sample

/// Percent of peers strictly below the subject, rounded half away from zero.
///
/// Peers equal to the subject do not count as below it. Returns `None` for
/// an empty sample.
pub fn percentile(subject: f64, peers: &[f64]) -> Option<u8> {
    if peers.is_empty() {
        return None;
    }
    let below = peers.iter().filter(|&&p| p < subject).count();
    let pct = (100.0 * below as f64 / peers.len() as f64).round();
    Some(pct.clamp(0.0, 100.0) as u8)
}

/// Qualitative label for a percentile
pub fn percentile_label(percentile: u8) -> &'static str {
    if percentile >= 90 {
        "top 10%"
    } else if percentile >= 75 {
        "top 25%"
    } else if percentile >= 50 {
        "above average"
    } else {
        "competitive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_strictly_below() {
        assert_eq!(percentile(3.0, &[1.0, 2.0, 3.0, 4.0, 5.0]), Some(40));
    }

    #[test]
    fn test_percentile_ties_not_below() {
        assert_eq!(percentile(4.5, &[4.5, 4.5, 4.5, 4.5]), Some(0));
        assert_eq!(percentile(5.0, &[4.5, 4.5, 5.0, 5.0]), Some(50));
    }

    #[test]
    fn test_percentile_bounds() {
        assert_eq!(percentile(0.0, &[1.0, 2.0]), Some(0));
        assert_eq!(percentile(9.0, &[1.0, 2.0]), Some(100));
        assert_eq!(percentile(1.0, &[]), None);
    }

    #[test]
    fn test_percentile_rounds() {
        // 1/3 = 33.3, 2/3 = 66.7
        assert_eq!(percentile(2.0, &[1.0, 2.0, 3.0]), Some(33));
        assert_eq!(percentile(3.0, &[1.0, 2.0, 3.0]), Some(67));
        // 1/8 = 12.5 rounds up
        let peers = [1.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        assert_eq!(percentile(2.0, &peers), Some(13));
    }

    #[test]
    fn test_labels() {
        assert_eq!(percentile_label(100), "top 10%");
        assert_eq!(percentile_label(90), "top 10%");
        assert_eq!(percentile_label(89), "top 25%");
        assert_eq!(percentile_label(75), "top 25%");
        assert_eq!(percentile_label(74), "above average");
        assert_eq!(percentile_label(50), "above average");
        assert_eq!(percentile_label(49), "competitive");
        assert_eq!(percentile_label(0), "competitive");
    }
}
