use std::collections::HashSet;

use crate::normalize::{normalize_count, normalize_region, region_key};
use crate::source::{ParseError, RawRow};
use crate::types::{Metrics, RegionRecord, Snapshot};

/// Default floor below which an extraction is treated as markup drift.
pub const DEFAULT_MIN_REGIONS: usize = 10;

/// The source parsed, but not into something that can be trusted as a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum MalformedSource {
    #[error("Source could not be parsed: {0}")]
    Parse(#[from] ParseError),
    #[error("Only {found} region(s) extracted, expected at least {minimum}; the source layout may have changed")]
    TooFewRegions { found: usize, minimum: usize },
}

/// Which raw columns hold the region name and each metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub region: usize,
    /// Metrics in output order. The first one is the sort key.
    pub metrics: Vec<(String, usize)>,
}

impl ColumnMapping {
    pub fn new<N: Into<String>>(
        region: usize,
        metrics: impl IntoIterator<Item = (N, usize)>,
    ) -> Self {
        Self {
            region,
            metrics: metrics
                .into_iter()
                .map(|(name, column)| (name.into(), column))
                .collect(),
        }
    }

    pub fn primary_metric(&self) -> Option<&str> {
        self.metrics.first().map(|(name, _)| name.as_str())
    }
}

/// Normalizes raw rows into a snapshot sorted by the primary metric, largest first.
///
/// Rows without a usable region name are dropped. When two rows fold to the same
/// region, the first one wins.
pub fn build(rows: Vec<RawRow>, mapping: &ColumnMapping) -> Snapshot {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(region) = row.get(mapping.region).and_then(|raw| normalize_region(raw)) else {
            log::debug!("Dropping row without a region: {:?}", row);
            continue;
        };

        if !seen.insert(region_key(&region)) {
            log::warn!("Duplicate region '{}' in source, keeping the first row", region);
            continue;
        }

        let metrics: Metrics = mapping
            .metrics
            .iter()
            .map(|(name, column)| {
                let value = row.get(*column).map_or(0, |raw| normalize_count(raw));
                (name.as_str(), value)
            })
            .collect();

        records.push(RegionRecord::new(region, metrics));
    }

    if let Some(primary) = mapping.primary_metric() {
        // Stable: equal values keep source order.
        records.sort_by(|a, b| b.metric(primary).cmp(&a.metric(primary)));
    }

    Snapshot::new(records)
}

/// Rejects snapshots that are too small to be a real extraction.
pub fn ensure_min_regions(snapshot: &Snapshot, minimum: usize) -> Result<(), MalformedSource> {
    if snapshot.len() < minimum {
        return Err(MalformedSource::TooFewRegions {
            found: snapshot.len(),
            minimum,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping::new(0, [("cases", 1), ("death", 2)])
    }

    fn regions(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|r| r.region.as_str()).collect()
    }

    #[test]
    fn test_build_sorts_descending_by_cases() {
        let rows = vec![
            row(&["Japan", "20", "0"]),
            row(&["Mainland China", "14,380", "304"]),
            row(&["Thailand", "19", "0"]),
        ];

        let snapshot = build(rows, &mapping());

        assert_eq!(regions(&snapshot), vec!["China", "Japan", "Thailand"]);
        assert_eq!(snapshot.records()[0].metric("cases"), 14380);
        assert_eq!(snapshot.records()[0].metric("death"), 304);
    }

    #[test]
    fn test_build_sort_is_stable_for_equal_cases() {
        let rows = vec![
            row(&["Hong Kong", "15", "0"]),
            row(&["Singapore", "18", "0"]),
            row(&["South Korea", "15", "0"]),
            row(&["Australia", "15", "0"]),
        ];

        let snapshot = build(rows, &mapping());

        assert_eq!(
            regions(&snapshot),
            vec!["Singapore", "Hong Kong", "South Korea", "Australia"]
        );
    }

    #[test]
    fn test_build_drops_rows_without_region() {
        let rows = vec![
            row(&["", "5", "0"]),
            row(&["   ", "6", "1"]),
            row(&["Italy", "2", "0"]),
        ];

        let snapshot = build(rows, &mapping());

        assert_eq!(regions(&snapshot), vec!["Italy"]);
    }

    #[test]
    fn test_build_missing_cells_read_as_zero() {
        let snapshot = build(vec![row(&["Vietnam", "7*"])], &mapping());

        let vietnam = &snapshot.records()[0];
        assert_eq!(vietnam.metric("cases"), 7);
        assert_eq!(vietnam.metrics.get("death"), Some(0));
    }

    #[test]
    fn test_build_keeps_first_of_folded_duplicates() {
        let rows = vec![
            row(&["Mainland China", "100", "3"]),
            row(&["China (total)", "120", "4"]),
        ];

        let snapshot = build(rows, &mapping());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records()[0].metric("cases"), 100);
    }

    #[test]
    fn test_build_with_cured_column() {
        let mapping = ColumnMapping::new(0, [("cases", 1), ("death", 2), ("cured", 3)]);
        let snapshot = build(vec![row(&["Japan", "20", "0", "1"])], &mapping);

        let names: Vec<&str> = snapshot.records()[0].metrics.names().collect();
        assert_eq!(names, vec!["cases", "death", "cured"]);
    }

    #[test]
    fn test_guard_rejects_small_snapshot() {
        let rows = vec![
            row(&["China", "3", "0"]),
            row(&["Japan", "2", "0"]),
            row(&["Italy", "1", "0"]),
        ];
        let snapshot = build(rows, &mapping());

        let err = ensure_min_regions(&snapshot, DEFAULT_MIN_REGIONS).unwrap_err();
        assert!(matches!(
            err,
            MalformedSource::TooFewRegions {
                found: 3,
                minimum: 10
            }
        ));
    }

    #[test]
    fn test_guard_accepts_snapshot_at_threshold() {
        let rows = (0..10)
            .map(|i| {
                let name = format!("Region {}", i);
                row(&[name.as_str(), "1", "0"])
            })
            .collect();
        let snapshot = build(rows, &mapping());

        assert!(ensure_min_regions(&snapshot, 10).is_ok());
    }
}
