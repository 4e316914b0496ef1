//! Per-region, per-metric comparison of two snapshots.

use std::collections::{HashMap, HashSet};

use crate::types::{AnnotatedMetric, AnnotatedRecord, Direction, RegionRecord, Snapshot};

/// Annotates every record of `current` against its counterpart in `previous`.
///
/// Output order is `current`'s order. Regions missing from `previous` (or every
/// region on a first run) compare against a zero baseline and are tagged
/// [`Direction::Unchanged`].
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<AnnotatedRecord> {
    let lookup: HashMap<String, &RegionRecord> = previous
        .map(|snapshot| snapshot.iter().map(|r| (r.key(), r)).collect())
        .unwrap_or_default();

    current
        .iter()
        .map(|record| annotate(record, lookup.get(&record.key()).copied()))
        .collect()
}

fn annotate(record: &RegionRecord, previous: Option<&RegionRecord>) -> AnnotatedRecord {
    let metrics = record
        .metrics
        .iter()
        .map(|(name, value)| {
            let (baseline, direction) = match previous.and_then(|p| p.metrics.get(name)) {
                Some(before) => (before, Direction::between(before, value)),
                None => (0, Direction::Unchanged),
            };
            AnnotatedMetric {
                name: name.to_string(),
                value,
                baseline,
                direction,
            }
        })
        .collect();

    AnnotatedRecord {
        region: record.region.clone(),
        metrics,
        is_new: previous.is_none(),
        changed: previous != Some(record),
    }
}

/// Regions present in `previous` that no longer appear in `current`.
pub fn removed_regions(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<String> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let keys: HashSet<String> = current.iter().map(RegionRecord::key).collect();

    previous
        .iter()
        .filter(|r| !keys.contains(&r.key()))
        .map(|r| r.region.clone())
        .collect()
}

/// Whether `current` warrants a report: there is a baseline and it differs in any way.
pub fn needs_notification(previous: Option<&Snapshot>, current: &Snapshot) -> bool {
    previous.is_some_and(|previous| previous != current)
}
