use std::fmt::{self, Display};

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::normalize::{normalize_count, region_key};

/// Metric every snapshot is sorted by.
pub const PRIMARY_METRIC: &str = "cases";

/// Ordered metric name → count mapping of a single region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics(Vec<(String, u64)>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, keeping the original position when the metric already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: u64) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, u64)> for Metrics {
    fn from_iter<I: IntoIterator<Item = (N, u64)>>(iter: I) -> Self {
        let mut metrics = Metrics::new();
        for (name, value) in iter {
            metrics.insert(name, value);
        }
        metrics
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRecord {
    pub region: String,
    pub metrics: Metrics,
}

impl RegionRecord {
    pub fn new(region: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            region: region.into(),
            metrics,
        }
    }

    /// Case-folded identity used to match records across snapshots.
    pub fn key(&self) -> String {
        region_key(&self.region)
    }

    /// Value of `name`, reading an absent metric as zero.
    pub fn metric(&self, name: &str) -> u64 {
        self.metrics.get(name).unwrap_or(0)
    }
}

// Written as a flat object: `region` first, then each metric in order.
impl Serialize for RegionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.metrics.len() + 1))?;
        map.serialize_entry("region", &self.region)?;
        for (name, value) in self.metrics.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RegionRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RegionRecordVisitor)
    }
}

struct RegionRecordVisitor;

impl<'de> Visitor<'de> for RegionRecordVisitor {
    type Value = RegionRecord;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object with a `region` key and numeric metrics")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut region: Option<String> = None;
        let mut metrics = Metrics::new();

        while let Some(key) = map.next_key::<String>()? {
            if key == "region" {
                if region.is_some() {
                    return Err(de::Error::duplicate_field("region"));
                }
                region = Some(map.next_value()?);
            } else {
                let Count(value) = map.next_value()?;
                metrics.insert(key, value);
            }
        }

        let region = region.ok_or_else(|| de::Error::missing_field("region"))?;
        Ok(RegionRecord { region, metrics })
    }
}

/// A stored metric value. Older artifacts kept counts as strings such as `"1,234"`.
struct Count(u64);

impl<'de> Deserialize<'de> for Count {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountVisitor;

        impl Visitor<'_> for CountVisitor {
            type Value = Count;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer or a numeric string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Count, E> {
                Ok(Count(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Count, E> {
                u64::try_from(v)
                    .map(Count)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Count, E> {
                Ok(Count(normalize_count(v)))
            }
        }

        deserializer.deserialize_any(CountVisitor)
    }
}

/// Regions from one fetch cycle, ordered as built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: Vec<RegionRecord>,
}

impl Snapshot {
    /// Wraps records as-is. Use [`crate::builder::build`] for sorted, normalized snapshots.
    pub fn new(records: Vec<RegionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RegionRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, region: &str) -> Option<&RegionRecord> {
        let key = region_key(region);
        self.records.iter().find(|r| r.key() == key)
    }

    /// Sum of `metric` over every region.
    pub fn total(&self, metric: &str) -> u64 {
        self.records.iter().map(|r| r.metric(metric)).sum()
    }
}

/// Order-of-magnitude bucket used to shade a region on the map: the smallest
/// `i` in `1..=5` with `cases <= 10^i`. Larger outbreaks are left unshaded.
pub fn severity_tier(cases: u64) -> Option<u8> {
    (1..=5u8).find(|&i| cases <= 10u64.pow(u32::from(i)))
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a RegionRecord;
    type IntoIter = std::slice::Iter<'a, RegionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increased,
    Decreased,
    Unchanged,
}

impl Direction {
    pub fn between(baseline: u64, value: u64) -> Self {
        match value.cmp(&baseline) {
            std::cmp::Ordering::Greater => Direction::Increased,
            std::cmp::Ordering::Less => Direction::Decreased,
            std::cmp::Ordering::Equal => Direction::Unchanged,
        }
    }

    /// Marker appended to a value in reports.
    pub fn suffix(&self) -> &'static str {
        match self {
            Direction::Increased => "+",
            Direction::Decreased => "-",
            Direction::Unchanged => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedMetric {
    pub name: String,
    pub value: u64,
    pub baseline: u64,
    pub direction: Direction,
}

impl Display for AnnotatedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.direction.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedRecord {
    pub region: String,
    pub metrics: Vec<AnnotatedMetric>,
    /// Region had no counterpart in the previous snapshot.
    pub is_new: bool,
    /// Record differs from its previous counterpart in any field, or is new.
    pub changed: bool,
}

impl AnnotatedRecord {
    pub fn metric(&self, name: &str) -> Option<&AnnotatedMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(region: &str, cases: u64, death: u64) -> RegionRecord {
        RegionRecord::new(
            region,
            Metrics::from_iter([("cases", cases), ("death", death)]),
        )
    }

    #[test]
    fn test_record_serializes_region_first_then_metrics_in_order() {
        let snapshot = Snapshot::new(vec![record("China", 14411, 304)]);
        let json = serde_json::to_string(&snapshot).expect("serialize");
        assert_eq!(json, r#"[{"region":"China","cases":14411,"death":304}]"#);
    }

    #[test]
    fn test_snapshot_json_round_trip_keeps_metric_order() {
        let metrics = Metrics::from_iter([("cases", 12), ("death", 1), ("cured", 4)]);
        let snapshot = Snapshot::new(vec![RegionRecord::new("Japan", metrics)]);

        let json = serde_json::to_string(&snapshot).expect("serialize");
        let back: Snapshot = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back, snapshot);
        let names: Vec<&str> = back.records()[0].metrics.names().collect();
        assert_eq!(names, vec!["cases", "death", "cured"]);
    }

    #[test]
    fn test_legacy_string_counts_are_normalized() {
        let json = r#"[{"region":"Thailand","cases":"1,025","death":" 7* "}]"#;
        let snapshot: Snapshot = serde_json::from_str(json).expect("deserialize");
        assert_eq!(snapshot.records()[0], record("Thailand", 1025, 7));
    }

    #[test]
    fn test_record_without_region_is_rejected() {
        let err = serde_json::from_str::<Snapshot>(r#"[{"cases":3}]"#).unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_negative_count_is_rejected() {
        assert!(serde_json::from_str::<Snapshot>(r#"[{"region":"X","cases":-3}]"#).is_err());
    }

    #[test]
    fn test_metrics_insert_replaces_in_place() {
        let mut metrics = Metrics::from_iter([("cases", 1), ("death", 2)]);
        metrics.insert("cases", 5);
        assert_eq!(
            metrics.iter().collect::<Vec<_>>(),
            vec![("cases", 5), ("death", 2)]
        );
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let snapshot = Snapshot::new(vec![record("South Korea", 23, 0)]);
        assert!(snapshot.find("south korea").is_some());
        assert_eq!(snapshot.total("cases"), 23);
    }

    #[test]
    fn test_severity_tier_buckets() {
        assert_eq!(severity_tier(0), Some(1));
        assert_eq!(severity_tier(10), Some(1));
        assert_eq!(severity_tier(11), Some(2));
        assert_eq!(severity_tier(14_380), Some(5));
        assert_eq!(severity_tier(100_000), Some(5));
        assert_eq!(severity_tier(100_001), None);
    }

    #[test]
    fn test_direction_between() {
        assert_eq!(Direction::between(10, 15), Direction::Increased);
        assert_eq!(Direction::between(10, 5), Direction::Decreased);
        assert_eq!(Direction::between(10, 10), Direction::Unchanged);
        assert_eq!(Direction::Increased.suffix(), "+");
        assert_eq!(Direction::Unchanged.suffix(), "");
    }
}
