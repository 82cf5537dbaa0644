//! Type filtering and row normalization.
//!
//! Records are filtered lazily and in order; with a limit set, scanning
//! stops once enough records have been admitted.

use std::collections::HashSet;

use crate::error::PipelineError;
use crate::models::{HealthRow, RawRecord};

/// Record types imported when the configuration does not list any.
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    // Quantity
    "HKQuantityTypeIdentifierStepCount",
    "HKQuantityTypeIdentifierHeartRate",
    "HKQuantityTypeIdentifierDistanceWalkingRunning",
    "HKQuantityTypeIdentifierActiveEnergyBurned",
    "HKQuantityTypeIdentifierBodyMass",
    "HKQuantityTypeIdentifierDietaryWater",
    "HKQuantityTypeIdentifierBloodGlucose",
    // Category
    "HKCategoryTypeIdentifierSleepAnalysis",
    "HKCategoryTypeIdentifierMindfulSession",
];

/// Ordered, de-duplicated set of record type identifiers.
#[derive(Debug, Clone)]
pub struct AllowList {
    ordered: Vec<String>,
    members: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut members = HashSet::new();
        for t in types {
            let t = t.into();
            if members.insert(t.clone()) {
                ordered.push(t);
            }
        }
        Self { ordered, members }
    }

    pub fn contains(&self, record_type: &str) -> bool {
        self.members.contains(record_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_TYPES.iter().copied())
    }
}

/// Parses a record value, falling back to `0.0`.
///
/// Category records carry no numeric value, so absence and garbage are
/// both expected. Non-finite results (`NaN`, `inf`) also map to `0.0`.
pub fn parse_value(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn to_row(owner_id: &str, record_type: String, record: RawRecord) -> HealthRow {
    HealthRow {
        owner_id: owner_id.to_string(),
        record_type,
        value: parse_value(record.value.as_deref()),
        unit: record.unit.unwrap_or_default(),
        start_time: record.start_date,
        end_time: record.end_date,
    }
}

/// Keeps records whose type is allowed, truncates to `limit` (when
/// `Some(n)` with `n > 0`), and maps the survivors to rows owned by
/// `owner_id`. Fails with [`PipelineError::NoMatchingRecords`] when
/// nothing survives.
pub fn normalize_records(
    records: Vec<RawRecord>,
    allow: &AllowList,
    owner_id: &str,
    limit: Option<usize>,
) -> Result<Vec<HealthRow>, PipelineError> {
    let limit = limit.filter(|n| *n > 0).unwrap_or(usize::MAX);
    let rows: Vec<HealthRow> = records
        .into_iter()
        .filter_map(|mut r| {
            let t = r.record_type.take()?;
            allow.contains(&t).then_some((t, r))
        })
        .take(limit)
        .map(|(t, r)| to_row(owner_id, t, r))
        .collect();

    if rows.is_empty() {
        return Err(PipelineError::NoMatchingRecords);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(t: &str, value: Option<&str>) -> RawRecord {
        RawRecord {
            record_type: Some(t.to_string()),
            value: value.map(str::to_string),
            unit: Some("count".to_string()),
            start_date: Some("2024-01-01 08:00:00 +0100".to_string()),
            end_date: Some("2024-01-01 08:05:00 +0100".to_string()),
        }
    }

    #[test]
    fn allow_list_dedups_preserving_order() {
        let allow = AllowList::new(["B", "A", "B"]);
        assert_eq!(allow.iter().collect::<Vec<_>>(), vec!["B", "A"]);
        assert_eq!(allow.len(), 2);
        assert!(allow.contains("A"));
        assert!(!allow.contains("C"));
    }

    #[test]
    fn default_allow_list_has_quantity_and_category_types() {
        let allow = AllowList::default();
        assert_eq!(allow.len(), 9);
        assert!(allow.contains("HKQuantityTypeIdentifierStepCount"));
        assert!(allow.contains("HKCategoryTypeIdentifierSleepAnalysis"));
    }

    #[test]
    fn parse_value_falls_back_to_zero() {
        assert_eq!(parse_value(Some("72.5")), 72.5);
        assert_eq!(parse_value(Some(" 10 ")), 10.0);
        assert_eq!(parse_value(Some("HKCategoryValueSleepAnalysisAsleep")), 0.0);
        assert_eq!(parse_value(Some("")), 0.0);
        assert_eq!(parse_value(Some("NaN")), 0.0);
        assert_eq!(parse_value(Some("inf")), 0.0);
        assert_eq!(parse_value(None), 0.0);
    }

    #[test]
    fn filters_in_order_and_maps_fields() {
        let allow = AllowList::new(["A", "C"]);
        let records = vec![
            record("A", Some("1")),
            record("B", Some("2")),
            record("C", Some("3")),
            RawRecord::default(),
            record("A", None),
        ];
        let rows = normalize_records(records, &allow, "owner", None).unwrap();
        let summary: Vec<_> = rows.iter().map(|r| (r.record_type.as_str(), r.value)).collect();
        assert_eq!(summary, vec![("A", 1.0), ("C", 3.0), ("A", 0.0)]);
        assert!(rows.iter().all(|r| r.owner_id == "owner"));
        assert_eq!(rows[0].unit, "count");
        assert_eq!(rows[0].start_time.as_deref(), Some("2024-01-01 08:00:00 +0100"));
        assert_eq!(rows[0].end_time.as_deref(), Some("2024-01-01 08:05:00 +0100"));
    }

    #[test]
    fn missing_unit_is_empty_string() {
        let allow = AllowList::new(["A"]);
        let mut r = record("A", Some("1"));
        r.unit = None;
        r.start_date = None;
        let rows = normalize_records(vec![r], &allow, "owner", None).unwrap();
        assert_eq!(rows[0].unit, "");
        assert_eq!(rows[0].start_time, None);
    }

    #[test]
    fn limit_takes_strict_prefix() {
        let allow = AllowList::new(["A"]);
        let records: Vec<_> = (0..10)
            .map(|i| record("A", Some(&i.to_string())))
            .collect();
        let rows = normalize_records(records, &allow, "owner", Some(3)).unwrap();
        assert_eq!(rows.iter().map(|r| r.value).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn zero_limit_means_no_limit() {
        let allow = AllowList::new(["A"]);
        let records = vec![record("A", None), record("A", None)];
        assert_eq!(normalize_records(records, &allow, "o", Some(0)).unwrap().len(), 2);
    }

    #[test]
    fn no_survivors_is_an_error() {
        let allow = AllowList::new(["A"]);
        let err = normalize_records(vec![record("B", None)], &allow, "o", None).unwrap_err();
        assert_eq!(err, PipelineError::NoMatchingRecords);
        let err = normalize_records(Vec::new(), &allow, "o", None).unwrap_err();
        assert_eq!(err, PipelineError::NoMatchingRecords);
    }
}
