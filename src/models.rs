//! Core data models used throughout the import pipeline.
//!
//! A [`RawRecord`] is what the extractor pulls out of one `<Record>`
//! element. A [`HealthRow`] is the normalized shape submitted to the
//! row store.

use serde::Serialize;

/// One `<Record>` element, reduced to the attributes the pipeline reads.
///
/// Values are the raw attribute text. Nothing is parsed or validated
/// here; absent attributes are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub record_type: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Normalized row stored in the `health_data` table.
///
/// Serializes with the store's column names (`user_id`, `type`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRow {
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: f64,
    pub unit: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}
