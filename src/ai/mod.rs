//! Statistical transformers and analyzers for pipeline data.
//!
//! These stages are heuristic: keyword tables, fixed thresholds and batch
//! statistics, not trained models. Every stage is deterministic for a given
//! input and configuration, so callers can assert exact outputs.

pub mod analyzers;
pub mod anomaly;
pub mod enrichment;
pub mod forecast;
pub mod scoring;
pub mod sentiment;

use std::collections::HashMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde_json::Value;

/// Rank table for pipeline stage names, shared by scoring and enrichment.
pub(crate) static STAGE_RANKS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("prospecting", 0.2),
        ("qualification", 0.3),
        ("proposal", 0.5),
        ("negotiation", 0.7),
        ("closed_won", 1.0),
        ("closed_lost", 0.0),
    ])
});

/// Normalize a stage label for rank lookup ("Closed Won" → "closed_won").
pub(crate) fn stage_key(stage: &str) -> String {
    stage.trim().to_lowercase().replace(' ', "_")
}

pub(crate) fn stage_rank(stage: &str, unknown: f64) -> f64 {
    STAGE_RANKS
        .get(stage_key(stage).as_str())
        .copied()
        .unwrap_or(unknown)
}

/// Parse a date value as either `YYYY-MM-DD`, `YYYY/MM/DD` or RFC 3339.
pub(crate) fn parse_record_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation over the batch.
pub(crate) fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}
