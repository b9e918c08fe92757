//! Report generators consumed after a pipeline run.
//!
//! Analyzers are not pipeline stages: they take a finished record set and
//! return a typed, serializable report. Given identical input and
//! configuration the report is identical.

pub mod churn;
pub mod revenue;
pub mod velocity;

use serde::Serialize;

/// Severity levels shared by analyzer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
        };
        f.write_str(label)
    }
}
