use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::ai::analyzers::RiskLevel;
use crate::ai::round2;
use crate::types::{numeric_field, Record};

/// Churn risk prediction for a single account.
#[derive(Debug, Clone, Serialize)]
pub struct ChurnPrediction {
    pub account_id: Option<Value>,
    pub churn_risk_score: f64,
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
    pub recommended_actions: Vec<String>,
}

/// Score accounts for churn risk from engagement and lifecycle signals.
///
/// Each signal contributes a bounded partial score; the sum is clamped to
/// [0, 1] and thresholded into a risk level. Factors carry the triggered
/// reasons and map to recommended actions through a fixed lookup.
pub struct ChurnPredictionAnalyzer {
    risk_threshold: f64,
}

impl Default for ChurnPredictionAnalyzer {
    fn default() -> Self {
        Self::new(0.6)
    }
}

impl ChurnPredictionAnalyzer {
    pub fn new(risk_threshold: f64) -> Self {
        Self { risk_threshold }
    }

    fn risk_level(&self, score: f64) -> RiskLevel {
        if score >= self.risk_threshold {
            RiskLevel::High
        } else if score >= self.risk_threshold / 2.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn predict(&self, data: &[Record]) -> Vec<ChurnPrediction> {
        info!("Analyzing churn risk for {} accounts", data.len());

        let predictions: Vec<ChurnPrediction> = data
            .iter()
            .map(|record| {
                let (score, factors, actions) = churn_signals(record);
                let risk_level = self.risk_level(score);

                let mut recommended_actions = Vec::new();
                if risk_level == RiskLevel::High {
                    recommended_actions
                        .push("Schedule executive business review immediately".to_string());
                    recommended_actions.push("Assign dedicated success manager".to_string());
                }
                recommended_actions.extend(actions);

                ChurnPrediction {
                    account_id: record.get("id").cloned(),
                    churn_risk_score: round2(score),
                    risk_level,
                    factors,
                    recommended_actions,
                }
            })
            .collect();

        let high_risk = predictions
            .iter()
            .filter(|p| p.risk_level == RiskLevel::High)
            .count();
        info!("Identified {} high-risk accounts", high_risk);
        predictions
    }
}

/// Partial scores, triggered factor descriptions and the actions they map to.
fn churn_signals(record: &Record) -> (f64, Vec<String>, Vec<String>) {
    let mut score: f64 = 0.0;
    let mut factors = Vec::new();
    let mut actions = Vec::new();

    let last_activity = numeric_field(record, "last_activity_days").unwrap_or(0.0);
    if last_activity > 60.0 {
        score += 0.4;
    } else if last_activity > 30.0 {
        score += 0.2;
    }
    if last_activity > 30.0 {
        factors.push("Low engagement - no activity in 30+ days".to_string());
        actions.push("Reach out to re-engage".to_string());
    }

    let support_tickets = numeric_field(record, "support_tickets").unwrap_or(0.0);
    if support_tickets > 5.0 {
        score += 0.3;
        factors.push("High support ticket volume".to_string());
        actions.push("Review and resolve outstanding support issues".to_string());
    }

    let engagement = numeric_field(record, "engagement_score").unwrap_or(50.0);
    if engagement < 30.0 {
        score += 0.3;
        factors.push("Poor engagement score".to_string());
        actions.push("Schedule a product adoption review".to_string());
    }

    let days_to_renewal = numeric_field(record, "days_to_renewal").unwrap_or(365.0);
    if days_to_renewal < 90.0 {
        score += 0.2;
        factors.push("Contract renewal approaching".to_string());
        actions.push("Start the renewal conversation early".to_string());
    }

    (score.min(1.0), factors, actions)
}
