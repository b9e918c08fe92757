use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::info;

use crate::ai::{round2, stage_rank};
use crate::error::Result;
use crate::types::{numeric_field, Record, RecordSet, Transformer};

/// Score deals from a weighted combination of normalized factors.
///
/// Each factor value is normalized into [0, 1], multiplied by its weight and
/// combined into a composite `ai_score` in [0, 100]. The score drives an
/// `ai_classification` (HOT/WARM/COOL/COLD) and an `ai_priority`
/// (URGENT/HIGH/MEDIUM/LOW).
pub struct DealScoringTransformer {
    factors: Vec<String>,
    weights: HashMap<String, f64>,
    amount_cap: f64,
    priority_amount_threshold: f64,
    scoring_function: Option<Box<dyn Fn(&Record) -> f64 + Send + Sync>>,
    name: String,
}

impl Default for DealScoringTransformer {
    fn default() -> Self {
        Self::new(vec![
            "amount".to_string(),
            "stage".to_string(),
            "days_in_stage".to_string(),
        ])
    }
}

impl DealScoringTransformer {
    pub fn new(factors: Vec<String>) -> Self {
        Self {
            factors,
            weights: HashMap::new(),
            amount_cap: 100_000.0,
            priority_amount_threshold: 100_000.0,
            scoring_function: None,
            name: "DealScoringTransformer".to_string(),
        }
    }

    /// Per-factor weights; factors without an entry fall back to 0.1.
    /// Without this, all configured factors weigh equally.
    pub fn with_weights(mut self, weights: HashMap<String, f64>) -> Self {
        self.weights = weights;
        self
    }

    /// Amount at which the amount factor saturates to a full score.
    pub fn with_amount_cap(mut self, amount_cap: f64) -> Self {
        self.amount_cap = amount_cap;
        self
    }

    /// Amount above which a deal's priority is raised to at least HIGH.
    pub fn with_priority_amount_threshold(mut self, threshold: f64) -> Self {
        self.priority_amount_threshold = threshold;
        self
    }

    /// Replace the built-in formula entirely. The function must return a
    /// numeric score; classification and priority are still derived from it.
    pub fn with_scoring_function(
        mut self,
        scoring_function: impl Fn(&Record) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.scoring_function = Some(Box::new(scoring_function));
        self
    }

    fn weight_for(&self, factor: &str) -> f64 {
        if self.weights.is_empty() {
            1.0
        } else {
            self.weights.get(factor).copied().unwrap_or(0.1)
        }
    }

    fn normalize_value(&self, value: &Value, factor: &str) -> f64 {
        let numeric = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(v) = numeric {
            return match factor {
                "amount" => (v / self.amount_cap).clamp(0.0, 1.0),
                // Time in stage is a penalty: fresh deals score full marks,
                // anything past 90 days scores zero.
                "days_in_stage" => (1.0 - v / 90.0).max(0.0),
                "company_size" => (v / 10_000.0).clamp(0.0, 1.0),
                _ => (v / 100.0).clamp(0.0, 1.0),
            };
        }
        match value {
            Value::String(s) => stage_rank(s, 0.5),
            _ => 0.5,
        }
    }

    fn composite_score(&self, record: &Record) -> f64 {
        let mut score = 0.0;
        let mut total_weight = 0.0;
        for factor in &self.factors {
            if let Some(value) = record.get(factor) {
                let weight = self.weight_for(factor);
                score += self.normalize_value(value, factor) * weight;
                total_weight += weight;
            }
        }
        if total_weight > 0.0 {
            score / total_weight * 100.0
        } else {
            // No configured factor present: neutral midpoint.
            50.0
        }
    }

    fn classify(score: f64) -> &'static str {
        if score >= 75.0 {
            "HOT"
        } else if score >= 50.0 {
            "WARM"
        } else if score >= 25.0 {
            "COOL"
        } else {
            "COLD"
        }
    }

    fn priority(&self, classification: &str, record: &Record) -> &'static str {
        let amount = numeric_field(record, "amount").unwrap_or(0.0);
        match classification {
            "HOT" => "URGENT",
            _ if amount >= self.priority_amount_threshold => "HIGH",
            "WARM" => "HIGH",
            "COOL" => "MEDIUM",
            _ => "LOW",
        }
    }
}

impl Transformer for DealScoringTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        info!("Scoring {} deals", data.len());

        let scored: RecordSet = data
            .iter()
            .map(|record| {
                let raw_score = match &self.scoring_function {
                    Some(custom) => custom(record),
                    None => self.composite_score(record),
                };
                let score = round2(raw_score.clamp(0.0, 100.0));
                let classification = Self::classify(score);

                let mut scored = record.clone();
                scored.insert("ai_score".to_string(), json!(score));
                scored.insert("ai_classification".to_string(), json!(classification));
                scored.insert(
                    "ai_priority".to_string(),
                    json!(self.priority(classification, record)),
                );
                scored
            })
            .collect();

        let high_quality = scored
            .iter()
            .filter(|r| numeric_field(r, "ai_score").unwrap_or(0.0) >= 50.0)
            .count();
        info!(
            "Scored {} deals: {} high-quality deals identified",
            scored.len(),
            high_quality
        );
        Ok(scored)
    }
}
