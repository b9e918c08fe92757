use std::collections::HashMap;

use serde_json::json;
use tracing::info;

use crate::ai::{round2, stage_rank};
use crate::error::{Result, RevflowError};
use crate::types::{numeric_field, Record, RecordSet, Transformer};

/// A custom enrichment: receives the record, returns fields to merge in.
pub type EnrichmentFn = Box<dyn Fn(&Record) -> Record + Send + Sync>;

const RULE_VELOCITY: &str = "calculate_velocity";
const RULE_CLOSE_PROBABILITY: &str = "predict_close_probability";
const RULE_INSIGHTS: &str = "generate_insights";
const RULE_ALL: &str = "all";

const BUILTIN_RULES: &[&str] = &[RULE_VELOCITY, RULE_CLOSE_PROBABILITY, RULE_INSIGHTS];

/// Derive computed fields and insights from existing deal fields.
///
/// Rule names are validated at construction; an unknown name that is neither
/// a built-in nor a supplied custom enricher is a configuration error. When
/// a custom enricher and a built-in rule write the same field, the custom
/// result wins.
pub struct SmartEnrichmentTransformer {
    rules: Vec<String>,
    custom_enrichers: HashMap<String, EnrichmentFn>,
    name: String,
}

impl SmartEnrichmentTransformer {
    /// Enrich with the named rules; `"all"` selects every built-in rule and
    /// every custom enricher.
    pub fn new(rules: Vec<String>) -> Result<Self> {
        Self::with_custom_enrichers(rules, HashMap::new())
    }

    pub fn with_custom_enrichers(
        rules: Vec<String>,
        custom_enrichers: HashMap<String, EnrichmentFn>,
    ) -> Result<Self> {
        for rule in &rules {
            if rule != RULE_ALL
                && !BUILTIN_RULES.contains(&rule.as_str())
                && !custom_enrichers.contains_key(rule)
            {
                return Err(RevflowError::Config(format!(
                    "unknown enrichment rule: '{rule}'"
                )));
            }
        }
        Ok(Self {
            rules,
            custom_enrichers,
            name: "SmartEnrichmentTransformer".to_string(),
        })
    }

    fn active_rules(&self) -> Vec<String> {
        if self.rules.iter().any(|rule| rule == RULE_ALL) {
            let mut rules: Vec<String> = BUILTIN_RULES.iter().map(|r| r.to_string()).collect();
            let mut custom: Vec<String> = self
                .custom_enrichers
                .keys()
                .filter(|name| !BUILTIN_RULES.contains(&name.as_str()))
                .cloned()
                .collect();
            custom.sort();
            rules.extend(custom);
            rules
        } else {
            self.rules.clone()
        }
    }

    fn apply_rule(&self, rule: &str, record: &Record) -> Record {
        // A custom enricher with a built-in's name replaces it.
        if let Some(custom) = self.custom_enrichers.get(rule) {
            return custom(record);
        }
        match rule {
            RULE_VELOCITY => calculate_velocity(record),
            RULE_CLOSE_PROBABILITY => predict_close_probability(record),
            RULE_INSIGHTS => generate_insights(record),
            _ => Record::new(),
        }
    }
}

fn days_open(record: &Record) -> f64 {
    numeric_field(record, "days_in_stage")
        .or_else(|| numeric_field(record, "days_open"))
        .unwrap_or(1.0)
        .max(1.0)
}

fn calculate_velocity(record: &Record) -> Record {
    let mut enrichments = Record::new();
    if let Some(amount) = numeric_field(record, "amount") {
        let velocity = amount / days_open(record);
        enrichments.insert("ai_velocity".to_string(), json!(round2(velocity)));
        let tier = if amount > 100_000.0 {
            "high"
        } else if amount > 50_000.0 {
            "medium"
        } else {
            "low"
        };
        enrichments.insert("ai_velocity_tier".to_string(), json!(tier));
    }
    enrichments
}

fn predict_close_probability(record: &Record) -> Record {
    let mut enrichments = Record::new();

    let rank = record
        .get("stage")
        .and_then(|v| v.as_str())
        .map_or(0.3, |stage| stage_rank(stage, 0.3));
    let amount = numeric_field(record, "amount").unwrap_or(0.0);
    let velocity = amount / days_open(record);
    let engagement = numeric_field(record, "engagement_score").unwrap_or(50.0);

    let probability = (0.5 * rank
        + 0.25 * (velocity / 5_000.0).min(1.0)
        + 0.25 * (engagement / 100.0).clamp(0.0, 1.0))
    .clamp(0.0, 1.0);

    let days_in_stage = numeric_field(record, "days_in_stage").unwrap_or(0.0);
    let risk_level = if probability < 0.3 && days_in_stage > 30.0 {
        "HIGH"
    } else if probability < 0.6 {
        "MEDIUM"
    } else {
        "LOW"
    };

    enrichments.insert("ai_close_probability".to_string(), json!(round2(probability)));
    enrichments.insert("ai_risk_level".to_string(), json!(risk_level));
    enrichments
}

fn generate_insights(record: &Record) -> Record {
    let mut insights = Vec::new();

    if numeric_field(record, "days_in_stage").unwrap_or(0.0) > 30.0 {
        insights.push(json!(
            "Deal has been in current stage for over 30 days - consider reaching out"
        ));
    }
    if numeric_field(record, "amount").unwrap_or(0.0) > 100_000.0 {
        insights.push(json!(
            "High-value opportunity - prioritize for executive involvement"
        ));
    }
    if numeric_field(record, "last_activity_days").unwrap_or(999.0) > 14.0 {
        insights.push(json!("No activity in 14+ days - risk of going cold"));
    }

    let mut enrichments = Record::new();
    enrichments.insert("ai_insight_count".to_string(), json!(insights.len()));
    enrichments.insert("ai_insights".to_string(), json!(insights));
    enrichments
}

impl Transformer for SmartEnrichmentTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        info!("Enriching {} records", data.len());
        let rules = self.active_rules();

        Ok(data
            .iter()
            .map(|record| {
                let mut enriched = record.clone();
                for rule in &rules {
                    for (field, value) in self.apply_rule(rule, record) {
                        enriched.insert(field, value);
                    }
                }
                enriched
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deal(amount: f64, stage: &str, days_in_stage: f64) -> Record {
        let mut record = Record::new();
        record.insert("amount".to_string(), json!(amount));
        record.insert("stage".to_string(), json!(stage));
        record.insert("days_in_stage".to_string(), json!(days_in_stage));
        record
    }

    #[test]
    fn unknown_rule_is_a_configuration_error() {
        let result = SmartEnrichmentTransformer::new(vec!["score_engagement".to_string()]);
        assert!(matches!(result, Err(RevflowError::Config(_))));
    }

    #[test]
    fn velocity_divides_amount_by_days_in_stage() {
        let transformer =
            SmartEnrichmentTransformer::new(vec![RULE_VELOCITY.to_string()]).unwrap();
        let result = transformer.transform(&[deal(120_000.0, "proposal", 30.0)]).unwrap();

        assert_eq!(result[0]["ai_velocity"], json!(4000.0));
        assert_eq!(result[0]["ai_velocity_tier"], json!("high"));
        assert!(!result[0].contains_key("ai_close_probability"));
    }

    #[test]
    fn velocity_guards_against_zero_days() {
        let transformer =
            SmartEnrichmentTransformer::new(vec![RULE_VELOCITY.to_string()]).unwrap();
        let result = transformer.transform(&[deal(40_000.0, "proposal", 0.0)]).unwrap();
        assert_eq!(result[0]["ai_velocity"], json!(40_000.0));
        assert_eq!(result[0]["ai_velocity_tier"], json!("low"));
    }

    #[test]
    fn close_probability_is_bounded_and_ranked_by_stage() {
        let transformer =
            SmartEnrichmentTransformer::new(vec![RULE_CLOSE_PROBABILITY.to_string()]).unwrap();

        let hot = transformer
            .transform(&[deal(500_000.0, "negotiation", 5.0)])
            .unwrap();
        let hot_probability = hot[0]["ai_close_probability"].as_f64().unwrap();
        assert!(hot_probability > 0.6);
        assert_eq!(hot[0]["ai_risk_level"], json!("LOW"));

        let cold = transformer
            .transform(&[deal(1_000.0, "prospecting", 60.0)])
            .unwrap();
        let cold_probability = cold[0]["ai_close_probability"].as_f64().unwrap();
        assert!(cold_probability < 0.3);
        assert_eq!(cold[0]["ai_risk_level"], json!("HIGH"));
    }

    #[test]
    fn stalled_low_probability_deal_is_high_risk_only_when_old() {
        let transformer =
            SmartEnrichmentTransformer::new(vec![RULE_CLOSE_PROBABILITY.to_string()]).unwrap();
        // Same weak deal, but fresh: medium risk, not high.
        let fresh = transformer
            .transform(&[deal(1_000.0, "prospecting", 5.0)])
            .unwrap();
        assert_eq!(fresh[0]["ai_risk_level"], json!("MEDIUM"));
    }

    #[test]
    fn insights_list_triggered_rules() {
        let transformer =
            SmartEnrichmentTransformer::new(vec![RULE_INSIGHTS.to_string()]).unwrap();
        let mut record = deal(250_000.0, "proposal", 45.0);
        record.insert("last_activity_days".to_string(), json!(3));
        let result = transformer.transform(&[record]).unwrap();

        let insights = result[0]["ai_insights"].as_array().unwrap();
        assert_eq!(insights.len(), 2);
        assert_eq!(result[0]["ai_insight_count"], json!(2));
    }

    #[test]
    fn all_selects_every_builtin_rule() {
        let transformer = SmartEnrichmentTransformer::new(vec![RULE_ALL.to_string()]).unwrap();
        let result = transformer.transform(&[deal(80_000.0, "proposal", 10.0)]).unwrap();

        assert!(result[0].contains_key("ai_velocity"));
        assert!(result[0].contains_key("ai_close_probability"));
        assert!(result[0].contains_key("ai_insights"));
    }

    #[test]
    fn custom_enricher_wins_on_field_collisions() {
        let custom: EnrichmentFn = Box::new(|_| {
            let mut fields = Record::new();
            fields.insert("ai_velocity".to_string(), json!("override"));
            fields.insert("ai_region_fit".to_string(), json!(0.9));
            fields
        });
        let transformer = SmartEnrichmentTransformer::with_custom_enrichers(
            vec![RULE_ALL.to_string()],
            HashMap::from([("region_fit".to_string(), custom)]),
        )
        .unwrap();

        let result = transformer.transform(&[deal(80_000.0, "proposal", 10.0)]).unwrap();
        assert_eq!(result[0]["ai_velocity"], json!("override"));
        assert_eq!(result[0]["ai_region_fit"], json!(0.9));
    }

    #[test]
    fn custom_enricher_can_replace_a_builtin() {
        let custom: EnrichmentFn = Box::new(|_| {
            let mut fields = Record::new();
            fields.insert("ai_velocity".to_string(), json!(1.0));
            fields
        });
        let transformer = SmartEnrichmentTransformer::with_custom_enrichers(
            vec![RULE_VELOCITY.to_string()],
            HashMap::from([(RULE_VELOCITY.to_string(), custom)]),
        )
        .unwrap();

        let result = transformer.transform(&[deal(80_000.0, "proposal", 10.0)]).unwrap();
        assert_eq!(result[0]["ai_velocity"], json!(1.0));
        // The built-in's tier field is gone because the rule was replaced.
        assert!(!result[0].contains_key("ai_velocity_tier"));
    }
}
