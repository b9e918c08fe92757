use serde_json::json;

use revflow::ai::analyzers::churn::ChurnPredictionAnalyzer;
use revflow::ai::analyzers::revenue::RevenueInsightAnalyzer;
use revflow::ai::analyzers::velocity::DealVelocityAnalyzer;
use revflow::ai::anomaly::AnomalyDetectionTransformer;
use revflow::ai::enrichment::SmartEnrichmentTransformer;
use revflow::ai::forecast::ForecastTransformer;
use revflow::ai::scoring::DealScoringTransformer;
use revflow::ai::sentiment::SentimentAnalysisTransformer;
use revflow::pipeline::Pipeline;
use revflow::sources::GeneratorSource;
use revflow::types::{Record, RecordSet, Transformer};

fn historical_deals() -> RecordSet {
    let rows = [
        ("D001", 120_000, "negotiation", 10, "2025-01-10", "Great call, very excited to proceed"),
        ("D002", 45_000, "proposal", 35, "2025-02-12", "Some concern about the timeline"),
        ("D003", 260_000, "qualification", 5, "2025-03-03", "They love the product, ready for next steps"),
        ("D004", 8_000, "prospecting", 70, "2025-03-21", "No response, deal probably lost"),
        ("D005", 95_000, "negotiation", 12, "2025-04-02", "Agreed on terms, success likely"),
    ];
    rows.iter()
        .map(|(id, amount, stage, days, close_date, notes)| {
            let mut record = Record::new();
            record.insert("id".to_string(), json!(id));
            record.insert("amount".to_string(), json!(amount));
            record.insert("stage".to_string(), json!(stage));
            record.insert("days_in_stage".to_string(), json!(days));
            record.insert("close_date".to_string(), json!(close_date));
            record.insert("notes".to_string(), json!(notes));
            record
        })
        .collect()
}

fn run_full_chain() -> RecordSet {
    Pipeline::new("AI chain")
        .add_source(GeneratorSource::new(|| Ok(historical_deals())))
        .add_transformer(DealScoringTransformer::default())
        .add_transformer(AnomalyDetectionTransformer::new(vec!["amount".to_string()]))
        .add_transformer(SentimentAnalysisTransformer::new(vec!["notes".to_string()]))
        .add_transformer(ForecastTransformer::new("close_date", "amount"))
        .add_transformer(SmartEnrichmentTransformer::new(vec!["all".to_string()]).unwrap())
        .run(None)
        .unwrap()
        .data
}

#[test]
fn every_ai_stage_contributes_its_fields() {
    let data = run_full_chain();

    for record in &data {
        assert!(record.contains_key("ai_score"));
        assert!(record.contains_key("ai_classification"));
        assert!(record.contains_key("ai_priority"));
        assert!(record.contains_key("ai_anomaly_detected"));
        assert!(record.contains_key("ai_sentiment"));
        assert!(record.contains_key("ai_forecast"));
        assert!(record.contains_key("ai_forecast_trend"));
        assert!(record.contains_key("ai_velocity"));
        assert!(record.contains_key("ai_close_probability"));
        assert!(record.contains_key("ai_risk_level"));
        assert!(record.contains_key("ai_insights"));
        // Input fields are never removed.
        assert!(record.contains_key("id"));
        assert!(record.contains_key("amount"));
    }
}

#[test]
fn stage_order_does_not_corrupt_earlier_fields() {
    let data = run_full_chain();

    // Scoring ran before enrichment; its fields are untouched by later stages.
    assert_eq!(data[0]["ai_classification"], json!("HOT"));
    let sentiment = &data[0]["ai_sentiment"];
    assert_eq!(sentiment["sentiment"], json!("positive"));
}

#[test]
fn analyzers_consume_the_finished_record_set() {
    let data = run_full_chain();

    let insights = RevenueInsightAnalyzer::new().analyze(&data);
    assert_eq!(insights.summary.total_records, 5);
    assert_eq!(insights.summary.total_revenue, 528_000.0);
    // D001 and D003 sit at or above the default high-value threshold.
    assert_eq!(insights.summary.high_value_deals, 2);

    let predictions = ChurnPredictionAnalyzer::default().predict(&data);
    assert_eq!(predictions.len(), 5);

    let metrics = DealVelocityAnalyzer::new().analyze(&data);
    assert_eq!(metrics.average_velocity.deals_analyzed, 5);
    assert!(!metrics.velocity_by_stage.is_empty());
}

#[test]
fn chain_output_is_idempotent_per_transformer() {
    let data = run_full_chain();

    // Re-running any single transformer over its own output changes nothing.
    let scoring = DealScoringTransformer::default();
    assert_eq!(scoring.transform(&data).unwrap(), data);

    let sentiment = SentimentAnalysisTransformer::new(vec!["notes".to_string()]);
    assert_eq!(sentiment.transform(&data).unwrap(), data);
}
