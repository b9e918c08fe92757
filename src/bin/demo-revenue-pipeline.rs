/// Demo: run the complete pipeline over synthetic deal data, then feed the
/// result through every analyzer: Generate → Score → Detect → Sentiment →
/// Forecast → Enrich → Report.
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;

use revflow::ai::analyzers::churn::ChurnPredictionAnalyzer;
use revflow::ai::analyzers::revenue::RevenueInsightAnalyzer;
use revflow::ai::analyzers::velocity::DealVelocityAnalyzer;
use revflow::ai::anomaly::AnomalyDetectionTransformer;
use revflow::ai::enrichment::SmartEnrichmentTransformer;
use revflow::ai::forecast::ForecastTransformer;
use revflow::ai::scoring::DealScoringTransformer;
use revflow::ai::sentiment::SentimentAnalysisTransformer;
use revflow::destinations::ConsoleDestination;
use revflow::logging;
use revflow::sources::GeneratorSource;
use revflow::pipeline::{HookEvent, Pipeline};
use revflow::types::{Record, RecordSet};

const STAGES: &[&str] = &[
    "prospecting",
    "qualification",
    "proposal",
    "negotiation",
    "closed_won",
];

const COMPANIES: &[&str] = &[
    "Acme Corp",
    "TechStart Inc",
    "Global Systems",
    "Enterprise Solutions",
    "DataFlow LLC",
    "CloudTech",
    "StartupXYZ",
    "MegaCorp",
];

const NOTES: &[&str] = &[
    "Great call, they are excited and ready to move forward",
    "Still waiting on budget approval, some concern about timing",
    "Terrible quarter for them, deal is at risk of being lost",
    "Follow-up scheduled, very interested in the premium tier",
    "No response in weeks, frustrated with the slow process",
];

fn generate_deals(count: usize) -> RecordSet {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let mut record = Record::new();
            record.insert("id".to_string(), json!(format!("D{:03}", i + 1)));
            record.insert(
                "company".to_string(),
                json!(COMPANIES.choose(&mut rng).unwrap()),
            );
            record.insert("amount".to_string(), json!(rng.gen_range(5_000..500_000)));
            record.insert("stage".to_string(), json!(STAGES.choose(&mut rng).unwrap()));
            record.insert("days_in_stage".to_string(), json!(rng.gen_range(1..90)));
            record.insert(
                "engagement_score".to_string(),
                json!(rng.gen_range(10..100)),
            );
            record.insert(
                "last_activity_days".to_string(),
                json!(rng.gen_range(0..80)),
            );
            record.insert("support_tickets".to_string(), json!(rng.gen_range(0..10)));
            record.insert(
                "days_to_renewal".to_string(),
                json!(rng.gen_range(30..365)),
            );
            record.insert(
                "close_date".to_string(),
                json!(format!("2025-{:02}-15", (i % 6) + 1)),
            );
            record.insert("notes".to_string(), json!(NOTES.choose(&mut rng).unwrap()));
            record
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let count: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(25);

    println!("\n🚀 FULL PIPELINE DEMO: Synthetic deals through every stage");
    println!("{}", "=".repeat(60));
    println!("Generating {count} synthetic deals");
    println!("{}", "=".repeat(60));

    // ============================================================
    // STEP 1: PIPELINE - score, detect, tag, forecast and enrich
    // ============================================================
    println!("\n📥 STEP 1: PIPELINE - Running all transform stages...");

    let result = Pipeline::new("Demo revenue pipeline")
        .add_source(
            GeneratorSource::new(move || Ok(generate_deals(count))).named("SyntheticDeals"),
        )
        .add_transformer(DealScoringTransformer::default())
        .add_transformer(AnomalyDetectionTransformer::new(vec!["amount".to_string()]))
        .add_transformer(SentimentAnalysisTransformer::new(vec!["notes".to_string()]))
        .add_transformer(ForecastTransformer::new("close_date", "amount"))
        .add_transformer(SmartEnrichmentTransformer::new(vec!["all".to_string()])?)
        .add_destination(ConsoleDestination::new().with_limit(Some(3)))
        .add_hook(HookEvent::PostStage, |_, context, stage| {
            if let Some(stage) = stage {
                println!(
                    "   ✅ {} → {} records, {} errors",
                    stage.name(),
                    context.data.len(),
                    context.errors.len()
                );
            }
        })
        .run(None)?;

    println!("\n   Stages completed: {:?}", result.stages_completed());
    println!("   Record count: {}", result.data.len());

    // ============================================================
    // STEP 2: REVENUE INSIGHTS
    // ============================================================
    println!("\n💰 STEP 2: REVENUE INSIGHTS");
    let insights = RevenueInsightAnalyzer::new().analyze(&result.data);
    println!("   Total revenue: ${:.0}", insights.summary.total_revenue);
    println!("   Average deal: ${:.0}", insights.summary.average_deal_size);
    println!("   High-value deals: {}", insights.summary.high_value_deals);
    println!("   Quality score: {:.1}", insights.summary.quality_score);
    for recommendation in &insights.recommendations {
        println!("   💡 {recommendation}");
    }
    for risk in &insights.risk_factors {
        println!("   ⚠️  [{}] {}", risk.severity, risk.description);
    }

    // ============================================================
    // STEP 3: CHURN RISK
    // ============================================================
    println!("\n📉 STEP 3: CHURN RISK");
    let predictions = ChurnPredictionAnalyzer::default().predict(&result.data);
    let high_risk = predictions
        .iter()
        .filter(|p| p.risk_level.to_string() == "HIGH")
        .count();
    println!(
        "   {} of {} accounts at high churn risk",
        high_risk,
        predictions.len()
    );
    for prediction in predictions.iter().take(3) {
        println!(
            "   - {:?}: score {:.2} ({})",
            prediction.account_id, prediction.churn_risk_score, prediction.risk_level
        );
    }

    // ============================================================
    // STEP 4: DEAL VELOCITY
    // ============================================================
    println!("\n⚡ STEP 4: DEAL VELOCITY");
    let metrics = DealVelocityAnalyzer::new().analyze(&result.data);
    println!(
        "   Average velocity: ${:.0}/day across {} deals",
        metrics.average_velocity.average_daily_velocity, metrics.average_velocity.deals_analyzed
    );
    for bottleneck in &metrics.bottlenecks {
        println!(
            "   🐌 {} stage averaging {:.0} days ({})",
            bottleneck.stage, bottleneck.average_days, bottleneck.severity
        );
    }
    for fast_mover in &metrics.fast_movers {
        println!(
            "   🏎️  {:?} moving at ${:.0}/day",
            fast_mover.id, fast_mover.velocity
        );
    }

    println!("\n✨ PIPELINE COMPLETE!");
    println!("{}", "=".repeat(60));
    Ok(())
}
