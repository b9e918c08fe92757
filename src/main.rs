use clap::{Parser, Subcommand};
use tracing::warn;

use revflow::ai::analyzers::churn::ChurnPredictionAnalyzer;
use revflow::ai::analyzers::revenue::{RevenueInsightAnalyzer, RevenueInsightConfig};
use revflow::ai::analyzers::velocity::DealVelocityAnalyzer;
use revflow::ai::scoring::DealScoringTransformer;
use revflow::config::Config;
use revflow::destinations::{CsvDestination, JsonDestination};
use revflow::error::{Result, RevflowError};
use revflow::logging;
use revflow::pipeline::{Pipeline, PipelineContext};
use revflow::sources::{CsvSource, JsonSource};
use revflow::types::Stage;

#[derive(Parser)]
#[command(name = "revflow")]
#[command(about = "Revenue operations data pipeline toolkit")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score deals from a file and write the enriched records
    Score {
        /// Input file (.csv or .json)
        #[arg(long)]
        input: String,
        /// Output file (.csv or .json)
        #[arg(long)]
        output: String,
        /// Scoring factor fields (comma-separated)
        #[arg(long)]
        factors: Option<String>,
    },
    /// Generate an analyzer report from a file
    Analyze {
        /// Input file (.csv or .json)
        #[arg(long)]
        input: String,
        /// Report to generate: revenue, churn or velocity
        #[arg(long, default_value = "revenue")]
        report: String,
    },
    /// Score deals and print the revenue report in one go
    Run {
        /// Input file (.csv or .json)
        #[arg(long)]
        input: String,
        /// Output file (.csv or .json)
        #[arg(long)]
        output: String,
    },
}

fn source_for(path: &str) -> Result<Stage> {
    match path.rsplit('.').next() {
        Some("csv") => Ok(Stage::Source(Box::new(CsvSource::new(path)))),
        Some("json") => Ok(Stage::Source(Box::new(JsonSource::new(path)))),
        _ => Err(RevflowError::Config(format!(
            "unsupported input format: '{path}' (expected .csv or .json)"
        ))),
    }
}

fn destination_for(path: &str) -> Result<Stage> {
    match path.rsplit('.').next() {
        Some("csv") => Ok(Stage::Destination(Box::new(CsvDestination::new(path)))),
        Some("json") => Ok(Stage::Destination(Box::new(JsonDestination::new(path)))),
        _ => Err(RevflowError::Config(format!(
            "unsupported output format: '{path}' (expected .csv or .json)"
        ))),
    }
}

fn scoring_stage(config: &Config, factors: Option<String>) -> DealScoringTransformer {
    let transformer = match factors {
        Some(list) => DealScoringTransformer::new(
            list.split(',').map(|s| s.trim().to_string()).collect(),
        ),
        None => DealScoringTransformer::default(),
    };
    transformer
        .with_amount_cap(config.scoring.amount_cap)
        .with_priority_amount_threshold(config.scoring.priority_amount_threshold)
}

fn score_deals(
    config: &Config,
    input: &str,
    output: &str,
    factors: Option<String>,
) -> Result<PipelineContext> {
    let result = Pipeline::new("Deal scoring")
        .add_stage(source_for(input)?)
        .add_transformer(scoring_stage(config, factors))
        .add_stage(destination_for(output)?)
        .run(None)?;

    println!("\n📊 Scoring results:");
    println!("   Records: {}", result.data.len());
    println!("   Errors: {}", result.errors.len());
    if !result.errors.is_empty() {
        println!("\n⚠️  Errors encountered:");
        for error in &result.errors {
            println!("   - Stage '{}': {}", error.stage, error.error);
        }
    }
    Ok(result)
}

fn print_report(config: &Config, data: &[revflow::types::Record], report: &str) -> Result<()> {
    let rendered = match report {
        "revenue" => {
            let analyzer = RevenueInsightAnalyzer::with_config(RevenueInsightConfig {
                high_value_threshold: config.revenue.high_value_threshold,
                ..RevenueInsightConfig::default()
            });
            serde_json::to_string_pretty(&analyzer.analyze(data))?
        }
        "churn" => {
            let analyzer = ChurnPredictionAnalyzer::new(config.churn.risk_threshold);
            serde_json::to_string_pretty(&analyzer.predict(data))?
        }
        "velocity" => {
            let analyzer = DealVelocityAnalyzer::new();
            serde_json::to_string_pretty(&analyzer.analyze(data))?
        }
        other => {
            return Err(RevflowError::Config(format!(
                "unknown report: '{other}' (expected revenue, churn or velocity)"
            )))
        }
    };
    println!("{rendered}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Using default configuration: {}", e);
        Config::default()
    });

    match cli.command {
        Commands::Score {
            input,
            output,
            factors,
        } => {
            println!("🎯 Scoring deals from {input}...");
            score_deals(&config, &input, &output, factors)?;
            println!("✅ Scored deals written to {output}");
        }
        Commands::Analyze { input, report } => {
            println!("🔍 Analyzing {input}...");
            let result = Pipeline::new("Analyze")
                .add_stage(source_for(&input)?)
                .run(None)?;
            print_report(&config, &result.data, &report)?;
        }
        Commands::Run { input, output } => {
            println!("🚀 Running full pipeline (score + analyze)...");
            let result = score_deals(&config, &input, &output, None)?;
            print_report(&config, &result.data, "revenue")?;
            println!("✅ Full pipeline completed");
        }
    }
    Ok(())
}
