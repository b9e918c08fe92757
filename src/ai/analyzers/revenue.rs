use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::info;

use crate::ai::analyzers::RiskLevel;
use crate::ai::{parse_record_date, round2, stage_key};
use crate::types::{numeric_field, text_field, Record};

/// Configuration for [`RevenueInsightAnalyzer`].
#[derive(Debug, Clone)]
pub struct RevenueInsightConfig {
    /// Deals at or above this amount count as high-value.
    pub high_value_threshold: f64,
    /// Share of total value held by the top deals beyond which a
    /// concentration risk is raised.
    pub concentration_cutoff: f64,
    /// How many top deals the concentration check looks at.
    pub top_deal_count: usize,
    /// Date field used for month-over-month trend detection.
    pub date_field: String,
}

impl Default for RevenueInsightConfig {
    fn default() -> Self {
        Self {
            high_value_threshold: 100_000.0,
            concentration_cutoff: 0.5,
            top_deal_count: 3,
            date_field: "close_date".to_string(),
        }
    }
}

/// Executive summary of a finished record set.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueSummary {
    pub total_records: usize,
    pub total_revenue: f64,
    pub average_deal_size: f64,
    pub high_value_deals: usize,
    /// 0-100; high when value is spread evenly rather than concentrated in
    /// the top deals.
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueTrend {
    pub trend_type: String,
    pub description: String,
    pub impact: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskFactor {
    pub risk_type: String,
    pub severity: RiskLevel,
    pub description: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub opportunity_type: String,
    pub count: usize,
    pub value: f64,
    pub description: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueInsights {
    pub summary: RevenueSummary,
    pub trends: Vec<RevenueTrend>,
    pub recommendations: Vec<String>,
    pub risk_factors: Vec<RiskFactor>,
    pub opportunities: Vec<Opportunity>,
}

/// Generate revenue insights from a finished record set.
pub struct RevenueInsightAnalyzer {
    config: RevenueInsightConfig,
}

impl Default for RevenueInsightAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl RevenueInsightAnalyzer {
    pub fn new() -> Self {
        Self {
            config: RevenueInsightConfig::default(),
        }
    }

    pub fn with_config(config: RevenueInsightConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, data: &[Record]) -> RevenueInsights {
        info!("Generating revenue insights from {} records", data.len());
        RevenueInsights {
            summary: self.summarize(data),
            trends: self.identify_trends(data),
            recommendations: self.recommendations(data),
            risk_factors: self.identify_risks(data),
            opportunities: self.identify_opportunities(data),
        }
    }

    fn amount(record: &Record) -> f64 {
        numeric_field(record, "amount").unwrap_or(0.0)
    }

    /// Share of total value held by the configured number of top deals.
    fn top_share(&self, data: &[Record], total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        let mut amounts: Vec<f64> = data.iter().map(Self::amount).collect();
        amounts.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let top: f64 = amounts.iter().take(self.config.top_deal_count).sum();
        top / total
    }

    fn summarize(&self, data: &[Record]) -> RevenueSummary {
        let total_revenue: f64 = data.iter().map(Self::amount).sum();
        let average_deal_size = if data.is_empty() {
            0.0
        } else {
            total_revenue / data.len() as f64
        };
        let high_value_deals = data
            .iter()
            .filter(|r| Self::amount(r) >= self.config.high_value_threshold)
            .count();
        let quality_score = if total_revenue <= 0.0 {
            0.0
        } else {
            round2((1.0 - self.top_share(data, total_revenue)) * 100.0)
        };

        RevenueSummary {
            total_records: data.len(),
            total_revenue: round2(total_revenue),
            average_deal_size: round2(average_deal_size),
            high_value_deals,
            quality_score,
        }
    }

    fn identify_trends(&self, data: &[Record]) -> Vec<RevenueTrend> {
        let mut monthly: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for record in data {
            if let Some(date) = record
                .get(&self.config.date_field)
                .and_then(parse_record_date)
            {
                let month = date.with_day(1).expect("day 1 is valid for every month");
                *monthly.entry(month).or_insert(0.0) += Self::amount(record);
            }
        }

        if monthly.len() >= 2 {
            let totals: Vec<f64> = monthly.values().copied().collect();
            let latest = totals[totals.len() - 1];
            let previous = totals[totals.len() - 2];
            if previous > 0.0 {
                let change = (latest - previous) / previous;
                if change > 0.2 {
                    return vec![RevenueTrend {
                        trend_type: "revenue_increase".to_string(),
                        description: format!(
                            "Monthly revenue up {:.0}% month-over-month",
                            change * 100.0
                        ),
                        impact: "positive".to_string(),
                        confidence: 0.85,
                    }];
                } else if change < -0.2 {
                    return vec![RevenueTrend {
                        trend_type: "revenue_decrease".to_string(),
                        description: format!(
                            "Monthly revenue down {:.0}% month-over-month",
                            change.abs() * 100.0
                        ),
                        impact: "negative".to_string(),
                        confidence: 0.85,
                    }];
                }
            }
            return Vec::new();
        }

        // No usable dates: compare the most recent deals with the overall
        // average instead.
        let amounts: Vec<f64> = data.iter().map(Self::amount).collect();
        if amounts.is_empty() {
            return Vec::new();
        }
        let overall = amounts.iter().sum::<f64>() / amounts.len() as f64;
        let recent_window = amounts.len().min(10);
        let recent = &amounts[amounts.len() - recent_window..];
        let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;

        if recent_avg > overall * 1.2 {
            vec![RevenueTrend {
                trend_type: "revenue_increase".to_string(),
                description: "Recent deals are 20%+ above average".to_string(),
                impact: "positive".to_string(),
                confidence: 0.85,
            }]
        } else if recent_avg < overall * 0.8 {
            vec![RevenueTrend {
                trend_type: "revenue_decrease".to_string(),
                description: "Recent deals are 20%+ below average".to_string(),
                impact: "negative".to_string(),
                confidence: 0.85,
            }]
        } else {
            Vec::new()
        }
    }

    fn recommendations(&self, data: &[Record]) -> Vec<String> {
        if data.is_empty() {
            return vec!["No data available for recommendations".to_string()];
        }
        let mut recommendations = Vec::new();

        let high_value = data
            .iter()
            .filter(|r| Self::amount(r) >= self.config.high_value_threshold)
            .count();
        let high_value_share = high_value as f64 / data.len() as f64;
        if high_value_share < 0.2 {
            recommendations.push(format!(
                "Consider focusing on larger deals - only {:.0}% of pipeline is high-value",
                high_value_share * 100.0
            ));
        }

        let stalled = data
            .iter()
            .filter(|r| numeric_field(r, "days_in_stage").unwrap_or(0.0) > 45.0)
            .count();
        if stalled > 0 {
            recommendations.push(format!(
                "Review {stalled} deals that have been stalled for 45+ days"
            ));
        }

        if high_value > 0 {
            recommendations.push(format!(
                "Prioritize {high_value} high-value deals for maximum revenue impact"
            ));
        }

        recommendations
    }

    fn identify_risks(&self, data: &[Record]) -> Vec<RiskFactor> {
        let total: f64 = data.iter().map(Self::amount).sum();
        if total <= 0.0 {
            return Vec::new();
        }

        let share = self.top_share(data, total);
        if share > self.config.concentration_cutoff {
            vec![RiskFactor {
                risk_type: "concentration".to_string(),
                severity: RiskLevel::High,
                description: format!(
                    "Top {} deals represent {:.0}% of pipeline",
                    self.config.top_deal_count,
                    share * 100.0
                ),
                mitigation: "Diversify pipeline with more mid-sized deals".to_string(),
            }]
        } else {
            Vec::new()
        }
    }

    fn identify_opportunities(&self, data: &[Record]) -> Vec<Opportunity> {
        let hot_open: Vec<&Record> = data
            .iter()
            .filter(|r| {
                let hot = text_field(r, "ai_classification") == Some("HOT");
                let closed = text_field(r, "stage")
                    .map(|stage| stage_key(stage).starts_with("closed"))
                    .unwrap_or(false);
                hot && !closed
            })
            .collect();

        if hot_open.is_empty() {
            return Vec::new();
        }
        let value: f64 = hot_open.iter().map(|r| Self::amount(r)).sum();
        vec![Opportunity {
            opportunity_type: "high_probability_deals".to_string(),
            count: hot_open.len(),
            value: round2(value),
            description: format!(
                "{} high-probability deals worth ${:.0}",
                hot_open.len(),
                value
            ),
            action: "Focus resources on closing these deals this quarter".to_string(),
        }]
    }
}
