use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::ai::analyzers::RiskLevel;
use crate::ai::{mean, population_std, round2};
use crate::types::{numeric_field, text_field, Record};

#[derive(Debug, Clone, Serialize)]
pub struct AverageVelocity {
    pub average_daily_velocity: f64,
    pub deals_analyzed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageBottleneck {
    pub stage: String,
    pub average_days: f64,
    pub severity: RiskLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct FastMover {
    pub id: Option<Value>,
    pub amount: f64,
    pub days_in_stage: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VelocityMetrics {
    pub average_velocity: AverageVelocity,
    pub velocity_by_stage: BTreeMap<String, f64>,
    pub bottlenecks: Vec<StageBottleneck>,
    pub fast_movers: Vec<FastMover>,
    pub recommendations: Vec<String>,
}

/// Analyze how quickly value moves through the pipeline.
///
/// Velocity is amount per day in the current stage. Bottlenecks are stages
/// whose average dwell time sits more than one standard deviation above the
/// cross-stage mean; fast movers are the deals at or above the configured
/// velocity percentile.
pub struct DealVelocityAnalyzer {
    fast_mover_percentile: f64,
    fast_mover_limit: usize,
}

impl Default for DealVelocityAnalyzer {
    fn default() -> Self {
        Self {
            fast_mover_percentile: 0.9,
            fast_mover_limit: 10,
        }
    }
}

impl DealVelocityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fast_mover_percentile(mut self, percentile: f64) -> Self {
        self.fast_mover_percentile = percentile.clamp(0.0, 1.0);
        self
    }

    fn deal_days(record: &Record) -> Option<f64> {
        numeric_field(record, "days_in_stage")
            .or_else(|| numeric_field(record, "days_open"))
            .filter(|days| *days > 0.0)
    }

    fn deal_velocity(record: &Record) -> Option<f64> {
        let amount = numeric_field(record, "amount").filter(|amount| *amount > 0.0)?;
        Some(amount / Self::deal_days(record)?)
    }

    pub fn analyze(&self, data: &[Record]) -> VelocityMetrics {
        info!("Analyzing deal velocity for {} deals", data.len());

        let velocities: Vec<f64> = data.iter().filter_map(Self::deal_velocity).collect();
        let average_velocity = AverageVelocity {
            average_daily_velocity: round2(mean(&velocities)),
            deals_analyzed: velocities.len(),
        };

        let velocity_by_stage = self.velocity_by_stage(data);
        let bottlenecks = self.identify_bottlenecks(data);
        let fast_movers = self.identify_fast_movers(data, &velocities);
        let recommendations = bottlenecks
            .iter()
            .take(3)
            .map(|b| format!("Address {} stage - avg {:.0} days", b.stage, b.average_days))
            .collect();

        VelocityMetrics {
            average_velocity,
            velocity_by_stage,
            bottlenecks,
            fast_movers,
            recommendations,
        }
    }

    fn velocity_by_stage(&self, data: &[Record]) -> BTreeMap<String, f64> {
        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for record in data {
            if let Some(velocity) = Self::deal_velocity(record) {
                let stage = text_field(record, "stage").unwrap_or("unknown").to_string();
                grouped.entry(stage).or_default().push(velocity);
            }
        }
        grouped
            .into_iter()
            .map(|(stage, velocities)| (stage, round2(mean(&velocities))))
            .collect()
    }

    /// Average dwell time per stage.
    fn stage_dwell_times(data: &[Record]) -> BTreeMap<String, f64> {
        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for record in data {
            let days = numeric_field(record, "days_in_stage").unwrap_or(0.0);
            let stage = text_field(record, "stage").unwrap_or("unknown").to_string();
            grouped.entry(stage).or_default().push(days);
        }
        grouped
            .into_iter()
            .map(|(stage, days)| (stage, mean(&days)))
            .collect()
    }

    fn identify_bottlenecks(&self, data: &[Record]) -> Vec<StageBottleneck> {
        let dwell = Self::stage_dwell_times(data);
        if dwell.len() < 2 {
            return Vec::new();
        }

        let averages: Vec<f64> = dwell.values().copied().collect();
        let dwell_mean = mean(&averages);
        let dwell_std = population_std(&averages, dwell_mean);
        if dwell_std == 0.0 {
            return Vec::new();
        }

        let mut bottlenecks: Vec<StageBottleneck> = dwell
            .into_iter()
            .filter(|(_, average_days)| *average_days > dwell_mean + dwell_std)
            .map(|(stage, average_days)| {
                let severity = if average_days > dwell_mean + 2.0 * dwell_std {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                };
                StageBottleneck {
                    stage,
                    average_days: round2(average_days),
                    severity,
                }
            })
            .collect();
        bottlenecks.sort_by(|a, b| {
            b.average_days
                .partial_cmp(&a.average_days)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        bottlenecks
    }

    fn identify_fast_movers(&self, data: &[Record], velocities: &[f64]) -> Vec<FastMover> {
        if velocities.is_empty() {
            return Vec::new();
        }
        let mut sorted = velocities.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let index = ((sorted.len() - 1) as f64 * self.fast_mover_percentile).ceil() as usize;
        let cutoff = sorted[index.min(sorted.len() - 1)];

        let mut fast_movers: Vec<FastMover> = data
            .iter()
            .filter_map(|record| {
                let velocity = Self::deal_velocity(record)?;
                if velocity < cutoff {
                    return None;
                }
                Some(FastMover {
                    id: record.get("id").cloned(),
                    amount: numeric_field(record, "amount").unwrap_or(0.0),
                    days_in_stage: Self::deal_days(record).unwrap_or(0.0),
                    velocity: round2(velocity),
                })
            })
            .collect();
        fast_movers.sort_by(|a, b| {
            b.velocity
                .partial_cmp(&a.velocity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        fast_movers.truncate(self.fast_mover_limit);
        fast_movers
    }
}
