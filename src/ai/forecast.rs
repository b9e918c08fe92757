use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::ai::{parse_record_date, round2, round4};
use crate::error::Result;
use crate::types::{numeric_field, Record, RecordSet, Transformer};

/// Confidence decay per forecast step out; geometric so each horizon's
/// confidence is strictly below the previous one.
const CONFIDENCE_DECAY: f64 = 0.85;

/// Project future period totals from historical records.
///
/// Records are grouped by calendar month of `date_field` and `value_field`
/// is summed per month. The forecast extends the moving average of the most
/// recent months by the mean month-over-month delta. The forecast summary
/// (`ai_forecast` and `ai_forecast_trend`) is written onto every record of
/// the set, so any downstream consumer sees it regardless of which records
/// it keeps.
pub struct ForecastTransformer {
    date_field: String,
    value_field: String,
    forecast_periods: usize,
    window: usize,
    stability_ratio: f64,
    name: String,
}

impl ForecastTransformer {
    pub fn new(date_field: impl Into<String>, value_field: impl Into<String>) -> Self {
        Self {
            date_field: date_field.into(),
            value_field: value_field.into(),
            forecast_periods: 3,
            window: 3,
            stability_ratio: 0.01,
            name: "ForecastTransformer".to_string(),
        }
    }

    pub fn with_forecast_periods(mut self, forecast_periods: usize) -> Self {
        self.forecast_periods = forecast_periods;
        self
    }

    /// Number of most recent months in the moving average.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Fraction of the mean monthly total below which the trend counts as
    /// stable.
    pub fn with_stability_ratio(mut self, stability_ratio: f64) -> Self {
        self.stability_ratio = stability_ratio;
        self
    }

    /// Month-keyed totals in chronological order.
    fn monthly_totals(&self, data: &[Record]) -> BTreeMap<NaiveDate, f64> {
        let mut totals = BTreeMap::new();
        for record in data {
            let date = record.get(&self.date_field).and_then(parse_record_date);
            let value = numeric_field(record, &self.value_field);
            if let (Some(date), Some(value)) = (date, value) {
                let month = date.with_day(1).expect("day 1 is valid for every month");
                *totals.entry(month).or_insert(0.0) += value;
            }
        }
        totals
    }

    fn trend_label(&self, trend: f64, totals: &[f64]) -> &'static str {
        let scale = totals.iter().map(|v| v.abs()).sum::<f64>() / totals.len() as f64;
        if trend.abs() <= self.stability_ratio * scale {
            "stable"
        } else if trend > 0.0 {
            "increasing"
        } else {
            "decreasing"
        }
    }
}

impl Transformer for ForecastTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        let monthly = self.monthly_totals(data);
        if monthly.is_empty() {
            warn!("No usable historical data for forecasting");
            return Ok(data.to_vec());
        }

        let months: Vec<NaiveDate> = monthly.keys().copied().collect();
        let totals: Vec<f64> = monthly.values().copied().collect();
        let last_month = *months.last().expect("non-empty totals");

        let window_start = totals.len().saturating_sub(self.window);
        let recent = &totals[window_start..];
        let moving_average = recent.iter().sum::<f64>() / recent.len() as f64;

        // Mean month-over-month delta; a single month has no trend.
        let trend = if totals.len() < 2 {
            0.0
        } else {
            totals
                .windows(2)
                .map(|pair| pair[1] - pair[0])
                .sum::<f64>()
                / (totals.len() - 1) as f64
        };

        let forecasts: Vec<Value> = (1..=self.forecast_periods)
            .map(|step| {
                let month = last_month + Months::new(step as u32);
                json!({
                    "period": month.format("%Y-%m").to_string(),
                    "forecast": round2(moving_average + trend * step as f64),
                    "confidence": round4(CONFIDENCE_DECAY.powi(step as i32)),
                })
            })
            .collect();
        let trend_label = self.trend_label(trend, &totals);

        info!(
            "Generated {}-period forecast from {} months of history (trend: {})",
            self.forecast_periods,
            totals.len(),
            trend_label
        );

        Ok(data
            .iter()
            .map(|record| {
                let mut annotated = record.clone();
                annotated.insert("ai_forecast".to_string(), Value::Array(forecasts.clone()));
                annotated.insert("ai_forecast_trend".to_string(), json!(trend_label));
                annotated
            })
            .collect())
    }
}
