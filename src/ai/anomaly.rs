use serde_json::{json, Value};
use tracing::info;

use crate::ai::{mean, population_std, round2};
use crate::error::Result;
use crate::types::{numeric_field, Record, RecordSet, Transformer};

/// Flag records whose monitored fields deviate from the batch.
///
/// Statistics are computed over the batch being transformed (population mean
/// and standard deviation), so the same record can score differently when
/// the surrounding record set changes. Zero-variance fields and fields with
/// fewer than two numeric values never flag anything.
pub struct AnomalyDetectionTransformer {
    fields: Vec<String>,
    sensitivity: f64,
    name: String,
}

impl AnomalyDetectionTransformer {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            sensitivity: 2.0,
            name: "AnomalyDetectionTransformer".to_string(),
        }
    }

    /// Standard-deviation multiplier at which a value counts as anomalous.
    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }
}

impl Transformer for AnomalyDetectionTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        info!("Analyzing {} records for anomalies", data.len());

        let mut flags: Vec<Vec<Value>> = vec![Vec::new(); data.len()];

        for field in &self.fields {
            let mut values = Vec::new();
            let mut indices = Vec::new();
            for (i, record) in data.iter().enumerate() {
                if let Some(value) = numeric_field(record, field) {
                    values.push(value);
                    indices.push(i);
                }
            }
            if values.len() < 2 {
                continue;
            }

            let field_mean = mean(&values);
            let std_dev = population_std(&values, field_mean);
            if std_dev == 0.0 {
                continue;
            }

            for (&index, &value) in indices.iter().zip(&values) {
                let zscore = (value - field_mean) / std_dev;
                if zscore.abs() >= self.sensitivity {
                    let severity = if zscore.abs() >= self.sensitivity * 1.5 {
                        "HIGH"
                    } else {
                        "MEDIUM"
                    };
                    flags[index].push(json!({
                        "field": field,
                        "zscore": round2(zscore),
                        "severity": severity,
                    }));
                }
            }
        }

        let flagged = flags.iter().filter(|f| !f.is_empty()).count();
        info!("Detected anomalies in {} of {} records", flagged, data.len());

        Ok(data
            .iter()
            .zip(flags)
            .map(|(record, anomalies)| {
                let mut annotated = record.clone();
                annotated.insert(
                    "ai_anomaly_detected".to_string(),
                    json!(!anomalies.is_empty()),
                );
                if !anomalies.is_empty() {
                    annotated.insert("ai_anomalies".to_string(), Value::Array(anomalies));
                }
                annotated
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records_with_amounts(amounts: &[f64]) -> RecordSet {
        amounts
            .iter()
            .map(|amount| {
                let mut record = Record::new();
                record.insert("amount".to_string(), json!(amount));
                record
            })
            .collect()
    }

    #[test]
    fn outlier_is_flagged() {
        let data = records_with_amounts(&[10.0, 10.0, 10.0, 10.0, 100.0]);
        let result = AnomalyDetectionTransformer::new(vec!["amount".to_string()])
            .transform(&data)
            .unwrap();

        assert_eq!(result[4]["ai_anomaly_detected"], json!(true));
        let anomalies = result[4]["ai_anomalies"].as_array().unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0]["field"], json!("amount"));
        // mean 28, stddev 36: z = (100 - 28) / 36 = 2.0, right at the default
        // sensitivity, below the 3.0 HIGH cutoff.
        assert_eq!(anomalies[0]["zscore"], json!(2.0));
        assert_eq!(anomalies[0]["severity"], json!("MEDIUM"));

        for record in &result[..4] {
            assert_eq!(record["ai_anomaly_detected"], json!(false));
            assert!(!record.contains_key("ai_anomalies"));
        }
    }

    #[test]
    fn extreme_outlier_is_high_severity() {
        let mut amounts = vec![10.0; 20];
        amounts[0] = 9.0;
        amounts[19] = 500.0;
        let data = records_with_amounts(&amounts);
        let result = AnomalyDetectionTransformer::new(vec!["amount".to_string()])
            .transform(&data)
            .unwrap();

        let anomalies = result[19]["ai_anomalies"].as_array().unwrap();
        assert_eq!(anomalies[0]["severity"], json!("HIGH"));
    }

    #[test]
    fn zero_variance_flags_nothing() {
        let data = records_with_amounts(&[10.0, 10.0, 10.0]);
        let result = AnomalyDetectionTransformer::new(vec!["amount".to_string()])
            .transform(&data)
            .unwrap();
        assert!(result
            .iter()
            .all(|r| r["ai_anomaly_detected"] == json!(false)));
    }

    #[test]
    fn non_numeric_and_missing_values_are_skipped() {
        let mut data = records_with_amounts(&[10.0, 10.0, 10.0, 100.0]);
        data[1].insert("amount".to_string(), json!("not a number"));
        data[2].remove("amount");
        // Only two numeric values remain: stddev is non-zero but no value
        // reaches two standard deviations in a two-point batch.
        let result = AnomalyDetectionTransformer::new(vec!["amount".to_string()])
            .transform(&data)
            .unwrap();
        assert!(result
            .iter()
            .all(|r| r["ai_anomaly_detected"] == json!(false)));
    }

    #[test]
    fn sensitivity_controls_the_flagging_threshold() {
        let data = records_with_amounts(&[10.0, 10.0, 10.0, 10.0, 100.0]);
        let result = AnomalyDetectionTransformer::new(vec!["amount".to_string()])
            .with_sensitivity(2.5)
            .transform(&data)
            .unwrap();
        // z = 2.0 stays under the raised threshold.
        assert!(result
            .iter()
            .all(|r| r["ai_anomaly_detected"] == json!(false)));
    }

    #[test]
    fn detection_is_idempotent() {
        let data = records_with_amounts(&[10.0, 10.0, 10.0, 10.0, 100.0]);
        let transformer = AnomalyDetectionTransformer::new(vec!["amount".to_string()]);
        let once = transformer.transform(&data).unwrap();
        let twice = transformer.transform(&once).unwrap();
        assert_eq!(once, twice);
    }
}
