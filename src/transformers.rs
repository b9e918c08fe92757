use std::collections::{BTreeMap, HashSet};

use serde_json::{json, Value};
use tracing::info;

use crate::error::Result;
use crate::types::{numeric_field, Record, RecordSet, Transformer};

/// Keep only records matching a predicate.
pub struct FilterTransformer {
    predicate: Box<dyn Fn(&Record) -> bool + Send + Sync>,
    name: String,
}

impl FilterTransformer {
    pub fn new(predicate: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
            name: "FilterTransformer".to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Transformer for FilterTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        let kept: RecordSet = data
            .iter()
            .filter(|record| (self.predicate)(record))
            .cloned()
            .collect();
        info!("Filtered: {} → {} records", data.len(), kept.len());
        Ok(kept)
    }
}

/// Rewrite each record with a mapping function.
pub struct MapTransformer {
    mapper: Box<dyn Fn(&Record) -> Record + Send + Sync>,
    name: String,
}

impl MapTransformer {
    pub fn new(mapper: impl Fn(&Record) -> Record + Send + Sync + 'static) -> Self {
        Self {
            mapper: Box::new(mapper),
            name: "MapTransformer".to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Transformer for MapTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        Ok(data.iter().map(|record| (self.mapper)(record)).collect())
    }
}

/// Aggregation operators for [`AggregateTransformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregateOp {
    fn suffix(&self) -> &'static str {
        match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Count => "count",
            AggregateOp::Avg => "avg",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        }
    }
}

/// Group records by key fields and compute numeric aggregates per group.
///
/// Output records carry the grouping fields plus one `{field}_{op}` field
/// per aggregation. Groups are emitted in sorted key order.
pub struct AggregateTransformer {
    group_by: Vec<String>,
    aggregations: Vec<(String, AggregateOp)>,
    name: String,
}

impl AggregateTransformer {
    pub fn new(group_by: Vec<String>, aggregations: Vec<(String, AggregateOp)>) -> Self {
        Self {
            group_by,
            aggregations,
            name: "AggregateTransformer".to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

fn group_key(record: &Record, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .map(|field| {
            record
                .get(field)
                .map_or_else(|| "null".to_string(), Value::to_string)
        })
        .collect()
}

impl Transformer for AggregateTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        let mut groups: BTreeMap<Vec<String>, (Record, Vec<Vec<f64>>)> = BTreeMap::new();

        for record in data {
            let key = group_key(record, &self.group_by);
            let entry = groups.entry(key).or_insert_with(|| {
                let mut keys = Record::new();
                for field in &self.group_by {
                    keys.insert(
                        field.clone(),
                        record.get(field).cloned().unwrap_or(Value::Null),
                    );
                }
                (keys, vec![Vec::new(); self.aggregations.len()])
            });
            for (i, (field, _)) in self.aggregations.iter().enumerate() {
                if let Some(value) = numeric_field(record, field) {
                    entry.1[i].push(value);
                }
            }
        }

        let mut result = Vec::new();
        for (_, (keys, value_sets)) in groups {
            let mut aggregated = keys;
            for ((field, op), values) in self.aggregations.iter().zip(&value_sets) {
                let output = match op {
                    AggregateOp::Sum => json!(values.iter().sum::<f64>()),
                    AggregateOp::Count => json!(values.len()),
                    AggregateOp::Avg => {
                        if values.is_empty() {
                            json!(0.0)
                        } else {
                            json!(values.iter().sum::<f64>() / values.len() as f64)
                        }
                    }
                    AggregateOp::Min => values
                        .iter()
                        .cloned()
                        .fold(None, |acc: Option<f64>, v| {
                            Some(acc.map_or(v, |a| a.min(v)))
                        })
                        .map_or(Value::Null, |v| json!(v)),
                    AggregateOp::Max => values
                        .iter()
                        .cloned()
                        .fold(None, |acc: Option<f64>, v| {
                            Some(acc.map_or(v, |a| a.max(v)))
                        })
                        .map_or(Value::Null, |v| json!(v)),
                };
                aggregated.insert(format!("{}_{}", field, op.suffix()), output);
            }
            result.push(aggregated);
        }

        info!("Aggregated {} records into {} groups", data.len(), result.len());
        Ok(result)
    }
}

/// Append fields from a lookup function to every record.
pub struct EnrichTransformer {
    enricher: Box<dyn Fn(&Record) -> Record + Send + Sync>,
    name: String,
}

impl EnrichTransformer {
    pub fn new(enricher: impl Fn(&Record) -> Record + Send + Sync + 'static) -> Self {
        Self {
            enricher: Box::new(enricher),
            name: "EnrichTransformer".to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Transformer for EnrichTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        Ok(data
            .iter()
            .map(|record| {
                let mut enriched = record.clone();
                for (field, value) in (self.enricher)(record) {
                    enriched.insert(field, value);
                }
                enriched
            })
            .collect())
    }
}

/// Which duplicate to keep in [`DeduplicateTransformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    First,
    Last,
}

/// Drop records whose key fields match an already-seen record.
pub struct DeduplicateTransformer {
    keys: Vec<String>,
    keep: Keep,
    name: String,
}

impl DeduplicateTransformer {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            keep: Keep::First,
            name: "DeduplicateTransformer".to_string(),
        }
    }

    pub fn keep(mut self, keep: Keep) -> Self {
        self.keep = keep;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Transformer for DeduplicateTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();

        let scan: Box<dyn Iterator<Item = &Record>> = match self.keep {
            Keep::First => Box::new(data.iter()),
            Keep::Last => Box::new(data.iter().rev()),
        };
        for record in scan {
            if seen.insert(group_key(record, &self.keys)) {
                kept.push(record.clone());
            }
        }
        if self.keep == Keep::Last {
            kept.reverse();
        }

        info!("Deduplicated: {} → {} records", data.len(), kept.len());
        Ok(kept)
    }
}
