use serde_json::{Map, Value};

use crate::error::Result;

/// A single flat record: field name to scalar value.
///
/// Field sets need not be uniform across the records of a set; a field that
/// is absent is simply absent, never null-padded.
pub type Record = Map<String, Value>;

/// An ordered collection of records flowing between stages.
pub type RecordSet = Vec<Record>;

/// A stage that produces records from somewhere outside the pipeline.
pub trait RecordSource: Send + Sync {
    /// Identifier used in hooks, errors and metadata.
    fn name(&self) -> &str;

    /// Fetch all records from this source.
    fn fetch(&self) -> Result<RecordSet>;
}

/// A stage that maps one record set to another.
///
/// Transformers must be pure with respect to their input: the incoming
/// records are borrowed and a fresh set is returned, so a failed downstream
/// stage can still observe the pre-transform data.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, data: &[Record]) -> Result<RecordSet>;
}

/// A stage that consumes records, leaving the pipeline data untouched.
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    fn write(&self, data: &[Record]) -> Result<()>;
}

/// The closed set of stage capabilities the orchestrator knows how to run.
pub enum Stage {
    Source(Box<dyn RecordSource>),
    Transform(Box<dyn Transformer>),
    Destination(Box<dyn Destination>),
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::Source(source) => source.name(),
            Stage::Transform(transformer) => transformer.name(),
            Stage::Destination(destination) => destination.name(),
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Stage::Source(_) => "Source",
            Stage::Transform(_) => "Transform",
            Stage::Destination(_) => "Destination",
        };
        write!(f, "Stage::{}({:?})", kind, self.name())
    }
}

/// Read a field as a number, coercing numeric strings.
///
/// CSV sources yield every value as a string, so "125000" must count as a
/// number for scoring and statistics. Booleans and nulls do not coerce.
pub fn numeric_field(record: &Record, field: &str) -> Option<f64> {
    match record.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read a field as text, returning None for non-string values.
pub fn text_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    match record.get(field)? {
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
}
