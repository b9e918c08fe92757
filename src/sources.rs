use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use crate::error::{Result, RevflowError};
use crate::types::{Record, RecordSet, RecordSource};

/// Read records from a CSV file.
///
/// The first row is taken as the header; every value is read as a string
/// (numeric coercion happens at field access, see [`crate::types::numeric_field`]).
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
    name: String,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("CsvSource({})", path.display());
        Self {
            path,
            delimiter: b',',
            name,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl RecordSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<RecordSet> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .from_path(&self.path)?;
        let headers = reader.headers()?.clone();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let mut record = Record::new();
            for (field, value) in headers.iter().zip(row.iter()) {
                record.insert(field.to_string(), Value::String(value.to_string()));
            }
            records.push(record);
        }

        info!("Fetched {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Read records from a JSON file holding an array of objects.
///
/// A single top-level object is accepted and wrapped in a one-record set.
pub struct JsonSource {
    path: PathBuf,
    name: String,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("JsonSource({})", path.display());
        Self { path, name }
    }
}

impl RecordSource for JsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<RecordSet> {
        let content = fs::read_to_string(&self.path)?;
        let parsed: Value = serde_json::from_str(&content)?;

        let records = match parsed {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(RevflowError::Malformed(format!(
                        "expected an array of objects, found {other}"
                    ))),
                })
                .collect::<Result<RecordSet>>()?,
            Value::Object(record) => vec![record],
            other => {
                return Err(RevflowError::Malformed(format!(
                    "expected a JSON array or object, found {other}"
                )))
            }
        };

        info!("Fetched {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Produce records from a custom function; useful for tests and demos.
pub struct GeneratorSource {
    generator: Box<dyn Fn() -> Result<RecordSet> + Send + Sync>,
    name: String,
}

impl GeneratorSource {
    pub fn new(generator: impl Fn() -> Result<RecordSet> + Send + Sync + 'static) -> Self {
        Self {
            generator: Box::new(generator),
            name: "GeneratorSource".to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl RecordSource for GeneratorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<RecordSet> {
        (self.generator)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn csv_source_reads_header_and_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,amount\nD001,45000\nD002,125000").unwrap();

        let records = CsvSource::new(file.path()).fetch().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], json!("D001"));
        assert_eq!(records[1]["amount"], json!("125000"));
    }

    #[test]
    fn csv_source_missing_file_is_an_error() {
        let result = CsvSource::new("/nonexistent/deals.csv").fetch();
        assert!(result.is_err());
    }

    #[test]
    fn json_source_accepts_array_and_single_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": "D001"}}, {{"id": "D002"}}]"#).unwrap();
        let records = JsonSource::new(file.path()).fetch().unwrap();
        assert_eq!(records.len(), 2);

        let mut single = tempfile::NamedTempFile::new().unwrap();
        write!(single, r#"{{"id": "D003"}}"#).unwrap();
        let records = JsonSource::new(single.path()).fetch().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!("D003"));
    }

    #[test]
    fn json_source_rejects_scalars() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "42").unwrap();
        assert!(matches!(
            JsonSource::new(file.path()).fetch(),
            Err(RevflowError::Malformed(_))
        ));
    }

    #[test]
    fn generator_source_yields_generated_records() {
        let source = GeneratorSource::new(|| {
            let mut record = Record::new();
            record.insert("id".to_string(), json!("G001"));
            Ok(vec![record])
        });
        let records = source.fetch().unwrap();
        assert_eq!(records.len(), 1);
    }
}
