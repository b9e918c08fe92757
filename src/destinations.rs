use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{Destination, Record};

/// Render a field value for CSV output: strings plainly, everything else
/// (numbers, booleans, structured AI fields) as JSON text.
fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Write records to a CSV file.
///
/// The header is the sorted union of every field name in the set, so records
/// with uneven field sets serialize without loss.
pub struct CsvDestination {
    path: PathBuf,
    delimiter: u8,
    name: String,
}

impl CsvDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("CsvDestination({})", path.display());
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

impl Destination for CsvDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, data: &[Record]) -> Result<()> {
        if data.is_empty() {
            warn!("No data to write to {}", self.path.display());
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let fields: BTreeSet<&str> = data
            .iter()
            .flat_map(|record| record.keys().map(String::as_str))
            .collect();

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(&self.path)?;
        writer.write_record(&fields)?;
        for record in data {
            let row: Vec<String> = fields.iter().map(|f| csv_cell(record.get(*f))).collect();
            writer.write_record(&row)?;
        }
        writer.flush()?;

        info!("Wrote {} records to {}", data.len(), self.path.display());
        Ok(())
    }
}

/// Write records to a JSON file as an array of objects.
pub struct JsonDestination {
    path: PathBuf,
    pretty: bool,
    name: String,
}

impl JsonDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("JsonDestination({})", path.display());
        Self {
            path,
            pretty: true,
            name,
        }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }
}

impl Destination for JsonDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, data: &[Record]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        fs::write(&self.path, content)?;

        info!("Wrote {} records to {}", data.len(), self.path.display());
        Ok(())
    }
}

/// Print records to stdout for debugging.
pub struct ConsoleDestination {
    limit: Option<usize>,
    pretty: bool,
    name: String,
}

impl Default for ConsoleDestination {
    fn default() -> Self {
        Self {
            limit: Some(10),
            pretty: true,
            name: "ConsoleDestination".to_string(),
        }
    }
}

impl ConsoleDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print at most `limit` records; `None` prints everything.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn plain(mut self) -> Self {
        self.pretty = false;
        self
    }
}

impl Destination for ConsoleDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, data: &[Record]) -> Result<()> {
        let shown = self.limit.map_or(data.len(), |limit| limit.min(data.len()));
        let display = &data[..shown];

        if self.pretty {
            println!("{}", serde_json::to_string_pretty(display)?);
        } else {
            for record in display {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        if shown < data.len() {
            println!("\n... and {} more records", data.len() - shown);
        }
        Ok(())
    }
}

/// Send records to a webhook endpoint as JSON, optionally in batches.
pub struct WebhookDestination {
    url: String,
    headers: HashMap<String, String>,
    batch_size: Option<usize>,
    timeout: Duration,
    name: String,
}

impl WebhookDestination {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = format!("WebhookDestination({url})");
        Self {
            url,
            headers: HashMap::new(),
            batch_size: None,
            timeout: Duration::from_secs(30),
            name,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn send_batch(&self, client: &reqwest::blocking::Client, batch: &[Record]) -> Result<()> {
        info!("Sending {} records to {}", batch.len(), self.url);
        let response = client.post(&self.url).json(batch).send()?;
        response.error_for_status()?;
        Ok(())
    }
}

impl Destination for WebhookDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, data: &[Record]) -> Result<()> {
        if data.is_empty() {
            warn!("No data to send to {}", self.url);
            return Ok(());
        }

        let mut builder = reqwest::blocking::Client::builder().timeout(self.timeout);
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(key.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                header_map.insert(name, value);
            }
        }
        builder = builder.default_headers(header_map);
        let client = builder.build()?;

        match self.batch_size {
            Some(batch_size) if batch_size > 0 => {
                for batch in data.chunks(batch_size) {
                    self.send_batch(&client, batch)?;
                }
            }
            _ => self.send_batch(&client, data)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{CsvSource, JsonSource};
    use crate::types::RecordSource;
    use serde_json::json;

    fn sample_records() -> Vec<Record> {
        let mut first = Record::new();
        first.insert("id".to_string(), json!("D001"));
        first.insert("amount".to_string(), json!(45000));
        let mut second = Record::new();
        second.insert("id".to_string(), json!("D002"));
        second.insert("stage".to_string(), json!("proposal"));
        vec![first, second]
    }

    #[test]
    fn csv_destination_writes_union_of_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        CsvDestination::new(&path).write(&sample_records()).unwrap();

        let records = CsvSource::new(&path).fetch().unwrap();
        assert_eq!(records.len(), 2);
        // Header is the sorted union: amount, id, stage.
        assert_eq!(records[0]["amount"], json!("45000"));
        assert_eq!(records[1]["stage"], json!("proposal"));
        assert_eq!(records[1]["amount"], json!(""));
    }

    #[test]
    fn json_destination_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        JsonDestination::new(&path).write(&sample_records()).unwrap();

        let records = JsonSource::new(&path).fetch().unwrap();
        assert_eq!(records, sample_records());
    }

    #[test]
    fn empty_write_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        CsvDestination::new(&path).write(&[]).unwrap();
        assert!(!path.exists());
    }
}
