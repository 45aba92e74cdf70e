// 📂 Loader - Read an event batch from disk
// JSON array (input.txt) or CSV with the same columns

use crate::error::Result;
use crate::event::RawEvent;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Json,
    Csv,
}

impl InputFormat {
    /// `.csv` is CSV; anything else (`.json`, `.txt`, no extension) is JSON
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => InputFormat::Csv,
            _ => InputFormat::Json,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            InputFormat::Json => "JSON",
            InputFormat::Csv => "CSV",
        }
    }
}

/// EventBatch - raw records plus provenance of the file they came from
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub events: Vec<RawEvent>,
    pub format: InputFormat,

    /// Path as given by the caller
    pub source: String,

    /// Hex SHA-256 of the raw file bytes
    pub digest: String,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Load a batch, picking the format from the file extension
pub fn load_events(path: &Path) -> Result<EventBatch> {
    load_events_as(path, InputFormat::detect(path))
}

pub fn load_events_as(path: &Path, format: InputFormat) -> Result<EventBatch> {
    let bytes = fs::read(path)?;

    let events = match format {
        InputFormat::Json => parse_json_events(&bytes)?,
        InputFormat::Csv => parse_csv_events(&bytes)?,
    };

    info!(
        source = %path.display(),
        format = format.name(),
        events = events.len(),
        "loaded event batch"
    );

    Ok(EventBatch {
        events,
        format,
        source: path.display().to_string(),
        digest: compute_digest(&bytes),
    })
}

/// Parse a JSON array of event objects
pub fn parse_json_events(bytes: &[u8]) -> Result<Vec<RawEvent>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(bytes)?;
    Ok(values.iter().map(RawEvent::from_json).collect())
}

/// Parse CSV with a header row; extra columns are ignored
pub fn parse_csv_events(bytes: &[u8]) -> Result<Vec<RawEvent>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let mut events = Vec::new();
    for result in rdr.deserialize() {
        let raw: RawEvent = result?;
        events.push(raw);
    }

    Ok(events)
}

/// Hex SHA-256 of an input, used to tell whether two reports share an input
pub fn compute_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_JSON: &str = r#"[
        {"type": "CUSTOMER", "verb": "NEW", "key": "96f55c7d8f42", "event_time": "2017-01-06T12:46:46.384Z", "last_name": "Smith", "adr_city": "Middletown", "adr_state": "AK"},
        {"type": "SITE_VISIT", "verb": "NEW", "key": "ac05e815502f", "event_time": "2017-01-06T12:45:52.041Z", "customer_id": "96f55c7d8f42", "tags": [{"some key": "some value"}]},
        {"type": "IMAGE", "verb": "UPLOAD", "key": "d8ede43b1d9f", "event_time": "2017-01-06T12:47:12.344Z", "customer_id": "96f55c7d8f42", "camera_make": "Canon", "camera_model": "EOS 80D"},
        {"type": "ORDER", "verb": "NEW", "key": "68d84f8c", "event_time": "2017-01-06T12:55:55.555Z", "customer_id": "96f55c7d8f42", "total_amount": "12.34 USD"}
    ]"#;

    #[test]
    fn test_detect_format() {
        assert_eq!(InputFormat::detect(Path::new("input.txt")), InputFormat::Json);
        assert_eq!(InputFormat::detect(Path::new("events.json")), InputFormat::Json);
        assert_eq!(InputFormat::detect(Path::new("events.CSV")), InputFormat::Csv);
        assert_eq!(InputFormat::detect(Path::new("events")), InputFormat::Json);
    }

    #[test]
    fn test_parse_json_events() {
        let events = parse_json_events(SAMPLE_JSON.as_bytes()).unwrap();

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].event_type.as_deref(), Some("CUSTOMER"));
        assert_eq!(events[0].key.as_deref(), Some("96f55c7d8f42"));
        assert_eq!(events[3].total_amount.as_deref(), Some("12.34 USD"));
    }

    #[test]
    fn test_parse_json_rejects_non_array() {
        assert!(parse_json_events(br#"{"type": "CUSTOMER"}"#).is_err());
        assert!(parse_json_events(b"not json").is_err());
    }

    #[test]
    fn test_parse_csv_events() {
        let csv = "type,key,customer_id,event_time,total_amount,verb\n\
                   CUSTOMER,A,,2024-01-01,,NEW\n\
                   ORDER,o1,A,2024-01-08,100 USD,NEW\n";
        let events = parse_csv_events(csv.as_bytes()).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], RawEvent::new("CUSTOMER", "A", "2024-01-01"));
        assert_eq!(events[1].customer_id.as_deref(), Some("A"));
        assert_eq!(events[1].total_amount.as_deref(), Some("100 USD"));
    }

    #[test]
    fn test_parse_csv_keeps_cell_whitespace() {
        let csv = " type , key ,customer_id,event_time\n\
                   SITE_VISIT,v1, A ,2024-01-01\n";
        let events = parse_csv_events(csv.as_bytes()).unwrap();

        assert_eq!(events[0].event_type.as_deref(), Some("SITE_VISIT"));
        assert_eq!(events[0].customer_id.as_deref(), Some(" A "));
    }

    #[test]
    fn test_load_events_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(SAMPLE_JSON.as_bytes()).unwrap();
        file.flush().unwrap();

        let batch = load_events(file.path()).unwrap();

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.format, InputFormat::Json);
        assert_eq!(batch.digest, compute_digest(SAMPLE_JSON.as_bytes()));
        assert_eq!(batch.digest.len(), 64);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_events(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, crate::error::LtvError::Io(_)));
    }
}
