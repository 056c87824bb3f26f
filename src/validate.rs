//! Schema and privacy gate for uploaded batches.
//!
//! A batch either passes whole or is rejected whole: every missing column,
//! disallowed column and unparseable timestamp is collected and reported
//! together.

use tracing::{debug, warn};

use crate::error::{ValidationError, ValidationErrors};
use crate::models::Event;
use crate::timestamp::parse_timestamp;

pub const TIMESTAMP: &str = "Timestamp";
pub const OPERATOR_ID: &str = "Operator_ID";
pub const LOCATION: &str = "Location";
pub const DEVICE_ID: &str = "Device_ID";
pub const TEST_TYPE: &str = "Test_Type";

pub const REQUIRED_COLUMNS: [&str; 5] = [TIMESTAMP, OPERATOR_ID, LOCATION, DEVICE_ID, TEST_TYPE];

/// Columns that would carry patient or operator identity.
pub const PII_COLUMNS: [&str; 4] = ["Name", "Result", "MRN", "DOB"];

const ROW_SAMPLE: usize = 10;

/// Tabular input as received: a header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

/// A batch that passed validation, with every timestamp parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub events: Vec<Event>,
}

impl NormalizedBatch {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub fn validate_and_normalize(batch: &RawBatch) -> Result<NormalizedBatch, ValidationErrors> {
    let mut errors = Vec::new();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| batch.column_index(required).is_none())
        .map(|required| required.to_string())
        .collect();
    if !missing.is_empty() {
        errors.push(ValidationError::MissingColumns(missing));
    }

    let pii: Vec<String> = batch
        .columns
        .iter()
        .filter(|column| PII_COLUMNS.contains(&column.as_str()))
        .cloned()
        .collect();
    if !pii.is_empty() {
        errors.push(ValidationError::PrivacyColumns(pii));
    }

    let mut timestamps = Vec::with_capacity(batch.len());
    if let Some(index) = batch.column_index(TIMESTAMP) {
        let mut failed_rows = Vec::new();
        let mut failed = 0usize;

        for (row_number, row) in batch.rows.iter().enumerate() {
            match parse_timestamp(cell(row, index)) {
                Ok(parsed) => timestamps.push(parsed),
                Err(err) => {
                    debug!(row = row_number + 1, %err, "timestamp rejected");
                    failed += 1;
                    if failed_rows.len() < ROW_SAMPLE {
                        failed_rows.push(row_number + 1);
                    }
                }
            }
        }

        if failed > 0 {
            errors.push(ValidationError::UnparseableTimestamps {
                count: failed,
                rows: failed_rows,
            });
        }
    }

    if !errors.is_empty() {
        let errors = ValidationErrors(errors);
        warn!(rows = batch.len(), %errors, "batch rejected");
        return Err(errors);
    }

    // Every required column is present once no error was recorded.
    let index_of = |name: &str| batch.column_index(name).unwrap_or_default();
    let operator = index_of(OPERATOR_ID);
    let location = index_of(LOCATION);
    let device = index_of(DEVICE_ID);
    let test_type = index_of(TEST_TYPE);

    let events = batch
        .rows
        .iter()
        .zip(timestamps)
        .map(|(row, timestamp)| Event {
            timestamp,
            operator_id: cell(row, operator).to_string(),
            location: cell(row, location).to_string(),
            device_id: cell(row, device).to_string(),
            test_type: cell(row, test_type).to_string(),
        })
        .collect();

    Ok(NormalizedBatch::new(events))
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(extra: &[&str]) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .chain(extra.iter())
            .map(|c| c.to_string())
            .collect()
    }

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn accepts_valid_batch_and_parses_timestamps() {
        let batch = RawBatch::new(
            header(&["Notes"]),
            vec![
                row(&["2024-03-01 08:00", "O1", "ED", "D1", "Glucose", "ok"]),
                row(&["01/03/2024 08:05", "O2", "ICU", "D2", "INR", ""]),
            ],
        );

        let normalized = validate_and_normalize(&batch).unwrap();
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized.events[1].operator_id, "O2");
        assert_eq!(normalized.events[1].location, "ICU");
        assert_eq!(normalized.events[1].test_type, "INR");
        assert_eq!(
            normalized.events[1].timestamp - normalized.events[0].timestamp,
            chrono::Duration::minutes(5)
        );
    }

    #[test]
    fn columns_may_appear_in_any_order() {
        let batch = RawBatch::new(
            row(&["Device_ID", "Test_Type", "Operator_ID", "Timestamp", "Location"]),
            vec![row(&["D9", "Glucose", "O7", "2024-03-01 09:30", "Ward 3"])],
        );

        let event = &validate_and_normalize(&batch).unwrap().events[0];
        assert_eq!(event.device_id, "D9");
        assert_eq!(event.operator_id, "O7");
        assert_eq!(event.location, "Ward 3");
    }

    #[test]
    fn result_column_is_a_privacy_rejection() {
        let batch = RawBatch::new(
            header(&["Result"]),
            vec![row(&["2024-03-01 08:00", "O1", "ED", "D1", "Glucose", "5.4"])],
        );

        let errors = validate_and_normalize(&batch).unwrap_err();
        assert_eq!(
            errors.0,
            vec![ValidationError::PrivacyColumns(vec!["Result".to_string()])]
        );
        assert!(errors.to_string().contains("Result"));
    }

    #[test]
    fn reports_every_missing_column() {
        let batch = RawBatch::new(row(&["Timestamp", "Operator_ID", "Test_Type"]), vec![]);

        let errors = validate_and_normalize(&batch).unwrap_err();
        assert_eq!(
            errors.0,
            vec![ValidationError::MissingColumns(vec![
                "Location".to_string(),
                "Device_ID".to_string()
            ])]
        );
    }

    #[test]
    fn collects_schema_privacy_and_parse_errors_together() {
        let batch = RawBatch::new(
            row(&["Timestamp", "Operator_ID", "MRN", "DOB"]),
            vec![row(&["not a time", "O1", "123", "1980-01-01"])],
        );

        let errors = validate_and_normalize(&batch).unwrap_err();
        assert_eq!(errors.0.len(), 3);
        assert!(matches!(errors.0[0], ValidationError::MissingColumns(_)));
        assert_eq!(
            errors.0[1],
            ValidationError::PrivacyColumns(vec!["MRN".to_string(), "DOB".to_string()])
        );
        assert_eq!(
            errors.0[2],
            ValidationError::UnparseableTimestamps { count: 1, rows: vec![1] }
        );
    }

    #[test]
    fn one_bad_timestamp_rejects_the_whole_batch() {
        let batch = RawBatch::new(
            header(&[]),
            vec![
                row(&["2024-03-01 08:00", "O1", "ED", "D1", "Glucose"]),
                row(&["2024-13-45 08:00", "O1", "ED", "D1", "Glucose"]),
                row(&["2024-03-01 08:10", "O1", "ED", "D1", "Glucose"]),
            ],
        );

        let errors = validate_and_normalize(&batch).unwrap_err();
        assert_eq!(
            errors.0,
            vec![ValidationError::UnparseableTimestamps { count: 1, rows: vec![2] }]
        );
    }

    #[test]
    fn short_rows_fail_on_the_missing_timestamp() {
        let batch = RawBatch::new(header(&[]), vec![row(&[])]);
        assert!(validate_and_normalize(&batch).is_err());
    }

    #[test]
    fn empty_batch_with_valid_header_is_accepted() {
        let batch = RawBatch::new(header(&[]), vec![]);
        assert!(validate_and_normalize(&batch).unwrap().is_empty());
    }
}
