use std::path::Path;

use tracing::{debug, info};

use crate::error::PayloadError;
use crate::validate::RawBatch;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Reads an upload from disk after checking its type and size.
pub async fn read_payload(path: &Path, max_bytes: u64) -> Result<Vec<u8>, PayloadError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension != "csv" {
        return Err(PayloadError::UnsupportedFileType(path.display().to_string()));
    }

    let size = tokio::fs::metadata(path).await?.len();
    if size > max_bytes {
        return Err(PayloadError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let bytes = tokio::fs::read(path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "payload read");
    Ok(bytes)
}

/// Decodes CSV bytes into a raw batch. Every cell stays a string.
pub fn parse_csv(bytes: &[u8]) -> Result<RawBatch, PayloadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    info!(columns = columns.len(), rows = rows.len(), "csv decoded");
    Ok(RawBatch::new(columns, rows))
}
