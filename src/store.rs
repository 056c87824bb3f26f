//! Single-slot store for the most recently processed batch.
//!
//! Writers are serialized by a mutex so only one batch is published at a
//! time. The slot itself sits behind a read/write lock and holds an `Arc`, so
//! a reader always gets a complete batch, either the previous one or the new
//! one.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::compute_report;
use crate::error::ValidationErrors;
use crate::models::Report;
use crate::validate::{validate_and_normalize, RawBatch};

#[derive(Debug, Clone)]
pub struct ProcessedBatch {
    pub batch_id: Uuid,
    pub source: String,
    pub processed_at: DateTime<Utc>,
    pub config: EngineConfig,
    pub report: Report,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStatus {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub last_processed: Option<DateTime<Utc>>,
    pub batch_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct Slot {
    batch: Option<Arc<ProcessedBatch>>,
    notes: Option<String>,
}

#[derive(Debug)]
pub struct LastResultStore {
    slot: RwLock<Slot>,
    writer: Mutex<()>,
    started: Instant,
}

impl Default for LastResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LastResultStore {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::default()),
            writer: Mutex::new(()),
            started: Instant::now(),
        }
    }

    /// Validates, computes and publishes a batch. A rejected batch leaves the
    /// previous result in place.
    pub fn process(
        &self,
        source: &str,
        raw: &RawBatch,
        config: EngineConfig,
    ) -> Result<Arc<ProcessedBatch>, ValidationErrors> {
        let _writer = self.writer.lock();
        let batch = validate_and_normalize(raw)?;
        let report = compute_report(&batch, &config);
        Ok(self.replace(source, report, config))
    }

    /// Publishes a report computed elsewhere, replacing the previous one.
    pub fn publish(&self, source: &str, report: Report, config: EngineConfig) -> Arc<ProcessedBatch> {
        let _writer = self.writer.lock();
        self.replace(source, report, config)
    }

    fn replace(&self, source: &str, report: Report, config: EngineConfig) -> Arc<ProcessedBatch> {
        let batch = Arc::new(ProcessedBatch {
            batch_id: Uuid::new_v4(),
            source: source.to_string(),
            processed_at: Utc::now(),
            config,
            report,
        });

        {
            let mut slot = self.slot.write();
            slot.batch = Some(Arc::clone(&batch));
            slot.notes = None;
        }

        info!(batch_id = %batch.batch_id, source, events = batch.report.events.len(), "batch published");
        batch
    }

    pub fn latest(&self) -> Option<Arc<ProcessedBatch>> {
        self.slot.read().batch.clone()
    }

    /// Audit notes for the current batch. Cleared when the next batch is published.
    ///
    /// Waits for any in-flight publish so notes never land on a batch that is
    /// about to be replaced.
    pub fn attach_notes(&self, notes: impl Into<String>) {
        let _writer = self.writer.lock();
        self.slot.write().notes = Some(notes.into());
    }

    pub fn notes(&self) -> Option<String> {
        self.slot.read().notes.clone()
    }

    pub fn status(&self) -> StoreStatus {
        let slot = self.slot.read();
        StoreStatus {
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.started.elapsed().as_secs(),
            last_processed: slot.batch.as_ref().map(|batch| batch.processed_at),
            batch_id: slot.batch.as_ref().map(|batch| batch.batch_id),
        }
    }
}
