//! Flags POCT device usage patterns consistent with operator barcode sharing.
//!
//! The two entry points are [`validate_and_normalize`], which gates a raw
//! upload on schema, privacy and timestamp checks, and [`compute_report`],
//! which raises six per-event flags and rolls them up per operator, per
//! device and per hour.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod ingest;
pub mod models;
pub mod report;
pub mod store;
pub mod timeline;
pub mod timestamp;
pub mod validate;

pub use config::EngineConfig;
pub use engine::compute_report;
pub use error::{PayloadError, ValidationError, ValidationErrors};
pub use models::{EnrichedEvent, Event, Flags, Report};
pub use store::LastResultStore;
pub use validate::{validate_and_normalize, NormalizedBatch, RawBatch};
