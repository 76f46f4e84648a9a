//! Chunked client for business-application query (BAQ) REST endpoints.
//!
//! List filters longer than the server allows are split into batches, one
//! request is issued per batch combination, rows are merged and deduplicated,
//! and requested values that never came back are written to a side report.

/// HTTP client and query execution.
pub mod client;
/// Input validation and per-request failures.
pub mod error;
/// Structured diagnostics and observers.
pub mod events;
/// Typed filters, selections and query requests.
pub mod filters;
/// Batch planning for oversized list filters.
pub mod plan;
pub mod report;
/// Found-value tracking, missing values and row deduplication.
pub mod tracker;

pub use client::{BaqClient, ClientConfig, DryRun, PlannedRequest, QueryReport};
pub use error::QueryError;
pub use events::{QueryEvent, QueryObserver, TracingObserver};
pub use filters::{FilterScalar, FilterValue, Filters, QueryRequest, Select};
pub use tracker::{MissingValues, Row};
