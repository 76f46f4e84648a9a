use reqwest::StatusCode;
use thiserror::Error;

/// Input shape problems, reported before any request is issued.
///
/// Nothing that happens on the wire surfaces through this type; per-plan
/// failures are contained inside the client and reported as events.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query name must not be empty")]
    EmptyQueryName,
    #[error("invalid select: {reason}")]
    InvalidSelect { reason: String },
    #[error("invalid filters: {reason}")]
    InvalidFilters { reason: String },
    #[error("invalid value for filter '{key}': {reason}")]
    InvalidFilterValue { key: String, reason: String },
    #[error("list filter '{key}' must contain at least one value")]
    EmptyFilterList { key: String },
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Why a single plan request produced no rows.
#[derive(Debug, Error)]
pub(crate) enum RequestFailure {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("HTTP error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed response body: {0}")]
    MalformedBody(#[source] serde_json::Error),
}
