use thiserror::Error;

/// User-facing failures of a single search. `Display` is the banner text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DashboardError {
    #[error("Please enter a Student ID")]
    Validation,

    #[error("No records found for this student ID")]
    EmptyResult,

    #[error("Error fetching student data")]
    Fetch { reason: String },
}

impl DashboardError {
    pub fn fetch(reason: impl std::fmt::Display) -> Self {
        DashboardError::Fetch {
            reason: reason.to_string(),
        }
    }
}

/// Failures of the remote stream itself.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store answered with status {0}")]
    Status(u16),

    #[error("malformed stream event: {0}")]
    Malformed(String),

    #[error("query cancelled by the store: {0}")]
    Cancelled(String),

    #[error("credentials revoked by the store")]
    AuthRevoked,

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// A snapshot whose shape does not match attendance records.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected an object, array or null snapshot, got {0}")]
    UnexpectedShape(&'static str),

    #[error("record {key} is invalid: {message}")]
    InvalidRecord { key: String, message: String },
}

impl From<StoreError> for DashboardError {
    fn from(err: StoreError) -> Self {
        DashboardError::fetch(err)
    }
}

impl From<DecodeError> for DashboardError {
    fn from(err: DecodeError) -> Self {
        DashboardError::fetch(err)
    }
}
