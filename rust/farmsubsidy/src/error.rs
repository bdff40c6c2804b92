use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed")]
    Auth,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid search: {0}")]
    InvalidSearch(String),

    #[error("database error: {0:#}")]
    Backend(anyhow::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Backend(err.into())
    }

    fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidQuery(_)
                | ServiceError::InvalidRequest(_)
                | ServiceError::InvalidSearch(_)
                | ServiceError::Auth
        )
    }
}

/// Rows that fail to parse are a data problem, not a server fault.
impl From<csv::Error> for ServiceError {
    fn from(err: csv::Error) -> Self {
        ServiceError::InvalidRequest(format!("malformed row: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Auth => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidSearch(_) => StatusCode::BAD_REQUEST,
            ServiceError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if !self.is_client_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// A failure recorded by a batch operation that was told to keep going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    pub source: String,
    pub message: String,
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Collects errors for "record and continue" batch flows such as
/// `db import --ignore-errors`.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<RecordedError>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: impl Into<String>, err: &dyn fmt::Display) {
        self.errors.push(RecordedError {
            source: source.into(),
            message: err.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[RecordedError] {
        &self.errors
    }

    /// Fails with a summary of every recorded error, if there were any.
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let summary = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!("{} error(s) recorded: {summary}", self.errors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_reports_nothing_when_empty() {
        let collector = ErrorCollector::new();
        assert!(collector.is_empty());
        assert!(collector.into_result().is_ok());
    }

    #[test]
    fn collector_summarises_recorded_errors() {
        let mut collector = ErrorCollector::new();
        collector.record("a.csv", &"duplicate key");
        collector.record("b.csv", &ServiceError::Config("bad".into()));

        assert_eq!(collector.len(), 2);
        assert_eq!(collector.errors()[0].to_string(), "a.csv: duplicate key");

        let err = collector.into_result().unwrap_err().to_string();
        assert!(err.starts_with("2 error(s) recorded"), "got: {err}");
        assert!(err.contains("b.csv: configuration error: bad"), "got: {err}");
    }

    #[test]
    fn client_errors_are_not_logged_as_failures() {
        assert!(ServiceError::InvalidSearch("empty".into()).is_client_error());
        assert!(!ServiceError::backend(anyhow::anyhow!("boom")).is_client_error());
    }
}
