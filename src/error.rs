//! Error taxonomy for report creation and retrieval.
//!
//! Validation errors never leave the client. Remote errors are converted into
//! view state by the caller. Cache corruption has no variant here: it is
//! recovered inside the broker and only ever logged.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("select at least one statistic item")]
    NoStatisticItems,
    #[error("unknown statistic item: '{0}'")]
    UnknownItem(String),
    #[error("time range needs both a start and an end")]
    IncompleteRange,
    #[error("invalid time '{0}' (expected unix seconds or YYYY-MM-DD HH:MM[:SS])")]
    InvalidTime(String),
    #[error("start time must be earlier than end time")]
    InvertedRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("{0}")]
    Producer(String),
    #[error("no report data: {0}")]
    NotFound(String),
    #[error("report id not provided")]
    MissingId,
}

impl ReportError {
    /// Short label used when rendering a failed view.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Validation(_) => "validation",
            ReportError::Transport(_) => "transport",
            ReportError::Producer(_) => "producer",
            ReportError::NotFound(_) => "not_found",
            ReportError::MissingId => "missing_id",
        }
    }
}

impl From<reqwest::Error> for ReportError {
    fn from(err: reqwest::Error) -> Self {
        ReportError::Transport(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_user_facing() {
        assert_eq!(
            ValidationError::NoStatisticItems.to_string(),
            "select at least one statistic item"
        );
    }

    #[test]
    fn test_validation_wraps_transparently() {
        let err: ReportError = ValidationError::InvertedRange.into();
        assert_eq!(err.to_string(), "start time must be earlier than end time");
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_producer_message_is_verbatim() {
        let err = ReportError::Producer("no data".to_string());
        assert_eq!(err.to_string(), "no data");
        assert_eq!(err.kind(), "producer");
    }
}
