//! Error taxonomy for the insight engine
//!
//! Validation errors halt a render before any query is issued. Backend errors
//! are caught per view and only degrade that view.

use chrono::NaiveDate;
use thiserror::Error;

/// Filter validation failures. Fatal to the render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("start date {start} must not be after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("invalid date {value:?}: expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("invalid grain {value:?}: expected daily or monthly")]
    InvalidGrain { value: String },
}

impl FilterError {
    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        FilterError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Raw failure reported by a query backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("warehouse returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("query job did not complete within the allotted time")]
    JobIncomplete,

    #[error("query job failed: {0}")]
    Job(String),
}

/// A single view's query failed or timed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query for view `{view}` failed: {cause}")]
pub struct BackendQueryError {
    /// Logical name of the view whose query failed
    pub view: String,
    pub query_text: String,
    pub cause: String,
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid table reference {0:?}: expected project.dataset.table")]
    InvalidTable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_message() {
        let err = FilterError::InvalidRange {
            start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "start date 2024-02-01 must not be after end date 2024-01-01"
        );
    }

    #[test]
    fn test_backend_query_error_names_view() {
        let err = BackendQueryError {
            view: "top_stations".into(),
            query_text: "SELECT 1".into(),
            cause: "boom".into(),
        };
        assert!(err.to_string().contains("top_stations"));
    }
}
