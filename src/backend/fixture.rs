//! Fixture backend
//!
//! Answers catalog queries with canned rows keyed by the query's view tag.
//! Used by the test suite and by `--fixture` runs without a warehouse.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::QueryBackend;
use crate::catalog::{view_tag, View};
use crate::error::BackendError;
use crate::models::AggregateRow;

#[derive(Default)]
pub struct FixtureBackend {
    responses: HashMap<View, Vec<AggregateRow>>,
    failures: HashMap<View, String>,
    received: Mutex<Vec<String>>,
}

impl FixtureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, view: View, rows: Vec<AggregateRow>) -> Self {
        self.responses.insert(view, rows);
        self
    }

    pub fn with_failure(mut self, view: View, cause: &str) -> Self {
        self.failures.insert(view, cause.to_string());
        self
    }

    /// Load a JSON object mapping view keys to arrays of row objects.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<AggregateRow>> =
            serde_json::from_str(text).context("parsing fixture JSON")?;
        let mut backend = FixtureBackend::new();
        for (key, rows) in raw {
            let view = View::from_key(&key)
                .with_context(|| format!("unknown view {:?} in fixture", key))?;
            backend.responses.insert(view, rows);
        }
        Ok(backend)
    }

    /// Every query text received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueryBackend for FixtureBackend {
    async fn execute(&self, sql: &str) -> Result<Vec<AggregateRow>, BackendError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(sql.to_string());
        }

        let view = view_tag(sql)
            .and_then(View::from_key)
            .ok_or_else(|| BackendError::Job("query carries no known view tag".to_string()))?;

        if let Some(cause) = self.failures.get(&view) {
            return Err(BackendError::Job(cause.clone()));
        }
        Ok(self.responses.get(&view).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rows_by_view_tag() {
        let backend = FixtureBackend::new()
            .with_rows(View::RiderMix, vec![AggregateRow::new().with("trip_count", 3i64)]);

        let rows = backend.execute("-- view: rider_mix\nSELECT 1").await.unwrap();
        assert_eq!(rows[0].get_i64("trip_count"), Some(3));

        let rows = backend.execute("-- view: top_stations\nSELECT 1").await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(backend.received().len(), 2);
    }

    #[tokio::test]
    async fn test_failures_and_untagged() {
        let backend = FixtureBackend::new().with_failure(View::TopStations, "quota exceeded");
        assert!(backend.execute("-- view: top_stations\nSELECT 1").await.is_err());
        assert!(backend.execute("SELECT 1").await.is_err());
    }

    #[test]
    fn test_from_json() {
        let backend = FixtureBackend::from_json_str(
            r#"{"insight_base": [{"trips": 1000, "avg_duration_sec": 900.0}]}"#,
        )
        .unwrap();
        assert_eq!(backend.responses[&View::InsightBase][0].get_i64("trips"), Some(1000));
        let columns: Vec<&str> = backend.responses[&View::InsightBase][0].column_names().collect();
        assert_eq!(columns, vec!["trips", "avg_duration_sec"]);

        assert!(FixtureBackend::from_json_str(r#"{"nope": []}"#).is_err());
    }
}
