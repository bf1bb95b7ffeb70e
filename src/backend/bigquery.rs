//! BigQuery REST backend
//!
//! Runs queries through the synchronous `jobs.query` endpoint and decodes the
//! `schema` + `rows[].f[].v` payload into aggregate rows.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::QueryBackend;
use crate::error::BackendError;
use crate::models::{AggregateRow, Scalar};

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub base_url: String,
    pub project: String,
    /// Pre-issued OAuth access token; obtaining one is out of scope
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl BigQueryConfig {
    pub fn new(project: &str) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            project: project.to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct BigQueryBackend {
    config: BigQueryConfig,
    client: reqwest::Client,
}

impl BigQueryBackend {
    pub fn new(config: BigQueryConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn queries_url(&self) -> String {
        format!(
            "{}/projects/{}/queries",
            self.config.base_url.trim_end_matches('/'),
            self.config.project
        )
    }
}

#[async_trait]
impl QueryBackend for BigQueryBackend {
    async fn execute(&self, sql: &str) -> Result<Vec<AggregateRow>, BackendError> {
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": self.config.timeout.as_millis() as u64,
        });

        let mut request = self.client.post(self.queries_url()).json(&body);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = response.json().await?;
        let rows = decode_response(payload)?;
        debug!("BigQuery returned {} rows", rows.len());
        Ok(rows)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_complete: Option<bool>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    message: String,
}

/// Decode a `jobs.query` response body.
pub fn decode_response(payload: Value) -> Result<Vec<AggregateRow>, BackendError> {
    let response: QueryResponse =
        serde_json::from_value(payload).map_err(|e| BackendError::Decode(e.to_string()))?;

    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(BackendError::Job(messages.join("; ")));
    }
    if response.job_complete == Some(false) {
        return Err(BackendError::JobIncomplete);
    }

    let fields = response.schema.map(|s| s.fields).unwrap_or_default();
    response
        .rows
        .into_iter()
        .map(|row| {
            if row.f.len() != fields.len() {
                return Err(BackendError::Decode(format!(
                    "row has {} cells but schema has {} fields",
                    row.f.len(),
                    fields.len()
                )));
            }
            let mut out = AggregateRow::new();
            for (field, cell) in fields.iter().zip(row.f) {
                out.insert(&field.name, decode_cell(field, cell.v)?);
            }
            Ok(out)
        })
        .collect()
}

fn decode_cell(field: &FieldSchema, value: Value) -> Result<Scalar, BackendError> {
    let raw = match value {
        Value::Null => return Ok(Scalar::Null),
        Value::String(s) => s,
        other => {
            return Err(BackendError::Decode(format!(
                "unsupported value for column {}: {}",
                field.name, other
            )))
        }
    };

    let bad = |kind: &str| {
        BackendError::Decode(format!("column {}: {:?} is not a valid {}", field.name, raw, kind))
    };

    match field.field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => raw.parse().map(Scalar::Int).map_err(|_| bad("integer")),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            raw.parse().map(Scalar::Float).map_err(|_| bad("number"))
        }
        "DATE" => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Scalar::Date)
            .map_err(|_| bad("date")),
        _ => Ok(Scalar::Str(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_date;

    #[test]
    fn test_decode_rows() {
        let payload = json!({
            "jobComplete": true,
            "schema": {"fields": [
                {"name": "period", "type": "DATE"},
                {"name": "trip_count", "type": "INTEGER"},
                {"name": "avg_duration_sec", "type": "FLOAT"},
                {"name": "rideable_type", "type": "STRING"}
            ]},
            "rows": [
                {"f": [{"v": "2024-01-01"}, {"v": "1000"}, {"v": "900.5"}, {"v": "classic_bike"}]},
                {"f": [{"v": "2024-01-02"}, {"v": "12"}, {"v": null}, {"v": null}]}
            ]
        });

        let rows = decode_response(payload).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_date("period"), Some(parse_date("2024-01-01").unwrap()));
        assert_eq!(rows[0].get_i64("trip_count"), Some(1000));
        assert_eq!(rows[0].get_f64("avg_duration_sec"), Some(900.5));
        assert_eq!(rows[0].get_str("rideable_type"), Some("classic_bike"));
        assert!(rows[1].get("avg_duration_sec").unwrap().is_null());
    }

    #[test]
    fn test_empty_result_is_valid() {
        let payload = json!({
            "jobComplete": true,
            "schema": {"fields": [{"name": "trip_count", "type": "INTEGER"}]}
        });
        assert!(decode_response(payload).unwrap().is_empty());
    }

    #[test]
    fn test_incomplete_job() {
        let payload = json!({"jobComplete": false});
        assert!(matches!(decode_response(payload), Err(BackendError::JobIncomplete)));
    }

    #[test]
    fn test_job_errors() {
        let payload = json!({
            "jobComplete": true,
            "errors": [{"message": "Unrecognized name: foo", "reason": "invalidQuery"}]
        });
        match decode_response(payload) {
            Err(BackendError::Job(msg)) => assert!(msg.contains("Unrecognized name")),
            other => panic!("expected job error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_cell_value() {
        let payload = json!({
            "jobComplete": true,
            "schema": {"fields": [{"name": "trips", "type": "INT64"}]},
            "rows": [{"f": [{"v": "many"}]}]
        });
        assert!(matches!(decode_response(payload), Err(BackendError::Decode(_))));
    }

    #[test]
    fn test_row_width_mismatch() {
        let payload = json!({
            "jobComplete": true,
            "schema": {"fields": [
                {"name": "a", "type": "STRING"},
                {"name": "b", "type": "STRING"}
            ]},
            "rows": [{"f": [{"v": "x"}]}]
        });
        assert!(matches!(decode_response(payload), Err(BackendError::Decode(_))));
    }

    #[test]
    fn test_queries_url() {
        let mut config = BigQueryConfig::new("my-project");
        config.base_url = "http://localhost:9050/bigquery/v2/".into();
        let backend = BigQueryBackend::new(config).unwrap();
        assert_eq!(
            backend.queries_url(),
            "http://localhost:9050/bigquery/v2/projects/my-project/queries"
        );
    }
}
