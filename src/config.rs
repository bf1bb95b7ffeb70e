//! Command-line and environment configuration shared by both binaries.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::backend::{
    BigQueryBackend, BigQueryConfig, CachedBackend, FixtureBackend, QueryBackend, QueryCache,
    SystemClock,
};
use crate::backend::bigquery::DEFAULT_BASE_URL;
use crate::catalog::{TableRef, DEFAULT_TABLE, DEFAULT_TOP_STATIONS};
use crate::dashboard::{Dashboard, EngineSettings};

#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// Billing project for queries (defaults to the table's project)
    #[arg(long, env = "BQ_PROJECT")]
    pub project: Option<String>,

    /// Fully qualified trips table, `project.dataset.table`
    #[arg(long, env = "BQ_TABLE", default_value = DEFAULT_TABLE)]
    pub table: String,

    #[arg(long, env = "BIGQUERY_URL", default_value = DEFAULT_BASE_URL)]
    pub bigquery_url: String,

    /// OAuth access token sent as a bearer token
    #[arg(long, env = "BIGQUERY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Result cache time-to-live in seconds
    #[arg(long, default_value_t = 3600)]
    pub cache_ttl_secs: u64,

    /// Per-query timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub query_timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_TOP_STATIONS)]
    pub top_stations: usize,

    /// Serve canned rows from a JSON file instead of querying BigQuery
    #[arg(long)]
    pub fixture: Option<PathBuf>,
}

impl EngineArgs {
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        let table = TableRef::parse(&self.table)?;
        Ok(EngineSettings {
            table,
            top_stations: self.top_stations,
            query_timeout: Duration::from_secs(self.query_timeout_secs),
        })
    }

    pub fn build_backend(&self, settings: &EngineSettings) -> Result<Arc<dyn QueryBackend>> {
        if let Some(path) = &self.fixture {
            info!("Using fixture backend from {}", path.display());
            return Ok(Arc::new(FixtureBackend::from_json_file(path)?));
        }

        let project = self
            .project
            .clone()
            .unwrap_or_else(|| settings.table.project().to_string());
        let config = BigQueryConfig {
            base_url: self.bigquery_url.clone(),
            project,
            access_token: self.access_token.clone(),
            timeout: settings.query_timeout,
        };
        info!(
            "Using BigQuery backend (project {}, cache TTL {}s)",
            config.project, self.cache_ttl_secs
        );

        let backend = BigQueryBackend::new(config).context("building BigQuery client")?;
        let cache = QueryCache::new(Arc::new(SystemClock));
        Ok(Arc::new(CachedBackend::new(
            backend,
            cache,
            Duration::from_secs(self.cache_ttl_secs),
        )))
    }

    pub fn build_dashboard(&self) -> Result<Dashboard> {
        let settings = self.engine_settings()?;
        let backend = self.build_backend(&settings)?;
        Ok(Dashboard::new(backend, settings))
    }
}
