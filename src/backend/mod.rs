//! Query backends
//!
//! The engine only needs one capability from the warehouse: run a query
//! string and get rows back. Backends are injected into the dashboard as
//! `Arc<dyn QueryBackend>`.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::models::AggregateRow;

pub mod bigquery;
pub mod cache;
pub mod fixture;

pub use bigquery::{BigQueryBackend, BigQueryConfig};
pub use cache::{CachedBackend, Clock, ManualClock, QueryCache, SystemClock};
pub use fixture::FixtureBackend;

#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<AggregateRow>, BackendError>;
}
