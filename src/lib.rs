//! Citi Bike Insights
//!
//! Filtered query and insight derivation over a warehouse trips table: one
//! validated filter becomes one shared predicate, every dashboard view runs
//! against it concurrently, and the results are reduced to KPIs and
//! plain-language insight bullets for a presentation sink.

pub mod api;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod insights;
pub mod metrics;
pub mod models;
pub mod predicate;
pub mod sink;

pub use backend::QueryBackend;
pub use dashboard::{Dashboard, DashboardRender, EngineSettings};
pub use error::{BackendError, BackendQueryError, ConfigError, FilterError};
pub use models::{FilterOptions, FilterRequest, FilterSpec, Grain};
