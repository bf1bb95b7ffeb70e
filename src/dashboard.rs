//! Dashboard orchestrator
//!
//! One render per filter change: build the predicate, run every catalog query
//! concurrently against the injected backend, derive metrics and bullets, and
//! collect the tables for a presentation sink. A failing view degrades to an
//! empty table; it never cancels its siblings.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::QueryBackend;
use crate::catalog::{
    filter_options_query, CatalogQuery, QueryCatalog, TableRef, View, DEFAULT_TOP_STATIONS,
};
use crate::error::{BackendQueryError, FilterError};
use crate::insights::{generate_insights, InsightInputs, TREND_MIN_SPAN_DAYS};
use crate::metrics::{
    BikeMixSeries, InsightBase, KpiSummary, MonthOverMonth, TrendBounds, WeekdaySplit,
};
use crate::models::{AggregateRow, FilterOptions, FilterSpec};
use crate::predicate::PredicateBuilder;
use crate::sink::PresentationSink;

type ViewOutcome = Result<Vec<AggregateRow>, BackendQueryError>;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub table: TableRef,
    pub top_stations: usize,
    /// Upper bound on any single backend call
    pub query_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            table: TableRef::default(),
            top_stations: DEFAULT_TOP_STATIONS,
            query_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewFailure {
    pub view: View,
    pub message: String,
}

/// Everything one render produced, ready for a presentation sink
#[derive(Debug, Clone, Serialize)]
pub struct DashboardRender {
    pub filter: FilterSpec,
    pub predicate: String,
    /// Raw rows per view, keyed by view title
    pub tables: BTreeMap<String, Vec<AggregateRow>>,
    pub kpis: KpiSummary,
    pub month_over_month: MonthOverMonth,
    pub weekday_split: WeekdaySplit,
    pub bike_mix: BikeMixSeries,
    pub bullets: Vec<String>,
    pub failures: Vec<ViewFailure>,
}

impl DashboardRender {
    fn new(filter: FilterSpec, predicate: String) -> Self {
        Self {
            filter,
            predicate,
            tables: BTreeMap::new(),
            kpis: KpiSummary::default(),
            month_over_month: MonthOverMonth::default(),
            weekday_split: WeekdaySplit::default(),
            bike_mix: BikeMixSeries::default(),
            bullets: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn absorb(&mut self, view: View, outcome: ViewOutcome) {
        let rows = match outcome {
            Ok(rows) => rows,
            Err(err) => {
                warn!("View '{}' degraded to no data: {}", view.title(), err.cause);
                self.failures.push(ViewFailure {
                    view,
                    message: err.cause,
                });
                Vec::new()
            }
        };
        self.tables.insert(view.title().to_string(), rows);
    }

    /// Rows for a view; empty when the view failed, returned nothing, or was not run.
    pub fn rows(&self, view: View) -> &[AggregateRow] {
        self.tables
            .get(view.title())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn failed(&self, view: View) -> bool {
        self.failures.iter().any(|f| f.view == view)
    }
}

pub struct Dashboard {
    backend: Arc<dyn QueryBackend>,
    settings: EngineSettings,
}

impl Dashboard {
    pub fn new(backend: Arc<dyn QueryBackend>, settings: EngineSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Option universes for the categorical filters, over the unfiltered table.
    pub async fn load_options(&self) -> Result<FilterOptions, BackendQueryError> {
        let rows = self.run(filter_options_query(&self.settings.table)).await?;
        Ok(FilterOptions::from_rows(&rows))
    }

    pub async fn render(
        &self,
        filter: &FilterSpec,
        options: &FilterOptions,
    ) -> Result<DashboardRender, FilterError> {
        // Validation failures stop here, before any query is issued
        let predicate = PredicateBuilder::new(options.clone()).build(filter)?;
        info!(
            "Rendering {} to {} ({}), predicate: {}",
            filter.start_date,
            filter.end_date,
            filter.grain.label(),
            predicate.to_sql()
        );

        let catalog = QueryCatalog::new(&self.settings.table, &predicate);
        let span_days = filter.span_days();
        let wants_trend = span_days >= TREND_MIN_SPAN_DAYS;

        let (kpi, mom, rider_mix, series, bike_mix, split, stations, base, trend) = tokio::join!(
            self.run(catalog.kpi_summary()),
            self.run(catalog.month_over_month()),
            self.run(catalog.rider_mix()),
            self.run(catalog.time_series(filter.grain)),
            self.run(catalog.bike_mix()),
            self.run(catalog.weekday_split()),
            self.run(catalog.top_stations(self.settings.top_stations)),
            self.run(catalog.insight_base()),
            async {
                if wants_trend {
                    Some(self.run(catalog.trend_bounds()).await)
                } else {
                    None
                }
            },
        );

        let mut render = DashboardRender::new(filter.clone(), predicate.to_sql().to_string());
        render.absorb(View::KpiSummary, kpi);
        render.absorb(View::MonthOverMonth, mom);
        render.absorb(View::RiderMix, rider_mix);
        render.absorb(View::TimeSeries, series);
        render.absorb(View::BikeMix, bike_mix);
        render.absorb(View::WeekdaySplit, split);
        render.absorb(View::TopStations, stations);
        render.absorb(View::InsightBase, base);
        if let Some(trend) = trend {
            render.absorb(View::TrendBounds, trend);
        }

        let kpis = KpiSummary::from_rows(render.rows(View::KpiSummary));
        let month_over_month = MonthOverMonth::from_rows(render.rows(View::MonthOverMonth));
        let weekday_split = WeekdaySplit::from_rows(render.rows(View::WeekdaySplit));
        let bike_mix = BikeMixSeries::pivot(render.rows(View::BikeMix));
        let inputs = InsightInputs::new(
            InsightBase::from_rows(render.rows(View::InsightBase)),
            span_days,
            TrendBounds::from_rows(render.rows(View::TrendBounds)),
        );

        render.kpis = kpis;
        render.month_over_month = month_over_month;
        render.weekday_split = weekday_split;
        render.bike_mix = bike_mix;
        render.bullets = generate_insights(&inputs);

        info!(
            "Render complete: {} views, {} degraded, {} insights",
            render.tables.len(),
            render.failures.len(),
            render.bullets.len()
        );
        Ok(render)
    }

    async fn run(&self, query: CatalogQuery) -> ViewOutcome {
        debug!("Running {} query:\n{}", query.view, query.sql);

        let timeout = self.settings.query_timeout;
        let cause = match tokio::time::timeout(timeout, self.backend.execute(&query.sql)).await {
            Ok(Ok(rows)) => return Ok(rows),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:.1}s", timeout.as_secs_f64()),
        };

        Err(BackendQueryError {
            view: query.view.key().to_string(),
            query_text: query.sql,
            cause,
        })
    }
}

/// Hand a finished render to a presentation sink.
pub fn publish(render: &DashboardRender, sink: &mut dyn PresentationSink) -> anyhow::Result<()> {
    sink.present(render)
}
