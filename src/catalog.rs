//! Query catalog
//!
//! A fixed set of aggregation queries over the trips fact table. Every query
//! of one render embeds the same predicate text, so every chart and KPI
//! reflects the identical filter state. Each query starts with a
//! `-- view: <key>` tag naming the logical view it feeds.

use serde::Serialize;
use std::fmt;

use crate::error::ConfigError;
use crate::models::Grain;
use crate::predicate::Predicate;

pub const DEFAULT_TABLE: &str = "dezoomcamp-citibike-free.marts.fact_trips";
pub const DEFAULT_TOP_STATIONS: usize = 10;

/// `EXTRACT(DAYOFWEEK ...)` values counted as weekend (Sunday, Saturday)
pub const WEEKEND_DAYS_OF_WEEK: (u8, u8) = (1, 7);

const TAG_PREFIX: &str = "-- view: ";

/// Logical views of the dashboard, one catalog query each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    KpiSummary,
    MonthOverMonth,
    RiderMix,
    TimeSeries,
    BikeMix,
    WeekdaySplit,
    TopStations,
    InsightBase,
    TrendBounds,
    FilterOptions,
}

impl View {
    pub const ALL: [View; 10] = [
        View::KpiSummary,
        View::MonthOverMonth,
        View::RiderMix,
        View::TimeSeries,
        View::BikeMix,
        View::WeekdaySplit,
        View::TopStations,
        View::InsightBase,
        View::TrendBounds,
        View::FilterOptions,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            View::KpiSummary => "kpi_summary",
            View::MonthOverMonth => "month_over_month",
            View::RiderMix => "rider_mix",
            View::TimeSeries => "time_series",
            View::BikeMix => "bike_mix",
            View::WeekdaySplit => "weekday_split",
            View::TopStations => "top_stations",
            View::InsightBase => "insight_base",
            View::TrendBounds => "trend_bounds",
            View::FilterOptions => "filter_options",
        }
    }

    /// Display title, used as the table name handed to sinks
    pub fn title(&self) -> &'static str {
        match self {
            View::KpiSummary => "KPI Summary",
            View::MonthOverMonth => "Month over Month",
            View::RiderMix => "Trips by Rider Type",
            View::TimeSeries => "Trips Over Time",
            View::BikeMix => "Bike Type Usage Trends",
            View::WeekdaySplit => "Weekday vs Weekend Split",
            View::TopStations => "Top Start Stations",
            View::InsightBase => "Insight Base",
            View::TrendBounds => "Trend Bounds",
            View::FilterOptions => "Filter Options",
        }
    }

    pub fn from_key(key: &str) -> Option<View> {
        View::ALL.iter().copied().find(|v| v.key() == key)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Extract the view key from a tagged catalog query.
pub fn view_tag(sql: &str) -> Option<&str> {
    sql.lines()
        .next()
        .and_then(|line| line.trim().strip_prefix(TAG_PREFIX))
        .map(str::trim)
}

/// Validated `project.dataset.table` identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef(String);

impl TableRef {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = s.split('.').collect();
        let valid_part = |p: &&str| {
            !p.is_empty()
                && p.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        if parts.len() != 3 || !parts.iter().all(valid_part) {
            return Err(ConfigError::InvalidTable(s.to_string()));
        }
        Ok(TableRef(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Project segment, used as the billing project when none is configured.
    pub fn project(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl Default for TableRef {
    fn default() -> Self {
        TableRef(DEFAULT_TABLE.to_string())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub view: View,
    pub sql: String,
}

impl CatalogQuery {
    fn new(view: View, body: String) -> Self {
        Self {
            view,
            sql: format!("{}{}\n{}", TAG_PREFIX, view.key(), body.trim()),
        }
    }
}

/// Distinct categorical values over the unfiltered table.
pub fn filter_options_query(table: &TableRef) -> CatalogQuery {
    CatalogQuery::new(
        View::FilterOptions,
        format!(
            r#"
SELECT DISTINCT 'member_casual' AS field, member_casual AS value
FROM {table}
WHERE member_casual IS NOT NULL
UNION ALL
SELECT DISTINCT 'rideable_type' AS field, rideable_type AS value
FROM {table}
WHERE rideable_type IS NOT NULL
ORDER BY field, value
"#,
            table = table
        ),
    )
}

/// Query templates bound to one table and one predicate
pub struct QueryCatalog<'a> {
    table: &'a TableRef,
    predicate: &'a Predicate,
}

impl<'a> QueryCatalog<'a> {
    pub fn new(table: &'a TableRef, predicate: &'a Predicate) -> Self {
        Self { table, predicate }
    }

    pub fn kpi_summary(&self) -> CatalogQuery {
        CatalogQuery::new(
            View::KpiSummary,
            format!(
                r#"
WITH filtered AS (
  SELECT * FROM {table} WHERE {predicate}
),
{top_bike}
SELECT
  COUNT(*) AS trips,
  AVG(ride_duration_sec) AS avg_duration_sec,
  COUNTIF(member_casual = 'member') AS member_trips,
  COUNTIF(LOWER(rideable_type) LIKE '%electric%') AS electric_trips,
  (SELECT rideable_type FROM top_bike) AS top_bike_type,
  (SELECT trips FROM top_bike) AS top_bike_trips
FROM filtered
"#,
                table = self.table,
                predicate = self.predicate.to_sql(),
                top_bike = TOP_BIKE_CTE,
            ),
        )
    }

    /// The two most recent months, newest first.
    pub fn month_over_month(&self) -> CatalogQuery {
        CatalogQuery::new(
            View::MonthOverMonth,
            format!(
                r#"
SELECT
  DATE_TRUNC(ride_date, MONTH) AS month,
  COUNT(*) AS trips
FROM {table}
WHERE {predicate}
GROUP BY month
ORDER BY month DESC
LIMIT 2
"#,
                table = self.table,
                predicate = self.predicate.to_sql(),
            ),
        )
    }

    pub fn rider_mix(&self) -> CatalogQuery {
        CatalogQuery::new(
            View::RiderMix,
            format!(
                r#"
SELECT
  member_casual,
  COUNT(*) AS trip_count
FROM {table}
WHERE {predicate}
GROUP BY member_casual
ORDER BY trip_count DESC
"#,
                table = self.table,
                predicate = self.predicate.to_sql(),
            ),
        )
    }

    pub fn time_series(&self, grain: Grain) -> CatalogQuery {
        let period = match grain {
            Grain::Daily => "ride_date",
            Grain::Monthly => "DATE_TRUNC(ride_date, MONTH)",
        };
        CatalogQuery::new(
            View::TimeSeries,
            format!(
                r#"
SELECT
  {period} AS period,
  COUNT(*) AS trip_count
FROM {table}
WHERE {predicate}
GROUP BY period
ORDER BY period
"#,
                period = period,
                table = self.table,
                predicate = self.predicate.to_sql(),
            ),
        )
    }

    pub fn bike_mix(&self) -> CatalogQuery {
        CatalogQuery::new(
            View::BikeMix,
            format!(
                r#"
SELECT
  DATE_TRUNC(ride_date, MONTH) AS month,
  rideable_type,
  COUNT(*) AS trip_count
FROM {table}
WHERE {predicate}
GROUP BY month, rideable_type
ORDER BY month, rideable_type
"#,
                table = self.table,
                predicate = self.predicate.to_sql(),
            ),
        )
    }

    pub fn weekday_split(&self) -> CatalogQuery {
        let (sunday, saturday) = WEEKEND_DAYS_OF_WEEK;
        CatalogQuery::new(
            View::WeekdaySplit,
            format!(
                r#"
SELECT
  CASE
    WHEN EXTRACT(DAYOFWEEK FROM ride_date) IN ({sunday}, {saturday}) THEN 'Weekend'
    ELSE 'Weekday'
  END AS day_type,
  COUNT(*) AS trip_count,
  ROUND(100 * COUNT(*) / SUM(COUNT(*)) OVER (), 2) AS pct_share
FROM {table}
WHERE {predicate}
GROUP BY day_type
ORDER BY trip_count DESC
"#,
                sunday = sunday,
                saturday = saturday,
                table = self.table,
                predicate = self.predicate.to_sql(),
            ),
        )
    }

    pub fn top_stations(&self, limit: usize) -> CatalogQuery {
        CatalogQuery::new(
            View::TopStations,
            format!(
                r#"
SELECT
  start_station_name,
  COUNT(*) AS trip_count
FROM {table}
WHERE {predicate}
  AND start_station_name IS NOT NULL
GROUP BY start_station_name
ORDER BY trip_count DESC
LIMIT {limit}
"#,
                table = self.table,
                predicate = self.predicate.to_sql(),
                limit = limit,
            ),
        )
    }

    pub fn insight_base(&self) -> CatalogQuery {
        let (sunday, saturday) = WEEKEND_DAYS_OF_WEEK;
        CatalogQuery::new(
            View::InsightBase,
            format!(
                r#"
WITH filtered AS (
  SELECT * FROM {table} WHERE {predicate}
),
{top_bike}
SELECT
  COUNT(*) AS trips,
  AVG(ride_duration_sec) AS avg_duration_sec,
  COUNTIF(member_casual = 'member') AS member_trips,
  COUNTIF(EXTRACT(DAYOFWEEK FROM ride_date) IN ({sunday}, {saturday})) AS weekend_trips,
  (SELECT rideable_type FROM top_bike) AS top_bike_type,
  (SELECT trips FROM top_bike) AS top_bike_trips
FROM filtered
"#,
                table = self.table,
                predicate = self.predicate.to_sql(),
                top_bike = TOP_BIKE_CTE,
                sunday = sunday,
                saturday = saturday,
            ),
        )
    }

    /// First and last month trip counts across the range.
    pub fn trend_bounds(&self) -> CatalogQuery {
        CatalogQuery::new(
            View::TrendBounds,
            format!(
                r#"
WITH monthly AS (
  SELECT DATE_TRUNC(ride_date, MONTH) AS month, COUNT(*) AS trips
  FROM {table}
  WHERE {predicate}
  GROUP BY month
)
SELECT
  (SELECT trips FROM monthly ORDER BY month ASC LIMIT 1) AS first_trips,
  (SELECT trips FROM monthly ORDER BY month DESC LIMIT 1) AS last_trips
"#,
                table = self.table,
                predicate = self.predicate.to_sql(),
            ),
        )
    }
}

// Ties on count resolve to the lexically first type
const TOP_BIKE_CTE: &str = "top_bike AS (
  SELECT rideable_type, COUNT(*) AS trips
  FROM filtered
  GROUP BY rideable_type
  ORDER BY trips DESC, rideable_type ASC
  LIMIT 1
)";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_date, FilterOptions, FilterSpec};
    use crate::predicate::PredicateBuilder;

    fn predicate() -> Predicate {
        let spec = FilterSpec::new(
            parse_date("2024-01-01").unwrap(),
            parse_date("2024-03-31").unwrap(),
        )
        .with_rider_types(["member"]);
        PredicateBuilder::new(FilterOptions::default()).build(&spec).unwrap()
    }

    fn all_queries(catalog: &QueryCatalog) -> Vec<CatalogQuery> {
        vec![
            catalog.kpi_summary(),
            catalog.month_over_month(),
            catalog.rider_mix(),
            catalog.time_series(Grain::Daily),
            catalog.bike_mix(),
            catalog.weekday_split(),
            catalog.top_stations(DEFAULT_TOP_STATIONS),
            catalog.insight_base(),
            catalog.trend_bounds(),
        ]
    }

    #[test]
    fn test_every_query_shares_predicate() {
        let table = TableRef::default();
        let predicate = predicate();
        let catalog = QueryCatalog::new(&table, &predicate);

        for query in all_queries(&catalog) {
            assert_eq!(
                query.sql.matches(predicate.to_sql()).count(),
                1,
                "predicate missing or repeated in {}",
                query.view
            );
            assert_eq!(view_tag(&query.sql), Some(query.view.key()));
            assert!(query.sql.contains("`dezoomcamp-citibike-free.marts.fact_trips`"));
        }
    }

    #[test]
    fn test_time_series_grain() {
        let table = TableRef::default();
        let predicate = predicate();
        let catalog = QueryCatalog::new(&table, &predicate);

        assert!(catalog.time_series(Grain::Daily).sql.contains("ride_date AS period"));
        assert!(catalog
            .time_series(Grain::Monthly)
            .sql
            .contains("DATE_TRUNC(ride_date, MONTH) AS period"));
    }

    #[test]
    fn test_top_bike_tie_break_is_lexical() {
        let table = TableRef::default();
        let predicate = predicate();
        let catalog = QueryCatalog::new(&table, &predicate);

        for query in [catalog.kpi_summary(), catalog.insight_base()] {
            assert!(query.sql.contains("ORDER BY trips DESC, rideable_type ASC"));
        }
    }

    #[test]
    fn test_top_stations_limit_and_nulls() {
        let table = TableRef::default();
        let predicate = predicate();
        let query = QueryCatalog::new(&table, &predicate).top_stations(10);
        assert!(query.sql.contains("start_station_name IS NOT NULL"));
        assert!(query.sql.trim_end().ends_with("LIMIT 10"));
    }

    #[test]
    fn test_weekday_split_uses_window_total() {
        let table = TableRef::default();
        let predicate = predicate();
        let query = QueryCatalog::new(&table, &predicate).weekday_split();
        assert!(query.sql.contains("IN (1, 7) THEN 'Weekend'"));
        assert!(query.sql.contains("SUM(COUNT(*)) OVER ()"));
    }

    #[test]
    fn test_filter_options_query_is_unfiltered() {
        let query = filter_options_query(&TableRef::default());
        assert_eq!(query.view, View::FilterOptions);
        assert!(!query.sql.contains("ride_date"));
    }

    #[test]
    fn test_table_ref_validation() {
        assert!(TableRef::parse("proj-1.marts.fact_trips").is_ok());
        assert!(TableRef::parse("marts.fact_trips").is_err());
        assert!(TableRef::parse("p.d.t`; DROP TABLE x; --").is_err());
        assert!(TableRef::parse("p..t").is_err());
    }

    #[test]
    fn test_view_keys_round_trip() {
        for view in View::ALL {
            assert_eq!(View::from_key(view.key()), Some(view));
        }
        assert_eq!(View::from_key("nope"), None);
    }

    #[test]
    fn test_view_tag_requires_first_line() {
        assert_eq!(view_tag("-- view: kpi_summary\nSELECT 1"), Some("kpi_summary"));
        assert_eq!(view_tag("SELECT 1\n-- view: kpi_summary"), None);
    }
}
