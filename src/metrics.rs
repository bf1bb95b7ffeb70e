//! Metric derivation
//!
//! Pure functions over aggregate rows. An undefined metric (zero denominator,
//! null input, missing row) is a first-class result and is never rendered as
//! zero. Formatting lives apart from computation.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::AggregateRow;

/// A derived scalar that may be explicitly undefined
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Metric(Option<f64>);

impl Metric {
    /// Non-finite values are treated as undefined.
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Metric(Some(value))
        } else {
            Metric(None)
        }
    }

    pub fn undefined() -> Self {
        Metric(None)
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn is_defined(&self) -> bool {
        self.0.is_some()
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self.0 {
            Some(v) => Metric::new(f(v)),
            None => self,
        }
    }
}

impl From<Option<f64>> for Metric {
    fn from(value: Option<f64>) -> Self {
        value.map(Metric::new).unwrap_or_default()
    }
}

pub fn share(numerator: Option<f64>, denominator: Option<f64>) -> Metric {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Metric::new(n / d),
        _ => Metric::undefined(),
    }
}

pub fn percent_change(curr: Option<f64>, prev: Option<f64>) -> Metric {
    match (curr, prev) {
        (Some(c), Some(p)) if p != 0.0 => Metric::new((c - p) / p),
        _ => Metric::undefined(),
    }
}

pub fn seconds_to_minutes(sec: Option<f64>) -> Metric {
    Metric::from(sec).map(|s| s / 60.0)
}

/// `1234567` -> `1,234,567`
pub fn format_integer(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Fraction to one-decimal percentage: `0.6` -> `60.0%`
pub fn format_percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

pub fn format_minutes(minutes: f64) -> String {
    format!("{:.1} min", minutes)
}

/// Render a metric with `fmt`, or `N/A` when undefined.
pub fn format_metric(metric: Metric, fmt: impl FnOnce(f64) -> String) -> String {
    metric.value().map(fmt).unwrap_or_else(|| "N/A".to_string())
}

// ============================================================================
// Row-level derivations
// ============================================================================

/// Headline KPIs for the selected filters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSummary {
    pub trips: Option<i64>,
    pub avg_duration_minutes: Metric,
    pub member_share: Metric,
    pub electric_share: Metric,
    pub top_bike_type: Option<String>,
    pub top_bike_trips: Option<i64>,
}

impl KpiSummary {
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        let Some(row) = rows.first() else {
            return Self::default();
        };
        let trips = row.get_f64("trips");
        Self {
            trips: row.get_i64("trips"),
            avg_duration_minutes: seconds_to_minutes(row.get_f64("avg_duration_sec")),
            member_share: share(row.get_f64("member_trips"), trips),
            electric_share: share(row.get_f64("electric_trips"), trips),
            top_bike_type: row.get_str("top_bike_type").map(str::to_string),
            top_bike_trips: row.get_i64("top_bike_trips"),
        }
    }
}

/// Latest month compared with the one before it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthOverMonth {
    pub current_month: Option<NaiveDate>,
    pub current_trips: Option<i64>,
    pub previous_month: Option<NaiveDate>,
    pub previous_trips: Option<i64>,
    pub change: Metric,
    pub delta_trips: Option<i64>,
}

impl MonthOverMonth {
    /// Rows are `(month, trips)`; order does not matter. Fewer than two months
    /// leaves the comparison undefined.
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        let mut months: Vec<(NaiveDate, Option<i64>)> = rows
            .iter()
            .filter_map(|r| r.get_date("month").map(|m| (m, r.get_i64("trips"))))
            .collect();
        months.sort_by(|a, b| b.0.cmp(&a.0));

        let current = months.first().copied();
        let previous = months.get(1).copied();
        let current_trips = current.and_then(|c| c.1);
        let previous_trips = previous.and_then(|p| p.1);

        Self {
            current_month: current.map(|c| c.0),
            current_trips,
            previous_month: previous.map(|p| p.0),
            previous_trips,
            change: percent_change(
                current_trips.map(|v| v as f64),
                previous_trips.map(|v| v as f64),
            ),
            delta_trips: match (current_trips, previous_trips) {
                (Some(c), Some(p)) => Some(c - p),
                _ => None,
            },
        }
    }
}

/// Weekday/weekend shares in percent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekdaySplit {
    pub weekday_trips: Option<i64>,
    pub weekend_trips: Option<i64>,
    pub weekday_pct: Metric,
    pub weekend_pct: Metric,
}

impl WeekdaySplit {
    /// Uses `pct_share` when present, otherwise derives shares from counts.
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        let bucket = |name: &str| rows.iter().find(|r| r.get_str("day_type") == Some(name));
        let weekday = bucket("Weekday");
        let weekend = bucket("Weekend");

        let weekday_trips = weekday.and_then(|r| r.get_i64("trip_count"));
        let weekend_trips = weekend.and_then(|r| r.get_i64("trip_count"));
        let total = match (weekday_trips, weekend_trips) {
            (None, None) => None,
            (a, b) => Some((a.unwrap_or(0) + b.unwrap_or(0)) as f64),
        };

        let pct = |row: Option<&AggregateRow>, trips: Option<i64>| -> Metric {
            if let Some(p) = row.and_then(|r| r.get_f64("pct_share")) {
                return Metric::new(p);
            }
            // A bucket with no trips has no row at all
            share(Some(trips.unwrap_or(0) as f64), total).map(|s| (s * 10_000.0).round() / 100.0)
        };

        Self {
            weekday_pct: pct(weekday, weekday_trips),
            weekend_pct: pct(weekend, weekend_trips),
            weekday_trips,
            weekend_trips,
        }
    }
}

/// One monthly series per bike type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BikeMixSeries {
    pub months: Vec<NaiveDate>,
    pub series: BTreeMap<String, Vec<i64>>,
}

impl BikeMixSeries {
    /// Pivot `(month, rideable_type, trip_count)` rows; absent cells are zero.
    pub fn pivot(rows: &[AggregateRow]) -> Self {
        let mut months = BTreeSet::new();
        let mut cells: BTreeMap<(String, NaiveDate), i64> = BTreeMap::new();
        let mut types = BTreeSet::new();

        for row in rows {
            let Some(month) = row.get_date("month") else {
                continue;
            };
            let bike_type = row.get_str("rideable_type").unwrap_or("unknown").to_string();
            months.insert(month);
            types.insert(bike_type.clone());
            *cells.entry((bike_type, month)).or_insert(0) += row.get_i64("trip_count").unwrap_or(0);
        }

        let months: Vec<NaiveDate> = months.into_iter().collect();
        let series = types
            .into_iter()
            .map(|t| {
                let values = months
                    .iter()
                    .map(|m| cells.get(&(t.clone(), *m)).copied().unwrap_or(0))
                    .collect();
                (t, values)
            })
            .collect();

        Self { months, series }
    }
}

/// Single-row inputs for the insight bullets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightBase {
    pub trips: Option<i64>,
    pub avg_duration_minutes: Metric,
    pub member_share: Metric,
    pub weekend_share: Metric,
    pub top_bike_type: Option<String>,
    pub top_bike_trips: Option<i64>,
}

impl InsightBase {
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        let Some(row) = rows.first() else {
            return Self::default();
        };
        let trips = row.get_f64("trips");
        Self {
            trips: row.get_i64("trips"),
            avg_duration_minutes: seconds_to_minutes(row.get_f64("avg_duration_sec")),
            member_share: share(row.get_f64("member_trips"), trips),
            weekend_share: share(row.get_f64("weekend_trips"), trips),
            top_bike_type: row.get_str("top_bike_type").map(str::to_string),
            top_bike_trips: row.get_i64("top_bike_trips"),
        }
    }
}

/// First and last month counts for the trend bullet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrendBounds {
    pub first_trips: Option<i64>,
    pub last_trips: Option<i64>,
}

impl TrendBounds {
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        rows.first()
            .map(|row| Self {
                first_trips: row.get_i64("first_trips"),
                last_trips: row.get_i64("last_trips"),
            })
            .unwrap_or_default()
    }
}
