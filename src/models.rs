use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::FilterError;

/// Ranges longer than this many days default to monthly buckets
pub const MONTHLY_GRAIN_THRESHOLD_DAYS: i64 = 45;

/// Time-bucketing unit for the time-series view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Grain {
    Daily,
    Monthly,
}

impl Grain {
    /// Default grain for a range: monthly when it spans more than 45 days.
    pub fn default_for(start: NaiveDate, end: NaiveDate) -> Self {
        if (end - start).num_days() > MONTHLY_GRAIN_THRESHOLD_DAYS {
            Grain::Monthly
        } else {
            Grain::Daily
        }
    }

    pub fn parse(s: &str) -> Result<Self, FilterError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Grain::Daily),
            "monthly" => Ok(Grain::Monthly),
            _ => Err(FilterError::InvalidGrain { value: s.to_string() }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grain::Daily => "Daily",
            Grain::Monthly => "Monthly",
        }
    }
}

/// User-selected filter state, rebuilt on every interaction.
///
/// An empty categorical set means "no restriction", never "exclude all".
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterSpec {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rider_types: BTreeSet<String>,
    pub bike_types: BTreeSet<String>,
    pub grain: Grain,
}

impl FilterSpec {
    /// Unrestricted filter over a range, with the grain defaulted by range length.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            rider_types: BTreeSet::new(),
            bike_types: BTreeSet::new(),
            grain: Grain::default_for(start_date, end_date),
        }
    }

    pub fn with_rider_types<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rider_types = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bike_types<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bike_types = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_grain(mut self, grain: Grain) -> Self {
        self.grain = grain;
        self
    }

    /// Whole days between start and end (0 for a single-day range).
    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// Range check alone; needs no option universe and issues no query.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.start_date > self.end_date {
            return Err(FilterError::InvalidRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }
}

/// Option universes for the categorical filters
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FilterOptions {
    pub rider_types: BTreeSet<String>,
    pub bike_types: BTreeSet<String>,
}

impl FilterOptions {
    /// Build the universes from `(field, value)` rows of the filter-options query.
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        let mut options = FilterOptions::default();
        for row in rows {
            let (Some(field), Some(value)) = (row.get_str("field"), row.get_str("value")) else {
                continue;
            };
            match field {
                "member_casual" => {
                    options.rider_types.insert(value.to_string());
                }
                "rideable_type" => {
                    options.bike_types.insert(value.to_string());
                }
                _ => {}
            }
        }
        options
    }
}

/// Untrusted wire form of a filter, as received from the API or CLI
#[derive(Debug, Clone, Deserialize)]
pub struct FilterRequest {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub rider_types: Vec<serde_json::Value>,
    #[serde(default)]
    pub bike_types: Vec<serde_json::Value>,
    #[serde(default)]
    pub grain: Option<String>,
}

impl FilterRequest {
    pub fn into_spec(self) -> Result<FilterSpec, FilterError> {
        let start_date = parse_date(&self.start)?;
        let end_date = parse_date(&self.end)?;
        let grain = match self.grain.as_deref() {
            Some(g) => Grain::parse(g)?,
            None => Grain::default_for(start_date, end_date),
        };

        Ok(FilterSpec {
            start_date,
            end_date,
            rider_types: categorical_values("rider_types", &self.rider_types)?,
            bike_types: categorical_values("bike_types", &self.bike_types)?,
            grain,
        })
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, FilterError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| FilterError::InvalidDate {
        value: value.to_string(),
    })
}

/// Accept strings and numbers; reject nulls, booleans and nested structures.
fn categorical_values(
    field: &str,
    values: &[serde_json::Value],
) -> Result<BTreeSet<String>, FilterError> {
    values
        .iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(FilterError::invalid_value(
                field,
                format!("expected a string, got {}", json_kind(other)),
            )),
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// One cell of a backend result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Str(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Scalar::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(v: NaiveDate) -> Self {
        Scalar::Date(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// A row returned by the query backend, columns kept in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRow {
    columns: Vec<(String, Scalar)>,
}

impl AggregateRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, replacing an existing column of the same name.
    pub fn with(mut self, column: &str, value: impl Into<Scalar>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Scalar>) {
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Scalar::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Scalar::as_f64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Scalar::as_str)
    }

    pub fn get_date(&self, column: &str) -> Option<NaiveDate> {
        self.get(column).and_then(Scalar::as_date)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for AggregateRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AggregateRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowVisitor)
    }
}

struct RowVisitor;

impl<'de> Visitor<'de> for RowVisitor {
    type Value = AggregateRow;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of column names to scalars")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut row = AggregateRow::new();
        while let Some((column, value)) = access.next_entry::<String, Scalar>()? {
            row.insert(&column, value);
        }
        Ok(row)
    }
}
