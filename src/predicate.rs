//! Predicate builder
//!
//! Turns a [`FilterSpec`] into the canonical WHERE condition shared by every
//! catalog query in one render. The date-range clause always comes first and
//! is never omitted: `ride_date` is the partitioning column of the fact table.
//! Categorical literals are escaped for GoogleSQL single-quoted strings, so a
//! selected value can never change the structure of the condition.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::error::FilterError;
use crate::models::{FilterOptions, FilterSpec};

pub const DATE_COLUMN: &str = "ride_date";
pub const RIDER_TYPE_COLUMN: &str = "member_casual";
pub const BIKE_TYPE_COLUMN: &str = "rideable_type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    DateRange {
        column: &'static str,
        start: NaiveDate,
        end: NaiveDate,
    },
    Membership {
        column: &'static str,
        values: Vec<String>,
    },
}

impl Clause {
    fn to_sql(&self) -> String {
        match self {
            Clause::DateRange { column, start, end } => format!(
                "{} BETWEEN {} AND {}",
                column,
                date_literal(*start),
                date_literal(*end)
            ),
            // Values were validated when the clause was built
            Clause::Membership { column, values } => {
                let literals: Vec<String> = values.iter().map(|v| quote_string(v)).collect();
                format!("{} IN ({})", column, literals.join(", "))
            }
        }
    }
}

/// Ordered conjunction of clauses; exactly one date range, first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
    sql: String,
}

impl Predicate {
    fn new(clauses: Vec<Clause>) -> Self {
        let sql = clauses
            .iter()
            .map(Clause::to_sql)
            .collect::<Vec<_>>()
            .join(" AND ");
        Self { clauses, sql }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Rendered condition text, suitable for a WHERE clause.
    pub fn to_sql(&self) -> &str {
        &self.sql
    }

    /// Literal values in clause order.
    pub fn parameters(&self) -> Vec<String> {
        let mut params = Vec::new();
        for clause in &self.clauses {
            match clause {
                Clause::DateRange { start, end, .. } => {
                    params.push(start.format("%Y-%m-%d").to_string());
                    params.push(end.format("%Y-%m-%d").to_string());
                }
                Clause::Membership { values, .. } => params.extend(values.iter().cloned()),
            }
        }
        params
    }
}

/// Builds predicates against a known option universe.
#[derive(Debug, Clone, Default)]
pub struct PredicateBuilder {
    options: FilterOptions,
}

impl PredicateBuilder {
    pub fn new(options: FilterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn build(&self, filter: &FilterSpec) -> Result<Predicate, FilterError> {
        filter.validate()?;

        let mut clauses = vec![Clause::DateRange {
            column: DATE_COLUMN,
            start: filter.start_date,
            end: filter.end_date,
        }];

        if let Some(clause) = membership(
            RIDER_TYPE_COLUMN,
            "rider_types",
            &filter.rider_types,
            &self.options.rider_types,
        )? {
            clauses.push(clause);
        }
        if let Some(clause) = membership(
            BIKE_TYPE_COLUMN,
            "bike_types",
            &filter.bike_types,
            &self.options.bike_types,
        )? {
            clauses.push(clause);
        }

        Ok(Predicate::new(clauses))
    }
}

/// Empty selection and full-universe selection both mean "no restriction".
fn membership(
    column: &'static str,
    field: &str,
    selected: &BTreeSet<String>,
    universe: &BTreeSet<String>,
) -> Result<Option<Clause>, FilterError> {
    for value in selected {
        validate_literal(field, value)?;
    }
    if selected.is_empty() || selected == universe {
        return Ok(None);
    }
    Ok(Some(Clause::Membership {
        column,
        values: selected.iter().cloned().collect(),
    }))
}

fn validate_literal(field: &str, value: &str) -> Result<(), FilterError> {
    if value.is_empty() {
        return Err(FilterError::invalid_value(field, "empty value"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(FilterError::invalid_value(
            field,
            format!("control character U+{:04X} is not allowed", c as u32),
        ));
    }
    Ok(())
}

fn date_literal(date: NaiveDate) -> String {
    format!("DATE '{}'", date.format("%Y-%m-%d"))
}

/// GoogleSQL single-quoted string literal.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_date;

    fn options() -> FilterOptions {
        FilterOptions {
            rider_types: ["casual", "member"].iter().map(|s| s.to_string()).collect(),
            bike_types: ["classic_bike", "electric_bike"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn january() -> FilterSpec {
        FilterSpec::new(
            parse_date("2024-01-01").unwrap(),
            parse_date("2024-01-31").unwrap(),
        )
    }

    #[test]
    fn test_date_clause_always_present() {
        let predicate = PredicateBuilder::new(options()).build(&january()).unwrap();
        assert_eq!(
            predicate.to_sql(),
            "ride_date BETWEEN DATE '2024-01-01' AND DATE '2024-01-31'"
        );
        assert_eq!(predicate.to_sql().matches("BETWEEN").count(), 1);
    }

    #[test]
    fn test_full_universe_omits_clause() {
        let builder = PredicateBuilder::new(options());
        let all = january().with_rider_types(["member", "casual"]);
        let none = january();
        assert_eq!(builder.build(&all).unwrap(), builder.build(&none).unwrap());
        assert!(!builder.build(&all).unwrap().to_sql().contains("member_casual"));
    }

    #[test]
    fn test_empty_selection_is_unrestricted() {
        // Without a known universe an empty set must still mean "everything"
        let predicate = PredicateBuilder::default().build(&january()).unwrap();
        assert_eq!(predicate.clauses().len(), 1);
        assert!(!predicate.to_sql().contains(" IN "));
    }

    #[test]
    fn test_subset_emits_membership_clause() {
        let spec = january()
            .with_rider_types(["member"])
            .with_bike_types(["electric_bike"]);
        let predicate = PredicateBuilder::new(options()).build(&spec).unwrap();
        assert_eq!(
            predicate.to_sql(),
            "ride_date BETWEEN DATE '2024-01-01' AND DATE '2024-01-31' \
             AND member_casual IN ('member') AND rideable_type IN ('electric_bike')"
        );
        assert_eq!(
            predicate.parameters(),
            vec!["2024-01-01", "2024-01-31", "member", "electric_bike"]
        );
    }

    #[test]
    fn test_values_outside_universe_are_kept() {
        let spec = january().with_bike_types(["docked_bike", "classic_bike"]);
        let predicate = PredicateBuilder::new(options()).build(&spec).unwrap();
        assert!(predicate
            .to_sql()
            .ends_with("rideable_type IN ('classic_bike', 'docked_bike')"));
    }

    #[test]
    fn test_deterministic_output() {
        let builder = PredicateBuilder::new(options());
        let a = january().with_bike_types(["electric_bike"]).with_rider_types(["casual"]);
        let b = january().with_rider_types(["casual"]).with_bike_types(["electric_bike"]);
        assert_eq!(builder.build(&a).unwrap().to_sql(), builder.build(&b).unwrap().to_sql());
        assert_eq!(builder.build(&a).unwrap().to_sql(), builder.build(&a).unwrap().to_sql());
    }

    #[test]
    fn test_quotes_cannot_escape_literal() {
        let spec = january().with_rider_types(["x') OR 1=1 --"]);
        let predicate = PredicateBuilder::new(options()).build(&spec).unwrap();
        assert!(predicate
            .to_sql()
            .ends_with("member_casual IN ('x\\') OR 1=1 --')"));

        let spec = january().with_rider_types(["back\\' OR 'a'='a"]);
        let predicate = PredicateBuilder::new(options()).build(&spec).unwrap();
        assert!(predicate
            .to_sql()
            .ends_with("member_casual IN ('back\\\\\\' OR \\'a\\'=\\'a')"));
    }

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("plain"), "'plain'");
        assert_eq!(quote_string("it's"), "'it\\'s'");
        assert_eq!(quote_string("a\\b"), "'a\\\\b'");
        assert_eq!(quote_string("line\nbreak"), "'line\\nbreak'");
    }

    #[test]
    fn test_control_characters_rejected() {
        let spec = january().with_bike_types(["bad\u{0}value"]);
        match PredicateBuilder::new(options()).build(&spec) {
            Err(FilterError::InvalidValue { field, .. }) => assert_eq!(field, "bike_types"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }

        let spec = january().with_rider_types([""]);
        assert!(matches!(
            PredicateBuilder::new(options()).build(&spec),
            Err(FilterError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let spec = FilterSpec::new(
            parse_date("2024-02-01").unwrap(),
            parse_date("2024-01-01").unwrap(),
        )
        .with_rider_types(["bad\u{0}"]);
        // Range is checked before any value
        assert!(matches!(
            PredicateBuilder::new(options()).build(&spec),
            Err(FilterError::InvalidRange { .. })
        ));
    }
}
