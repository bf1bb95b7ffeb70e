//! Insight generator
//!
//! Assembles the bullet list in a fixed order. Each bullet is gated on its
//! inputs being defined; a missing input drops that bullet only.

use crate::metrics::{format_integer, InsightBase, Metric, TrendBounds};

/// The trend bullet needs a range of at least this many days
pub const TREND_MIN_SPAN_DAYS: i64 = 60;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightInputs {
    pub base: InsightBase,
    pub span_days: i64,
    pub trend: TrendBounds,
}

impl InsightInputs {
    pub fn new(base: InsightBase, span_days: i64, trend: TrendBounds) -> Self {
        Self { base, span_days, trend }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Increased,
    Decreased,
    Flat,
}

impl TrendDirection {
    pub fn from_delta(delta: i64) -> Self {
        match delta.signum() {
            1 => TrendDirection::Increased,
            -1 => TrendDirection::Decreased,
            _ => TrendDirection::Flat,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TrendDirection::Increased => "increased",
            TrendDirection::Decreased => "decreased",
            TrendDirection::Flat => "stayed flat",
        }
    }
}

pub fn generate_insights(inputs: &InsightInputs) -> Vec<String> {
    let base = &inputs.base;
    let mut bullets = Vec::new();

    if let Some(trips) = base.trips {
        bullets.push(format!("Total trips: {}.", format_integer(trips)));
    }

    if let Some(minutes) = base.avg_duration_minutes.value() {
        bullets.push(format!("Average trip duration: {:.1} minutes.", minutes));
    }

    if let Some(member_pct) = percent(base.member_share) {
        bullets.push(format!(
            "Rider mix: {:.1}% members (and {:.1}% casual).",
            member_pct,
            100.0 - member_pct
        ));
    }

    if let Some(weekend_pct) = percent(base.weekend_share) {
        bullets.push(format!(
            "Trip timing: {:.1}% of trips occur on weekends.",
            weekend_pct
        ));
    }

    if let (Some(bike_type), Some(trips)) = (&base.top_bike_type, base.top_bike_trips) {
        bullets.push(format!(
            "Most used bike type: {} with {} trips.",
            bike_type,
            format_integer(trips)
        ));
    }

    if let Some(bullet) = trend_bullet(inputs) {
        bullets.push(bullet);
    }

    bullets
}

fn trend_bullet(inputs: &InsightInputs) -> Option<String> {
    if inputs.span_days < TREND_MIN_SPAN_DAYS {
        return None;
    }
    let first = inputs.trend.first_trips?;
    let last = inputs.trend.last_trips?;
    let delta = last - first;
    Some(format!(
        "Overall trend: trips {} from first to last month (Δ {}).",
        TrendDirection::from_delta(delta).describe(),
        format_integer(delta)
    ))
}

fn percent(metric: Metric) -> Option<f64> {
    metric.value().map(|fraction| fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_base() -> InsightBase {
        InsightBase {
            trips: Some(1000),
            avg_duration_minutes: Metric::new(15.0),
            member_share: Metric::new(0.6),
            weekend_share: Metric::new(0.286),
            top_bike_type: Some("classic_bike".into()),
            top_bike_trips: Some(620),
        }
    }

    fn bounds(first: i64, last: i64) -> TrendBounds {
        TrendBounds {
            first_trips: Some(first),
            last_trips: Some(last),
        }
    }

    #[test]
    fn test_all_bullets_in_order() {
        let bullets = generate_insights(&InsightInputs::new(full_base(), 90, bounds(1000, 2234)));
        assert_eq!(
            bullets,
            vec![
                "Total trips: 1,000.",
                "Average trip duration: 15.0 minutes.",
                "Rider mix: 60.0% members (and 40.0% casual).",
                "Trip timing: 28.6% of trips occur on weekends.",
                "Most used bike type: classic_bike with 620 trips.",
                "Overall trend: trips increased from first to last month (Δ 1,234).",
            ]
        );
    }

    #[test]
    fn test_undefined_inputs_skip_only_their_bullet() {
        let mut base = full_base();
        base.avg_duration_minutes = Metric::undefined();
        base.weekend_share = Metric::undefined();

        let bullets = generate_insights(&InsightInputs::new(base, 10, TrendBounds::default()));
        assert_eq!(bullets.len(), 3);
        assert!(bullets[0].starts_with("Total trips"));
        assert!(bullets[1].starts_with("Rider mix"));
        assert!(bullets[2].starts_with("Most used bike type"));
    }

    #[test]
    fn test_top_bike_requires_type_and_count() {
        let mut base = full_base();
        base.top_bike_trips = None;
        let bullets = generate_insights(&InsightInputs::new(base, 10, TrendBounds::default()));
        assert!(bullets.iter().all(|b| !b.starts_with("Most used")));
    }

    #[test]
    fn test_trend_needs_sixty_days() {
        let short = generate_insights(&InsightInputs::new(full_base(), 59, bounds(10, 20)));
        assert!(short.iter().all(|b| !b.starts_with("Overall trend")));

        let long = generate_insights(&InsightInputs::new(full_base(), 60, bounds(10, 20)));
        assert_eq!(
            long.last().unwrap(),
            "Overall trend: trips increased from first to last month (Δ 10)."
        );
    }

    #[test]
    fn test_trend_direction() {
        let down = generate_insights(&InsightInputs::new(full_base(), 60, bounds(3000, 1500)));
        assert_eq!(
            down.last().unwrap(),
            "Overall trend: trips decreased from first to last month (Δ -1,500)."
        );

        let flat = generate_insights(&InsightInputs::new(full_base(), 60, bounds(42, 42)));
        assert!(flat.last().unwrap().contains("stayed flat"));
    }

    #[test]
    fn test_trend_needs_both_bounds() {
        let trend = TrendBounds {
            first_trips: Some(5),
            last_trips: None,
        };
        let bullets = generate_insights(&InsightInputs::new(full_base(), 120, trend));
        assert_eq!(bullets.len(), 5);
    }

    #[test]
    fn test_no_data_no_bullets() {
        assert!(generate_insights(&InsightInputs::default()).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let inputs = InsightInputs::new(full_base(), 75, bounds(1, 2));
        assert_eq!(generate_insights(&inputs), generate_insights(&inputs));
    }
}
