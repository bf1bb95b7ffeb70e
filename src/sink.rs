//! Presentation sinks
//!
//! A sink consumes a finished [`DashboardRender`]; the engine never renders
//! anything itself.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;

use crate::catalog::View;
use crate::dashboard::DashboardRender;
use crate::metrics::{format_integer, format_metric, format_minutes, format_percent, Metric};
use crate::models::{AggregateRow, Scalar};

pub trait PresentationSink {
    fn present(&mut self, render: &DashboardRender) -> Result<()>;
}

// ============================================================================
// Console
// ============================================================================

/// Plain-text report with boxed section headers and aligned tables
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn section(&mut self, title: &str) -> Result<()> {
        writeln!(self.out, "\n{}", "═".repeat(80))?;
        writeln!(self.out, "  {}", title)?;
        writeln!(self.out, "{}\n", "═".repeat(80))?;
        Ok(())
    }

    fn table(&mut self, rows: &[AggregateRow], failed: bool) -> Result<()> {
        if failed {
            writeln!(self.out, "  No data (query failed).")?;
            return Ok(());
        }
        if rows.is_empty() {
            writeln!(self.out, "  No data for the selected filters.")?;
            return Ok(());
        }

        let columns = column_names(rows);
        let cells: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).map(display_cell).unwrap_or_default())
                    .collect()
            })
            .collect();
        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(c.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect();
        writeln!(self.out, "  {}", header.join("  "))?;
        let rule = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        writeln!(self.out, "  {}", "─".repeat(rule))?;
        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:>w$}", v, w = *w))
                .collect();
            writeln!(self.out, "  {}", line.join("  "))?;
        }
        Ok(())
    }
}

impl<W: Write> PresentationSink for ConsoleSink<W> {
    fn present(&mut self, render: &DashboardRender) -> Result<()> {
        let filter = &render.filter;
        writeln!(self.out, "\n{}", "█".repeat(80))?;
        writeln!(self.out, "{}  CITI BIKE ANALYTICS  {}", "█".repeat(28), "█".repeat(28))?;
        writeln!(self.out, "{}", "█".repeat(80))?;
        writeln!(
            self.out,
            "\n  Period: {} → {}   Grain: {}",
            filter.start_date,
            filter.end_date,
            filter.grain.label()
        )?;
        writeln!(self.out, "  Rider types: {}", selection(&filter.rider_types))?;
        writeln!(self.out, "  Bike types:  {}", selection(&filter.bike_types))?;

        self.section("KEY METRICS")?;
        let kpi = &render.kpis;
        let top_bike = match (&kpi.top_bike_type, kpi.top_bike_trips) {
            (Some(t), Some(c)) => format!("{} ({})", t, format_integer(c)),
            _ => "N/A".to_string(),
        };
        let mom = &render.month_over_month;
        let mom_delta = mom
            .delta_trips
            .map(|d| format!(" ({} trips)", format_integer(d)))
            .unwrap_or_default();
        let trips = kpi
            .trips
            .map(format_integer)
            .unwrap_or_else(|| "N/A".into());
        let avg_duration = format_metric(kpi.avg_duration_minutes, format_minutes);
        let member_share = format_metric(kpi.member_share, format_percent);
        let electric_share = format_metric(kpi.electric_share, format_percent);
        let mom_change = format_metric(mom.change, format_percent);
        writeln!(self.out, "  Total trips:          {:>14}", trips)?;
        writeln!(self.out, "  Avg duration:         {:>14}", avg_duration)?;
        writeln!(self.out, "  Member share:         {:>14}", member_share)?;
        writeln!(self.out, "  Electric share:       {:>14}", electric_share)?;
        writeln!(self.out, "  Top bike type:        {:>14}", top_bike)?;
        writeln!(self.out, "  MoM change (trips):   {:>14}{}", mom_change, mom_delta)?;

        let time_title = format!("{} ({})", View::TimeSeries.title(), filter.grain.label());
        for (view, title) in [
            (View::RiderMix, View::RiderMix.title().to_string()),
            (View::TimeSeries, time_title),
            (View::BikeMix, View::BikeMix.title().to_string()),
            (View::WeekdaySplit, View::WeekdaySplit.title().to_string()),
            (View::TopStations, View::TopStations.title().to_string()),
        ] {
            self.section(&title.to_uppercase())?;
            self.table(render.rows(view), render.failed(view))?;
        }

        self.section("INSIGHTS")?;
        if render.bullets.is_empty() {
            writeln!(self.out, "  No insights available for the selected filters.")?;
        }
        for bullet in &render.bullets {
            writeln!(self.out, "  • {}", bullet)?;
        }

        if !render.failures.is_empty() {
            self.section("DEGRADED VIEWS")?;
            for failure in &render.failures {
                writeln!(self.out, "  {}: {}", failure.view.title(), failure.message)?;
            }
        }

        writeln!(self.out, "\n{}", "█".repeat(80))?;
        Ok(())
    }
}

fn selection(values: &std::collections::BTreeSet<String>) -> String {
    if values.is_empty() {
        "all".to_string()
    } else {
        values.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn display_cell(value: &Scalar) -> String {
    match value {
        Scalar::Int(i) => format_integer(*i),
        Scalar::Float(f) => format!("{:.2}", f),
        other => other.to_string(),
    }
}

/// Column names in order of first appearance across all rows.
fn column_names(rows: &[AggregateRow]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for name in row.column_names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

// ============================================================================
// JSON
// ============================================================================

/// Pretty JSON document of the whole render
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PresentationSink for JsonSink<W> {
    fn present(&mut self, render: &DashboardRender) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.out, render)?;
        writeln!(self.out)?;
        Ok(())
    }
}

// ============================================================================
// CSV
// ============================================================================

/// One CSV file per view, plus `insights.csv` and `metrics.csv`
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write_rows(&self, name: &str, rows: &[AggregateRow]) -> Result<()> {
        let path = self.dir.join(format!("{}.csv", name));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;

        let columns = column_names(rows);
        if !columns.is_empty() {
            writer.write_record(&columns)?;
        }
        for row in rows {
            let record: Vec<String> = columns
                .iter()
                .map(|c| row.get(c).map(Scalar::to_string).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl PresentationSink for CsvSink {
    fn present(&mut self, render: &DashboardRender) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        for (title, rows) in &render.tables {
            self.write_rows(&file_stem(title), rows)?;
        }

        let kpi = &render.kpis;
        let metrics: Vec<(&str, Metric)> = vec![
            ("avg_duration_minutes", kpi.avg_duration_minutes),
            ("member_share", kpi.member_share),
            ("electric_share", kpi.electric_share),
            ("mom_change", render.month_over_month.change),
            ("weekday_pct", render.weekday_split.weekday_pct),
            ("weekend_pct", render.weekday_split.weekend_pct),
        ];
        let metric_rows: Vec<AggregateRow> = metrics
            .into_iter()
            .map(|(name, m)| AggregateRow::new().with("metric", name).with("value", m.value()))
            .collect();
        self.write_rows("metrics", &metric_rows)?;

        let bullet_rows: Vec<AggregateRow> = render
            .bullets
            .iter()
            .map(|b| AggregateRow::new().with("insight", b.as_str()))
            .collect();
        self.write_rows("insights", &bullet_rows)?;
        Ok(())
    }
}

/// "Top Start Stations" -> "top_start_stations"
fn file_stem(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Top Start Stations"), "top_start_stations");
        assert_eq!(file_stem("Weekday vs Weekend Split"), "weekday_vs_weekend_split");
    }

    #[test]
    fn test_column_names_union() {
        let rows = vec![
            AggregateRow::new().with("a", 1i64),
            AggregateRow::new().with("b", 2i64).with("a", 3i64),
        ];
        assert_eq!(column_names(&rows), vec!["a", "b"]);
    }

    #[test]
    fn test_display_cell() {
        assert_eq!(display_cell(&Scalar::Int(12345)), "12,345");
        assert_eq!(display_cell(&Scalar::Float(66.666)), "66.67");
        assert_eq!(display_cell(&Scalar::Null), "");
    }
}
