//! Terminal and machine-readable output for reports and the catalog.

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::fmt::{self, Write};

use crate::catalog::CatalogView;
use crate::error::ReportError;
use crate::snapshot::ReportSnapshot;
use crate::utils::{format_unix, pad_right, short_id, truncate};
use crate::view::{ChartSpec, Load, ReportView, RowView, SectionBody, SectionView};

const RULE: &str = "════════════════════════════════════════════════════";
const THIN_RULE: &str = "────────────────────────────────────────────────────";
const LABEL_WIDTH: usize = 28;
const BAR_WIDTH: usize = 30;
const EMPTY_CATALOG: &str = "暂无历史报告记录。";
const UNNAMED_REPORT: &str = "未命名报告";
const SECTION_EMPTY: &str = "此时间范围内无数据。";
const SECTION_MISSING: &str = "此部分无数据，或未在生成报告时选择。";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and bar charts
    Text,
    /// Derived view model as JSON
    Json,
    /// Snapshot exactly as stored
    Raw,
    /// One line per breakdown row
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

/// Render a report load. `id` is echoed in error output when known.
pub fn report(
    state: &Load<ReportSnapshot>,
    id: Option<&str>,
    format: OutputFormat,
    chart: ChartSpec,
) -> Result<String> {
    let snapshot = match state {
        Load::Ready(snapshot) => snapshot,
        Load::Pending => return Ok("Report is still loading.\n".to_string()),
        Load::Failed(err) => return failure(err, id, format),
    };

    match format {
        OutputFormat::Raw => {
            serde_json::to_string_pretty(snapshot).context("Failed to serialize report snapshot")
        }
        OutputFormat::Json => {
            let view = ReportView::from_snapshot(snapshot, chart);
            serde_json::to_string_pretty(&view).context("Failed to serialize report view")
        }
        OutputFormat::Csv => {
            let view = ReportView::from_snapshot(snapshot, chart);
            Ok(csv(&view))
        }
        OutputFormat::Text => {
            let view = ReportView::from_snapshot(snapshot, chart);
            let mut out = String::new();
            write_report(&mut out, &view).context("Failed to format report")?;
            Ok(out)
        }
    }
}

fn failure(err: &ReportError, id: Option<&str>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let output = ErrorOutput {
                error: ErrorBody {
                    kind: err.kind(),
                    message: err.to_string(),
                    id,
                },
            };
            serde_json::to_string_pretty(&output).context("Failed to serialize error")
        }
        OutputFormat::Text | OutputFormat::Csv => Ok(error_line(err, id)),
    }
}

pub fn error_line(err: &ReportError, id: Option<&str>) -> String {
    let subject = match id {
        Some(id) => format!("Report {} unavailable", id),
        None => "Report unavailable".to_string(),
    };
    format!("{} {}: {}\n", "✗".red().bold(), subject, err)
}

fn write_report(out: &mut String, view: &ReportView) -> fmt::Result {
    let h = &view.header;
    writeln!(out, "📊 {}", h.name.bold())?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "  ID:       {}", h.id)?;
    writeln!(out, "  Created:  {}", h.created_at)?;
    writeln!(out, "  Range:    {}", h.time_range)?;
    writeln!(out, "  Items:    {}", h.items.join(", "))?;
    writeln!(out)?;

    for card in &view.overview {
        writeln!(out, "  {} {}", pad_right(card.title, 16), card.value.cyan())?;
    }
    writeln!(out)?;

    for section in &view.sections {
        write_section(out, section)?;
    }
    Ok(())
}

fn write_section(out: &mut String, section: &SectionView) -> fmt::Result {
    writeln!(out, "{}", section.title.bold())?;
    writeln!(out, "{}", THIN_RULE)?;

    let (rows, chart) = match &section.body {
        SectionBody::Rows { rows, chart } => (rows, chart),
        SectionBody::Empty => {
            writeln!(out, "  {}", SECTION_EMPTY.dimmed())?;
            return writeln!(out);
        }
        SectionBody::Missing => {
            writeln!(out, "  {}", SECTION_MISSING.dimmed())?;
            return writeln!(out);
        }
    };

    let with_errors = rows.iter().any(|r| r.error_429.is_some());
    if with_errors {
        writeln!(
            out,
            "{} {:>10} {:>10} {:>14} {:>14}",
            pad_right("Name", LABEL_WIDTH),
            "Requests",
            "Tokens",
            "429",
            "Errors"
        )?;
    } else {
        writeln!(
            out,
            "{} {:>10} {:>10}",
            pad_right("Name", LABEL_WIDTH),
            "Requests",
            "Tokens"
        )?;
    }

    for row in rows {
        write_row(out, row, with_errors)?;
    }
    writeln!(out)?;

    let max = chart.points.iter().map(|p| p.value).max().unwrap_or(0);
    writeln!(
        out,
        "  {} ({}, top {})",
        chart.title,
        chart.metric,
        chart.points.len()
    )?;
    for point in &chart.points {
        writeln!(
            out,
            "  {} {} {}",
            pad_right(&truncate(&point.label, 20), 20),
            bar(point.value, max, BAR_WIDTH).green(),
            point.value
        )?;
    }
    writeln!(out)
}

fn write_row(out: &mut String, row: &RowView, with_errors: bool) -> fmt::Result {
    let label = pad_right(&truncate(&row.label, LABEL_WIDTH), LABEL_WIDTH);
    if with_errors {
        let e429 = row.error_429.as_ref().map(|c| c.to_string()).unwrap_or_default();
        let normal = row
            .normal_errors
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_default();
        writeln!(
            out,
            "{} {:>10} {:>10} {:>14} {:>14}",
            label, row.requests, row.tokens_display, e429, normal
        )
    } else {
        writeln!(
            out,
            "{} {:>10} {:>10}",
            label, row.requests, row.tokens_display
        )
    }
}

/// Proportional bar, at least one cell for any non-zero value.
fn bar(value: i64, max: i64, width: usize) -> String {
    if value <= 0 || max <= 0 {
        return String::new();
    }
    let cells = ((value as f64 / max as f64) * width as f64).round() as usize;
    "█".repeat(cells.clamp(1, width))
}

fn csv(view: &ReportView) -> String {
    let mut out = String::from("dimension,label,requests,tokens,error_429,normal_errors\n");
    for section in &view.sections {
        let SectionBody::Rows { rows, .. } = &section.body else {
            continue;
        };
        for row in rows {
            let e429 = row.error_429.as_ref().map(|c| c.count.to_string()).unwrap_or_default();
            let normal = row
                .normal_errors
                .as_ref()
                .map(|c| c.count.to_string())
                .unwrap_or_default();
            out.push_str(&format!(
                "{},{},{},{},{},{}\n",
                section.dimension.short_name(),
                csv_field(&row.label),
                row.requests,
                row.tokens,
                e429,
                normal
            ));
        }
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn catalog(view: &CatalogView, format: ListFormat) -> Result<String> {
    match format {
        ListFormat::Json => {
            serde_json::to_string_pretty(view).context("Failed to serialize report catalog")
        }
        ListFormat::Text => {
            let mut out = String::new();
            write_catalog(&mut out, view).context("Failed to format report catalog")?;
            Ok(out)
        }
    }
}

fn write_catalog(out: &mut String, view: &CatalogView) -> fmt::Result {
    writeln!(out, "📋 Reports ({})", view.entries.len())?;
    writeln!(out, "{}", RULE)?;

    if let Some(err) = &view.error {
        writeln!(out, "{} {}", "⚠️ ".yellow(), err)?;
    }
    if view.is_empty() {
        return writeln!(out, "{}", EMPTY_CATALOG);
    }

    for entry in &view.entries {
        let name = if entry.name.trim().is_empty() {
            UNNAMED_REPORT
        } else {
            entry.name.as_str()
        };
        writeln!(
            out,
            "  {}  {}  {}",
            short_id(&entry.id).cyan(),
            pad_right(&truncate(name, 32), 32),
            format_unix(entry.created_at).dimmed()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::snapshot;
    use crate::snapshot::ReportCatalogEntry;

    #[test]
    fn test_bar_scaling() {
        assert_eq!(bar(10, 10, 4), "████");
        assert_eq!(bar(5, 10, 4), "██");
        assert_eq!(bar(1, 1000, 4), "█");
        assert_eq!(bar(0, 10, 4), "");
    }

    #[test]
    fn test_csv_output() {
        let state = Load::Ready(snapshot("r-1"));
        let out = report(&state, None, OutputFormat::Csv, ChartSpec::default()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "dimension,label,requests,tokens,error_429,normal_errors");
        assert_eq!(lines[1], "channel,azure-east (3),80,2000000,10,4");
        assert_eq!(lines[3], "model,gpt-4o,90,2900000,,");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_json_view_carries_section_states() {
        let state = Load::Ready(snapshot("r-1"));
        let out = report(&state, None, OutputFormat::Json, ChartSpec::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        let states: Vec<&str> = json["sections"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["body"]["state"].as_str().unwrap())
            .collect();
        assert_eq!(states, vec!["rows", "missing", "rows", "empty"]);
        assert_eq!(json["overview"][2]["value"], "12 (10.0%)");
    }

    #[test]
    fn test_raw_output_is_the_snapshot() {
        let snap = snapshot("r-1");
        let out = report(
            &Load::Ready(snap.clone()),
            None,
            OutputFormat::Raw,
            ChartSpec::default(),
        )
        .unwrap();
        let back: ReportSnapshot = serde_json::from_str(&out).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_failed_load_renders_error() {
        let state: Load<ReportSnapshot> =
            Load::Failed(ReportError::NotFound("报告未找到".to_string()));
        let out = report(&state, Some("r-9"), OutputFormat::Json, ChartSpec::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["error"]["kind"], "not_found");
        assert_eq!(json["error"]["id"], "r-9");

        let text = report(&state, Some("r-9"), OutputFormat::Text, ChartSpec::default()).unwrap();
        assert!(text.contains("报告未找到"));
    }

    #[test]
    fn test_text_report_mentions_placeholders() {
        let state = Load::Ready(snapshot("r-1"));
        let out = report(&state, None, OutputFormat::Text, ChartSpec::default()).unwrap();
        assert!(out.contains(SECTION_MISSING));
        assert!(out.contains(SECTION_EMPTY));
        assert!(out.contains("azure-east (3)"));
    }

    #[test]
    fn test_catalog_text() {
        let view = CatalogView {
            entries: vec![ReportCatalogEntry {
                id: "0123456789abcdef".to_string(),
                name: "  ".to_string(),
                created_at: 1_700_000_000,
            }],
            error: None,
        };
        let out = catalog(&view, ListFormat::Text).unwrap();
        assert!(out.contains("01234567..."));
        assert!(out.contains(UNNAMED_REPORT));
    }

    #[test]
    fn test_catalog_placeholder_and_error() {
        let view = CatalogView {
            entries: Vec::new(),
            error: Some("no data".to_string()),
        };
        let out = catalog(&view, ListFormat::Text).unwrap();
        assert!(out.contains(EMPTY_CATALOG));
        assert!(out.contains("no data"));

        let json: serde_json::Value =
            serde_json::from_str(&catalog(&view, ListFormat::Json).unwrap()).unwrap();
        assert_eq!(json["entries"].as_array().unwrap().len(), 0);
        assert_eq!(json["error"], "no data");
    }
}
