//! Report specification: raw form input, validation and the wire payload.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::dimension::Dimension;
use crate::error::ValidationError;

const DEFAULT_NAME_LABEL: &str = "用量报告";

const LOCAL_TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Unvalidated input as typed by the operator.
#[derive(Debug, Clone, Default)]
pub struct ReportForm {
    pub name: Option<String>,
    pub items: Vec<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Closed time window in unix seconds, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: i64,
    end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvertedRange);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }
}

/// Validated report specification, ready to send to the producer.
///
/// `range == None` means "let the producer pick its default window"; the
/// bounds are then omitted from the payload entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpec {
    pub name: String,
    pub statistic_items: Vec<Dimension>,
    pub range: Option<TimeRange>,
}

/// `POST /api/reports` body.
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload<'a> {
    pub name: &'a str,
    pub statistic_items: &'a [Dimension],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl ReportSpec {
    pub fn payload(&self) -> ReportPayload<'_> {
        ReportPayload {
            name: &self.name,
            statistic_items: &self.statistic_items,
            start_time: self.range.map(|r| r.start()),
            end_time: self.range.map(|r| r.end()),
        }
    }
}

/// The originating request as echoed back inside a snapshot.
///
/// Kept verbatim: items stay strings so an unexpected label from the
/// producer does not make the whole snapshot unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "statisticItems")]
    pub statistic_items: Vec<String>,
    #[serde(default, alias = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, alias = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl RawRequest {
    pub fn requested(&self, dim: Dimension) -> bool {
        dim == Dimension::Overview || self.statistic_items.iter().any(|i| i == dim.wire_label())
    }

    /// Explicit window, if the request carried one. Zero means unset.
    pub fn explicit_range(&self) -> Option<(i64, i64)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start > 0 && end > 0 => Some((start, end)),
            _ => None,
        }
    }
}

impl ReportForm {
    pub fn validate(&self, now: DateTime<Local>) -> Result<ReportSpec, ValidationError> {
        let selected: Vec<&String> = self.items.iter().filter(|i| !i.trim().is_empty()).collect();
        if selected.is_empty() {
            return Err(ValidationError::NoStatisticItems);
        }

        let mut items = vec![Dimension::Overview];
        for raw in selected {
            items.push(raw.parse::<Dimension>()?);
        }
        items.sort();
        items.dedup();

        let range = match (non_blank(&self.start), non_blank(&self.end)) {
            (None, None) => None,
            (Some(start), Some(end)) => Some(TimeRange::new(parse_time(start)?, parse_time(end)?)?),
            _ => return Err(ValidationError::IncompleteRange),
        };

        let name = match non_blank(&self.name) {
            Some(name) => name.to_string(),
            None => default_name(now),
        };

        Ok(ReportSpec {
            name,
            statistic_items: items,
            range,
        })
    }

    /// Form defaults: every dimension selected, no window.
    pub fn all_items() -> Vec<String> {
        Dimension::ALL.iter().map(|d| d.wire_label().to_string()).collect()
    }
}

pub fn default_name(now: DateTime<Local>) -> String {
    format!("{} - {}", DEFAULT_NAME_LABEL, now.format("%Y%m%d-%H%M%S"))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Unix seconds, or a local wall-clock time.
fn parse_time(input: &str) -> Result<i64, ValidationError> {
    if input.chars().all(|c| c.is_ascii_digit()) {
        return input
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidTime(input.to_string()));
    }

    for fmt in LOCAL_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp())
                .ok_or_else(|| ValidationError::InvalidTime(input.to_string()));
        }
    }

    Err(ValidationError::InvalidTime(input.to_string()))
}
