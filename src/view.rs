//! View state and the display model derived from a snapshot.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::dimension::Dimension;
use crate::error::ReportError;
use crate::metrics::{format_tokens, percentage, top_n, ChartPoint, MetricKey, DEFAULT_TOP_N};
use crate::snapshot::{Breakdown, BreakdownRow, ReportSnapshot};
use crate::utils::format_unix;

const DEFAULT_WINDOW_TEXT: &str = "过去24小时 (默认)";

/// Lifecycle of one asynchronous load.
#[derive(Debug, Clone, PartialEq)]
pub enum Load<T> {
    Pending,
    Ready(T),
    Failed(ReportError),
}

impl<T> Load<T> {
    pub fn from_result(result: Result<T, ReportError>) -> Self {
        match result {
            Ok(value) => Load::Ready(value),
            Err(err) => Load::Failed(err),
        }
    }
}

/// Proof that a load was started; only the latest one may complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Holder for a load that may be superseded before it finishes.
#[derive(Debug)]
pub struct ViewSlot<T> {
    state: Load<T>,
    generation: u64,
}

impl<T> Default for ViewSlot<T> {
    fn default() -> Self {
        Self {
            state: Load::Pending,
            generation: 0,
        }
    }
}

impl<T> ViewSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        self.state = Load::Pending;
        Ticket(self.generation)
    }

    /// Apply a finished load. Returns false, leaving the slot untouched, when
    /// a newer load has started since `ticket` was issued.
    pub fn complete(&mut self, ticket: Ticket, result: Result<T, ReportError>) -> bool {
        if ticket.0 != self.generation {
            debug!(
                ticket = ticket.0,
                current = self.generation,
                "discarding stale load result"
            );
            return false;
        }
        self.state = Load::from_result(result);
        true
    }

    pub fn state(&self) -> &Load<T> {
        &self.state
    }
}

/// Series shown by each section chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSpec {
    pub metric: MetricKey,
    pub len: usize,
}

impl Default for ChartSpec {
    fn default() -> Self {
        Self {
            metric: MetricKey::chart_default(),
            len: DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub header: ReportHeader,
    pub overview: Vec<OverviewCard>,
    pub sections: Vec<SectionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportHeader {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub time_range: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewCard {
    pub title: &'static str,
    pub value: String,
}

/// A count with its share of the row's requests, shown as `"12 (10.0%)"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountShare {
    pub count: i64,
    pub share: String,
}

impl CountShare {
    fn of(count: i64, total: i64) -> Self {
        Self {
            count,
            share: percentage(count, total),
        }
    }
}

impl fmt::Display for CountShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.count, self.share)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    pub label: String,
    pub requests: i64,
    pub tokens: i64,
    pub tokens_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_429: Option<CountShare>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_errors: Option<CountShare>,
}

impl RowView {
    fn from_row(row: &BreakdownRow<'_>) -> Self {
        let requests = row.requests();
        let (error_429, normal_errors) = match row.errors() {
            Some((e429, normal)) => (
                Some(CountShare::of(e429, requests)),
                Some(CountShare::of(normal, requests)),
            ),
            None => (None, None),
        };
        Self {
            label: row.label_with_id(),
            requests,
            tokens: row.tokens(),
            tokens_display: format_tokens(row.tokens()),
            error_429,
            normal_errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub metric: MetricKey,
    pub title: &'static str,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SectionBody {
    Rows { rows: Vec<RowView>, chart: Chart },
    /// Table present, but nothing happened in the window.
    Empty,
    /// Requested, but the snapshot carries no table.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionView {
    pub dimension: Dimension,
    pub title: &'static str,
    pub body: SectionBody,
}

impl SectionView {
    fn build(dimension: Dimension, table: Option<Breakdown<'_>>, spec: ChartSpec) -> Self {
        let body = match table {
            None => SectionBody::Missing,
            Some(t) if t.is_empty() => SectionBody::Empty,
            Some(t) => SectionBody::Rows {
                rows: t.rows().iter().map(RowView::from_row).collect(),
                chart: Chart {
                    metric: spec.metric,
                    title: spec.metric.title(),
                    points: top_n(t, spec.metric, spec.len),
                },
            },
        };
        Self {
            dimension,
            title: dimension.wire_label(),
            body,
        }
    }
}

impl ReportView {
    /// Sections follow canonical dimension order; a dimension is shown when
    /// it was requested or carries rows.
    pub fn from_snapshot(snapshot: &ReportSnapshot, chart: ChartSpec) -> Self {
        let raw = &snapshot.raw_request;
        let time_range = match raw.explicit_range() {
            Some((start, end)) => format!("{} 至 {}", format_unix(start), format_unix(end)),
            None => DEFAULT_WINDOW_TEXT.to_string(),
        };

        let header = ReportHeader {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            created_at: format_unix(snapshot.created_at),
            time_range,
            items: raw.statistic_items.clone(),
        };

        let o = &snapshot.overview;
        let overview = vec![
            OverviewCard {
                title: "总消耗Tokens",
                value: format_tokens(o.total_tokens),
            },
            OverviewCard {
                title: "总请求次数",
                value: o.total_requests.to_string(),
            },
            OverviewCard {
                title: "429错误",
                value: CountShare::of(o.error_429_count, o.total_requests).to_string(),
            },
            OverviewCard {
                title: "普通错误",
                value: CountShare::of(o.normal_error_count, o.total_requests).to_string(),
            },
        ];

        let sections = Dimension::BREAKDOWNS
            .into_iter()
            .filter_map(|dim| {
                let table = snapshot.breakdown(dim);
                let has_rows = table.map_or(false, |t| !t.is_empty());
                (raw.requested(dim) || has_rows).then(|| SectionView::build(dim, table, chart))
            })
            .collect();

        Self {
            header,
            overview,
            sections,
        }
    }

    pub fn section(&self, dim: Dimension) -> Option<&SectionView> {
        self.sections.iter().find(|s| s.dimension == dim)
    }
}
