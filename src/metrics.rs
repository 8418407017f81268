//! Derived metrics: display formatting and chart series.
//!
//! Everything here is pure and total. Missing or non-numeric input renders as
//! zero instead of failing; comparisons and sorting never go through the
//! formatted strings.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::snapshot::{Breakdown, BreakdownRow};

pub const DEFAULT_TOP_N: usize = 5;

const TOKEN_UNIT: f64 = 1_000_000.0;
const TOKEN_SUFFIX: &str = "m";

/// Anything that may or may not hold a usable number.
pub trait MetricInput {
    fn as_metric(&self) -> Option<f64>;
}

impl MetricInput for i64 {
    fn as_metric(&self) -> Option<f64> {
        Some(*self as f64)
    }
}

impl MetricInput for f64 {
    fn as_metric(&self) -> Option<f64> {
        self.is_finite().then_some(*self)
    }
}

impl MetricInput for Option<i64> {
    fn as_metric(&self) -> Option<f64> {
        self.map(|v| v as f64)
    }
}

impl MetricInput for &Value {
    fn as_metric(&self) -> Option<f64> {
        self.as_f64().filter(|v| v.is_finite())
    }
}

/// Fractional digits needed to print any finite f64 exactly.
const EXACT_DIGITS: usize = 1074;

/// Fixed-point text of `value` at `decimals` places, rounded from the exact
/// stored value. Exact ties round away from zero.
fn to_fixed(value: f64, decimals: usize) -> String {
    let text = if is_exact_tie(value, decimals) {
        let scale = 10f64.powi(decimals as i32);
        // a tie is representable, so the scaled value is exactly k + 0.5
        format!("{:.*}", decimals, (value * scale).round() / scale)
    } else {
        format!("{:.*}", decimals, value)
    };
    // keep "-0.00" out of the output
    if text.starts_with('-') && text[1..].bytes().all(|b| b == b'0' || b == b'.') {
        text[1..].to_string()
    } else {
        text
    }
}

/// True when the digits past `decimals` are exactly `5` followed by zeros.
fn is_exact_tie(value: f64, decimals: usize) -> bool {
    let exact = format!("{:.*}", EXACT_DIGITS, value.abs());
    let fraction = exact.split_once('.').map(|(_, f)| f).unwrap_or("");
    match fraction.get(decimals..) {
        Some(rest) => rest.starts_with('5') && rest[1..].bytes().all(|b| b == b'0'),
        None => false,
    }
}

/// Token count in millions, two decimals: `1_500_000` → `"1.50m"`.
pub fn format_tokens<N: MetricInput>(tokens: N) -> String {
    let millions = tokens.as_metric().map(|t| t / TOKEN_UNIT).unwrap_or(0.0);
    format!("{}{}", to_fixed(millions, 2), TOKEN_SUFFIX)
}

/// Share of `total`, one decimal: `(25, 100)` → `"25.0%"`.
pub fn percentage<V: MetricInput, T: MetricInput>(value: V, total: T) -> String {
    let (Some(value), Some(total)) = (value.as_metric(), total.as_metric()) else {
        return "0.0%".to_string();
    };
    if total == 0.0 {
        return "0.0%".to_string();
    }
    format!("{}%", to_fixed(value / total * 100.0, 1))
}

/// Row field a chart series is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    /// `total_requests` on channels, `request_count` elsewhere.
    Requests,
    TotalTokens,
    Error429Count,
    NormalErrorCount,
}

impl MetricKey {
    /// Key the detail view charts for a dimension.
    pub fn chart_default() -> Self {
        MetricKey::Requests
    }

    pub fn value_of(self, row: &BreakdownRow<'_>) -> i64 {
        match self {
            MetricKey::Requests => row.requests(),
            MetricKey::TotalTokens => row.tokens(),
            MetricKey::Error429Count => row.errors().map(|(e429, _)| e429).unwrap_or(0),
            MetricKey::NormalErrorCount => row.errors().map(|(_, normal)| normal).unwrap_or(0),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MetricKey::Requests => "请求次数",
            MetricKey::TotalTokens => "消耗Tokens",
            MetricKey::Error429Count => "429错误",
            MetricKey::NormalErrorCount => "普通错误",
        }
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "total_requests" | "request_count" | "requests" => Ok(MetricKey::Requests),
            "total_tokens" | "tokens" => Ok(MetricKey::TotalTokens),
            "error_429_count" => Ok(MetricKey::Error429Count),
            "normal_error_count" => Ok(MetricKey::NormalErrorCount),
            other => Err(format!("unknown metric key '{other}'")),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKey::Requests => "requests",
            MetricKey::TotalTokens => "total_tokens",
            MetricKey::Error429Count => "error_429_count",
            MetricKey::NormalErrorCount => "normal_error_count",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: i64,
}

/// First `n` rows of a table as chart points. Rows come pre-sorted from the
/// producer and are not reordered here.
pub fn top_n(table: Breakdown<'_>, key: MetricKey, n: usize) -> Vec<ChartPoint> {
    table
        .rows()
        .iter()
        .take(n)
        .map(|row| ChartPoint {
            label: row.label(),
            value: key.value_of(row),
        })
        .collect()
}
