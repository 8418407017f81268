//! Report snapshot as produced by the aggregation engine.
//!
//! Wire names are snake_case. camelCase aliases are accepted so that
//! snapshots written by other clients still decode.

use serde::{Deserialize, Serialize};

use crate::dimension::Dimension;
use crate::request::RawRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: i64,
    pub overview: Overview,
    #[serde(default, alias = "channelStats", skip_serializing_if = "Option::is_none")]
    pub channel_stats: Option<Vec<ChannelRow>>,
    #[serde(default, alias = "userStats", skip_serializing_if = "Option::is_none")]
    pub user_stats: Option<Vec<UserRow>>,
    #[serde(default, alias = "tokenStats", skip_serializing_if = "Option::is_none")]
    pub token_stats: Option<Vec<TokenRow>>,
    #[serde(default, alias = "modelStats", skip_serializing_if = "Option::is_none")]
    pub model_stats: Option<Vec<ModelRow>>,
    #[serde(default, alias = "ipStats", skip_serializing_if = "Option::is_none")]
    pub ip_stats: Option<Vec<IpRow>>,
    #[serde(default, alias = "rawRequest")]
    pub raw_request: RawRequest,
}

/// Aggregate counters. Errors are a subset of requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default)]
    pub total_requests: i64,
    #[serde(default)]
    pub error_429_count: i64,
    /// Producer-side fraction, three decimals. Display recomputes from counts.
    #[serde(default)]
    pub error_429_percent: f64,
    #[serde(default)]
    pub normal_error_count: i64,
    #[serde(default)]
    pub normal_error_percent: f64,
}

impl Overview {
    pub fn is_consistent(&self) -> bool {
        if self.error_429_count < 0 || self.normal_error_count < 0 {
            return false;
        }
        self.error_429_count
            .checked_add(self.normal_error_count)
            .map_or(false, |errors| errors <= self.total_requests)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelRow {
    #[serde(default)]
    pub channel_id: i64,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub total_requests: i64,
    #[serde(default)]
    pub error_429_count: i64,
    #[serde(default)]
    pub error_429_percent: f64,
    #[serde(default)]
    pub normal_error_count: i64,
    #[serde(default)]
    pub normal_error_percent: f64,
    #[serde(default)]
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub request_count: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRow {
    #[serde(default)]
    pub token_id: i64,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub request_count: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRow {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub request_count: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRow {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub request_count: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

/// One breakdown table, tagged by dimension.
#[derive(Debug, Clone, Copy)]
pub enum Breakdown<'a> {
    Channel(&'a [ChannelRow]),
    User(&'a [UserRow]),
    Token(&'a [TokenRow]),
    Model(&'a [ModelRow]),
    Ip(&'a [IpRow]),
}

/// A single breakdown row, tagged by dimension.
#[derive(Debug, Clone, Copy)]
pub enum BreakdownRow<'a> {
    Channel(&'a ChannelRow),
    User(&'a UserRow),
    Token(&'a TokenRow),
    Model(&'a ModelRow),
    Ip(&'a IpRow),
}

impl<'a> Breakdown<'a> {
    pub fn len(&self) -> usize {
        match self {
            Breakdown::Channel(rows) => rows.len(),
            Breakdown::User(rows) => rows.len(),
            Breakdown::Token(rows) => rows.len(),
            Breakdown::Model(rows) => rows.len(),
            Breakdown::Ip(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Vec<BreakdownRow<'a>> {
        match *self {
            Breakdown::Channel(rows) => rows.iter().map(BreakdownRow::Channel).collect(),
            Breakdown::User(rows) => rows.iter().map(BreakdownRow::User).collect(),
            Breakdown::Token(rows) => rows.iter().map(BreakdownRow::Token).collect(),
            Breakdown::Model(rows) => rows.iter().map(BreakdownRow::Model).collect(),
            Breakdown::Ip(rows) => rows.iter().map(BreakdownRow::Ip).collect(),
        }
    }
}

impl BreakdownRow<'_> {
    /// Identifying label. Empty names fall back to the numeric id.
    pub fn label(&self) -> String {
        let (name, id) = match self {
            BreakdownRow::Channel(r) => (r.channel_name.as_str(), Some(r.channel_id)),
            BreakdownRow::User(r) => (r.username.as_str(), Some(r.user_id)),
            BreakdownRow::Token(r) => (r.token_name.as_str(), Some(r.token_id)),
            BreakdownRow::Model(r) => (r.model_name.as_str(), None),
            BreakdownRow::Ip(r) => (r.ip.as_str(), None),
        };
        match (name.trim().is_empty(), id) {
            (false, _) => name.to_string(),
            (true, Some(id)) => format!("#{id}"),
            (true, None) => "-".to_string(),
        }
    }

    /// Label with the entity id appended, as the tables show it.
    pub fn label_with_id(&self) -> String {
        match self {
            BreakdownRow::Channel(r) => format!("{} ({})", r.channel_name, r.channel_id),
            BreakdownRow::User(r) => format!("{} ({})", r.username, r.user_id),
            BreakdownRow::Token(r) => format!("{} ({})", r.token_name, r.token_id),
            BreakdownRow::Model(_) | BreakdownRow::Ip(_) => self.label(),
        }
    }

    /// `total_requests` for channels, `request_count` everywhere else.
    pub fn requests(&self) -> i64 {
        match self {
            BreakdownRow::Channel(r) => r.total_requests,
            BreakdownRow::User(r) => r.request_count,
            BreakdownRow::Token(r) => r.request_count,
            BreakdownRow::Model(r) => r.request_count,
            BreakdownRow::Ip(r) => r.request_count,
        }
    }

    pub fn tokens(&self) -> i64 {
        match self {
            BreakdownRow::Channel(r) => r.total_tokens,
            BreakdownRow::User(r) => r.total_tokens,
            BreakdownRow::Token(r) => r.total_tokens,
            BreakdownRow::Model(r) => r.total_tokens,
            BreakdownRow::Ip(r) => r.total_tokens,
        }
    }

    /// Error counters only exist for channels.
    pub fn errors(&self) -> Option<(i64, i64)> {
        match self {
            BreakdownRow::Channel(r) => Some((r.error_429_count, r.normal_error_count)),
            _ => None,
        }
    }
}

impl ReportSnapshot {
    /// Breakdown table for `dim`, `None` when the snapshot does not carry it.
    pub fn breakdown(&self, dim: Dimension) -> Option<Breakdown<'_>> {
        match dim {
            Dimension::Overview => None,
            Dimension::Channel => self.channel_stats.as_deref().map(Breakdown::Channel),
            Dimension::User => self.user_stats.as_deref().map(Breakdown::User),
            Dimension::Token => self.token_stats.as_deref().map(Breakdown::Token),
            Dimension::Model => self.model_stats.as_deref().map(Breakdown::Model),
            Dimension::Ip => self.ip_stats.as_deref().map(Breakdown::Ip),
        }
    }
}

/// Listing projection of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCatalogEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: i64,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn channel(id: i64, name: &str, requests: i64, tokens: i64) -> ChannelRow {
        ChannelRow {
            channel_id: id,
            channel_name: name.to_string(),
            total_requests: requests,
            total_tokens: tokens,
            ..Default::default()
        }
    }

    pub fn snapshot(id: &str) -> ReportSnapshot {
        ReportSnapshot {
            id: id.to_string(),
            name: "用量报告 - 20231114-221320".to_string(),
            created_at: 1_700_003_700,
            overview: Overview {
                total_tokens: 3_250_000,
                total_requests: 120,
                error_429_count: 12,
                error_429_percent: 0.1,
                normal_error_count: 6,
                normal_error_percent: 0.05,
            },
            channel_stats: Some(vec![
                ChannelRow {
                    error_429_count: 10,
                    error_429_percent: 0.125,
                    normal_error_count: 4,
                    normal_error_percent: 0.05,
                    ..channel(3, "azure-east", 80, 2_000_000)
                },
                ChannelRow {
                    error_429_count: 2,
                    error_429_percent: 0.05,
                    normal_error_count: 2,
                    normal_error_percent: 0.05,
                    ..channel(7, "openai-main", 40, 1_250_000)
                },
            ]),
            user_stats: None,
            token_stats: None,
            model_stats: Some(vec![
                ModelRow {
                    model_name: "gpt-4o".to_string(),
                    request_count: 90,
                    total_tokens: 2_900_000,
                },
                ModelRow {
                    model_name: "gpt-4o-mini".to_string(),
                    request_count: 30,
                    total_tokens: 350_000,
                },
            ]),
            ip_stats: Some(vec![]),
            raw_request: RawRequest {
                name: "用量报告 - 20231114-221320".to_string(),
                statistic_items: vec![
                    "总览".to_string(),
                    "渠道统计".to_string(),
                    "用户统计".to_string(),
                    "模型统计".to_string(),
                    "IP统计".to_string(),
                ],
                start_time: Some(1_700_000_000),
                end_time: Some(1_700_003_600),
            },
        }
    }
}
