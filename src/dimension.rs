use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Breakdown axes of a usage report. Overview is always part of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Overview,
    Channel,
    User,
    Token,
    Model,
    Ip,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Overview,
        Dimension::Channel,
        Dimension::User,
        Dimension::Token,
        Dimension::Model,
        Dimension::Ip,
    ];

    /// Dimensions that carry a breakdown table.
    pub const BREAKDOWNS: [Dimension; 5] = [
        Dimension::Channel,
        Dimension::User,
        Dimension::Token,
        Dimension::Model,
        Dimension::Ip,
    ];

    /// Label exchanged with the producer. Must not change.
    pub fn wire_label(self) -> &'static str {
        match self {
            Dimension::Overview => "总览",
            Dimension::Channel => "渠道统计",
            Dimension::User => "用户统计",
            Dimension::Token => "Token统计",
            Dimension::Model => "模型统计",
            Dimension::Ip => "IP统计",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Dimension::Overview => "overview",
            Dimension::Channel => "channel",
            Dimension::User => "user",
            Dimension::Token => "token",
            Dimension::Model => "model",
            Dimension::Ip => "ip",
        }
    }

    pub fn from_wire(label: &str) -> Option<Dimension> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.wire_label() == label)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_label())
    }
}

impl FromStr for Dimension {
    type Err = ValidationError;

    /// Accepts the wire label or a case-insensitive ascii alias.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(dim) = Dimension::from_wire(trimmed) {
            return Ok(dim);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "overview" => Ok(Dimension::Overview),
            "channel" | "channels" => Ok(Dimension::Channel),
            "user" | "users" => Ok(Dimension::User),
            "token" | "tokens" => Ok(Dimension::Token),
            "model" | "models" => Ok(Dimension::Model),
            "ip" | "ips" => Ok(Dimension::Ip),
            _ => Err(ValidationError::UnknownItem(trimmed.to_string())),
        }
    }
}

impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_label())
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Dimension::from_wire(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown statistic item '{label}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_labels_are_fixed() {
        let labels: Vec<&str> = Dimension::ALL.iter().map(|d| d.wire_label()).collect();
        assert_eq!(
            labels,
            vec!["总览", "渠道统计", "用户统计", "Token统计", "模型统计", "IP统计"]
        );
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("渠道统计".parse::<Dimension>(), Ok(Dimension::Channel));
        assert_eq!("IP".parse::<Dimension>(), Ok(Dimension::Ip));
        assert_eq!(" Users ".parse::<Dimension>(), Ok(Dimension::User));
        assert_eq!(
            "region".parse::<Dimension>(),
            Err(ValidationError::UnknownItem("region".to_string()))
        );
    }

    #[test]
    fn test_serializes_as_wire_label() {
        let json = serde_json::to_string(&vec![Dimension::Overview, Dimension::Token]).unwrap();
        assert_eq!(json, r#"["总览","Token统计"]"#);
        let back: Vec<Dimension> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Dimension::Overview, Dimension::Token]);
    }

    #[test]
    fn test_unknown_wire_label_rejected() {
        assert!(serde_json::from_str::<Dimension>(r#""channel""#).is_err());
    }
}
