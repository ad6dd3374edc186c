// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Humanized duration parsing for config and grimoire fields.
//!
//! Accepts bare seconds (`300`), or a number with a unit suffix:
//! `ms`, `s`, `m`, `h`, `d`.

use std::time::Duration;

/// Parse a humanized duration string.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: u64 = num.parse().map_err(|_| format!("invalid duration: {s:?}"))?;
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        "d" => Ok(Duration::from_secs(value * 86_400)),
        other => Err(format!("unknown duration unit {other:?} in {s:?}")),
    }
}

/// Serde adapter for `Duration` fields holding humanized strings.
pub mod serde_duration {
    use super::parse_duration;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_secs())
    }

    /// Same adapter for `Option<Duration>`.
    pub mod opt {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw: Option<super::Raw> = Option::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(super::Raw::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
                Some(super::Raw::Text(s)) => {
                    super::parse_duration(&s).map(Some).map_err(serde::de::Error::custom)
                }
            }
        }

        pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(d) => serializer.serialize_some(&d.as_secs()),
                None => serializer.serialize_none(),
            }
        }
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
