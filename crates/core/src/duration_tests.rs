// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    bare_seconds = { "300", 300 },
    millis       = { "250ms", 0 },
    seconds      = { "45s", 45 },
    minutes      = { "15m", 900 },
    hours        = { "1h", 3600 },
    days         = { "2d", 172_800 },
)]
fn parses_humanized_forms(input: &str, secs: u64) {
    assert_eq!(parse_duration(input).unwrap().as_secs(), secs);
}

#[test]
fn millis_keep_subsecond_precision() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
}

#[yare::parameterized(
    empty   = { "" },
    unit    = { "5fortnights" },
    garbage = { "abc" },
)]
fn rejects_invalid_input(input: &str) {
    assert!(parse_duration(input).is_err());
}

#[test]
fn serde_adapter_accepts_number_or_string() {
    #[derive(serde::Deserialize)]
    struct Probe {
        #[serde(with = "serde_duration")]
        timeout: Duration,
    }

    let from_number: Probe = serde_json::from_str(r#"{"timeout": 60}"#).unwrap();
    assert_eq!(from_number.timeout, Duration::from_secs(60));

    let from_text: Probe = serde_json::from_str(r#"{"timeout": "5m"}"#).unwrap();
    assert_eq!(from_text.timeout, Duration::from_secs(300));
}
