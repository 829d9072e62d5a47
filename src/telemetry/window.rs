//! Dashboard time windows
//!
//! Either a relative range token (`15m`, `1h`, `6h`, `24h`, `7d`, `30d`)
//! ending at `now`, or explicit `start`/`end` unix timestamps.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_RANGE: &str = "24h";

const RANGES: &[(&str, i64)] = &[
    ("15m", 15 * 60),
    ("1h", 60 * 60),
    ("6h", 6 * 60 * 60),
    ("24h", 24 * 60 * 60),
    ("7d", 7 * 24 * 60 * 60),
    ("30d", 30 * 24 * 60 * 60),
];

/// Query parameters accepted by dashboard endpoints
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WindowQuery {
    pub range: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The `span` immediately preceding `now`
    pub fn trailing(span: Duration, now: DateTime<Utc>) -> Self {
        Self {
            start: now - span,
            end: now,
        }
    }

    pub fn range_span(token: &str) -> Option<Duration> {
        RANGES
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, secs)| Duration::seconds(*secs))
    }

    /// Resolve query parameters against `now`.
    ///
    /// Explicit bounds win over `range`. A missing `end` means `now`; a
    /// missing `start` means 24h before `end`.
    pub fn resolve(query: &WindowQuery, now: DateTime<Utc>) -> ApiResult<Self> {
        if query.start.is_some() || query.end.is_some() {
            let end = match query.end {
                Some(secs) => timestamp(secs, "end")?,
                None => now,
            };
            let start = match query.start {
                Some(secs) => timestamp(secs, "start")?,
                None => end.checked_sub_signed(Duration::hours(24)).ok_or_else(|| {
                    ApiError::validation("end", "end is too early to derive a 24h window")
                })?,
            };
            if start > end {
                return Err(ApiError::validation("start", "start must not be after end"));
            }
            return Ok(Self { start, end });
        }

        let token = query.range.as_deref().unwrap_or(DEFAULT_RANGE);
        let span = Self::range_span(token).ok_or_else(|| {
            ApiError::validation(
                "range",
                format!("unknown range '{}', expected one of 15m, 1h, 6h, 24h, 7d, 30d", token),
            )
        })?;
        Ok(Self::trailing(span, now))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

fn timestamp(secs: i64, field: &str) -> ApiResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ApiError::validation(field, format!("{} is not a valid unix timestamp", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(range: Option<&str>, start: Option<i64>, end: Option<i64>) -> WindowQuery {
        WindowQuery {
            range: range.map(String::from),
            start,
            end,
        }
    }

    #[test]
    fn test_default_is_24h() {
        let now = Utc::now();
        let window = TimeWindow::resolve(&WindowQuery::default(), now).unwrap();
        assert_eq!(window.end, now);
        assert_eq!(window.end - window.start, Duration::hours(24));
    }

    #[test]
    fn test_range_tokens() {
        let now = Utc::now();
        for (token, minutes) in [("15m", 15), ("1h", 60), ("6h", 360), ("7d", 10080), ("30d", 43200)] {
            let window = TimeWindow::resolve(&query(Some(token), None, None), now).unwrap();
            assert_eq!(window.end - window.start, Duration::minutes(minutes), "{}", token);
        }
    }

    #[test]
    fn test_unknown_range_is_validation_error() {
        let err = TimeWindow::resolve(&query(Some("2w"), None, None), Utc::now()).unwrap_err();
        assert!(matches!(err, ApiError::Validation { ref field, .. } if field == "range"));
    }

    #[test]
    fn test_explicit_bounds_override_range() {
        let now = Utc::now();
        let window = TimeWindow::resolve(&query(Some("1h"), Some(1_000), Some(5_000)), now).unwrap();
        assert_eq!(window.start.timestamp(), 1_000);
        assert_eq!(window.end.timestamp(), 5_000);
        assert!(window.contains(DateTime::from_timestamp(5_000, 0).unwrap()));
        assert!(!window.contains(DateTime::from_timestamp(5_001, 0).unwrap()));
    }

    #[test]
    fn test_partial_bounds() {
        let now = Utc::now();
        let only_start = TimeWindow::resolve(&query(None, Some(1_000), None), now).unwrap();
        assert_eq!(only_start.end, now);

        let only_end = TimeWindow::resolve(&query(None, None, Some(100_000)), now).unwrap();
        assert_eq!(only_end.start.timestamp(), 100_000 - 86_400);
    }

    #[test]
    fn test_end_near_minimum_timestamp_rejected() {
        let err = TimeWindow::resolve(&query(None, None, Some(-8_334_601_228_800)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { ref field, .. } if field == "end"));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = TimeWindow::resolve(&query(None, Some(5_000), Some(1_000)), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}
