//! Activity records and partition months
//!
//! The archive only understands two fields of a record: the integer `id`
//! used for deduplication and the ISO-8601 `start_date` used for partitioning
//! and recency. Every other field is carried through untouched.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ArchiveError;

/// Remote account identifier (one cache directory per account)
pub type AccountId = i64;

/// A single activity as returned by the remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub start_date: String,
    /// Opaque payload
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Activity {
    pub fn new(id: i64, start_date: impl Into<String>) -> Self {
        Self {
            id,
            start_date: start_date.into(),
            fields: Map::new(),
        }
    }

    /// Attach an extra payload field.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Parse `start_date`, keeping the offset the timestamp was written with.
    ///
    /// ISO-8601 datetimes without an offset and bare dates are read as UTC.
    pub fn timestamp(&self) -> Result<DateTime<FixedOffset>, ArchiveError> {
        let raw = self.start_date.as_str();
        let rfc3339_err = match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => return Ok(ts),
            Err(e) => e,
        };

        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            });

        match naive {
            Some(naive) => Ok(Utc.from_utc_datetime(&naive).fixed_offset()),
            None => Err(ArchiveError::InvalidTimestamp(format!(
                "{}: {}",
                self.start_date, rfc3339_err
            ))),
        }
    }

    /// Month this record is archived under, in its own offset.
    pub fn month(&self) -> Result<Month, ArchiveError> {
        self.timestamp().map(|ts| Month::of(&ts))
    }

    fn sort_key(&self) -> Option<DateTime<Utc>> {
        self.timestamp().ok().map(|ts| ts.with_timezone(&Utc))
    }

    /// Numeric payload field, 0 when missing or non-numeric.
    pub fn number(&self, name: &str) -> f64 {
        self.fields.get(name).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Boolean payload field, false when missing.
    pub fn flag(&self, name: &str) -> bool {
        self.fields.get(name).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Calendar month used as partition key, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self, ArchiveError> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(ArchiveError::InvalidMonth(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }

    /// Floor a timestamp to its month.
    pub fn of<Tz: chrono::TimeZone>(ts: &DateTime<Tz>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// All twelve months of `year`, in order.
    pub fn months_of_year(year: i32) -> Vec<Month> {
        (1..=12).map(|month| Month { year, month }).collect()
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ArchiveError::InvalidMonth(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Month::new(year, month)
    }
}

/// Last-writer-wins union of two record sequences keyed by `id`.
///
/// Records from `newer` replace records from `older` with the same id, and a
/// later duplicate inside either sequence replaces an earlier one. Each id
/// keeps the position of its first appearance.
pub fn merge_by_id(
    older: impl IntoIterator<Item = Activity>,
    newer: impl IntoIterator<Item = Activity>,
) -> Vec<Activity> {
    let mut merged: Vec<Activity> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for activity in older.into_iter().chain(newer) {
        match positions.get(&activity.id) {
            Some(&idx) => merged[idx] = activity,
            None => {
                positions.insert(activity.id, merged.len());
                merged.push(activity);
            }
        }
    }

    merged
}

/// Sort newest first. Records with an unparseable `start_date` go last.
pub fn sort_newest_first(activities: &mut [Activity]) {
    activities.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_month_parse_and_display() {
        let month: Month = "2024-01".parse().unwrap();
        assert_eq!(month.year(), 2024);
        assert_eq!(month.month(), 1);
        assert_eq!(month.to_string(), "2024-01");

        assert!("2024-13".parse::<Month>().is_err());
        assert!("2024-1".parse::<Month>().is_err());
        assert!("24-01".parse::<Month>().is_err());
        assert!("2024_01".parse::<Month>().is_err());
        assert!("".parse::<Month>().is_err());
    }

    #[test]
    fn test_month_uses_embedded_offset() {
        // 23:30 on Jan 31 at -05:00 is already Feb 1 in UTC
        let activity = Activity::new(1, "2024-01-31T23:30:00-05:00");
        assert_eq!(activity.month().unwrap().to_string(), "2024-01");

        let utc = Activity::new(2, "2024-02-01T00:00:00Z");
        assert_eq!(utc.month().unwrap().to_string(), "2024-02");
    }

    #[test]
    fn test_invalid_timestamp() {
        for bad in ["yesterday", "2024-13-01", "2024-01-15T25:00:00", ""] {
            let activity = Activity::new(1, bad);
            assert!(
                matches!(activity.month(), Err(ArchiveError::InvalidTimestamp(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_timestamp_without_offset_is_utc() {
        let local = Activity::new(1, "2024-02-01T10:00:00");
        assert_eq!(local.timestamp().unwrap().to_rfc3339(), "2024-02-01T10:00:00+00:00");

        let fractional = Activity::new(2, "2024-02-01T10:00:00.250");
        assert_eq!(
            fractional.timestamp().unwrap().timestamp_millis(),
            local.timestamp().unwrap().timestamp_millis() + 250
        );

        let date_only = Activity::new(3, "2024-01-15");
        assert_eq!(date_only.timestamp().unwrap().to_rfc3339(), "2024-01-15T00:00:00+00:00");
        assert_eq!(date_only.month().unwrap().to_string(), "2024-01");
    }

    #[test]
    fn test_payload_passes_through() {
        let raw = json!({
            "id": 7,
            "start_date": "2024-03-01T10:00:00Z",
            "name": "Lunch Run",
            "map": { "summary_polyline": "abc" },
        });
        let activity: Activity = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(activity.id, 7);
        assert_eq!(activity.fields["name"], json!("Lunch Run"));
        assert_eq!(serde_json::to_value(&activity).unwrap(), raw);
    }

    #[test]
    fn test_merge_by_id_newer_wins() {
        let older = vec![
            Activity::new(1, "2024-01-01T00:00:00Z").with_field("name", "old"),
            Activity::new(2, "2024-01-02T00:00:00Z"),
        ];
        let newer = vec![
            Activity::new(3, "2024-01-03T00:00:00Z"),
            Activity::new(1, "2024-01-01T00:00:00Z").with_field("name", "updated"),
        ];

        let merged = merge_by_id(older, newer);
        let ids: Vec<i64> = merged.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(merged[0].fields["name"], json!("updated"));
    }

    #[test]
    fn test_merge_by_id_dedups_within_sequence() {
        let newer = vec![
            Activity::new(1, "2024-01-01T00:00:00Z").with_field("v", 1),
            Activity::new(1, "2024-01-01T00:00:00Z").with_field("v", 2),
        ];
        let merged = merge_by_id(Vec::new(), newer);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].fields["v"], json!(2));
    }

    #[test]
    fn test_sort_newest_first() {
        let mut activities = vec![
            Activity::new(1, "2024-01-01T00:00:00Z"),
            Activity::new(2, "garbage"),
            Activity::new(3, "2024-03-01T00:00:00+02:00"),
            Activity::new(4, "2024-02-01T00:00:00Z"),
        ];
        sort_newest_first(&mut activities);
        let ids: Vec<i64> = activities.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 4, 1, 2]);
    }
}
