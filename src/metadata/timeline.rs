// Timeline Module
// Normalizes the record shapes found in a Google Timeline export into location points.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::location::parse_geo_string;
use super::location_history::LocationPoint;

/// Keys under which exports wrap the record array when the document is an object.
const WRAPPER_KEYS: [&str; 2] = ["timelineObjects", "semanticSegments"];
const RECORD_KEYS: [&str; 3] = ["timelinePath", "activity", "visit"];

/// A single timeline record that could not be used, in whole or in part.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseWarning {
    #[error("record {index}: none of timelinePath, activity or visit present")]
    UnrecognizedRecord { index: usize },
    #[error("record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
    #[error("record {index}: unparseable timestamp '{value}'")]
    InvalidTimestamp { index: usize, value: String },
    #[error("record {index}: malformed geo string '{value}'")]
    MalformedGeo { index: usize, value: String },
}

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("location history must be a JSON array of records, found {0}")]
    UnsupportedDocument(&'static str),
}

/// Which instant of a visit's interval its single location point is pinned to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VisitAnchor {
    Start,
    #[default]
    Midpoint,
}

// Google exports the path offset as a string ("12"), but plain numbers show up too.
fn parse_offset_minutes<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Offset {
        Text(String),
        Number(i64),
    }

    match Offset::deserialize(deserializer)? {
        Offset::Number(n) => Ok(n),
        Offset::Text(s) => s.trim().parse::<i64>().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub start_time: String,
    pub end_time: String,
    pub activity: ActivityBlock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityBlock {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub start_time: String,
    pub end_time: String,
    pub visit: VisitBlock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitBlock {
    pub top_candidate: Option<VisitCandidate>,
    pub place_location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitCandidate {
    pub place_location: String,
}

impl VisitBlock {
    fn place_location(&self) -> Option<&str> {
        self.top_candidate
            .as_ref()
            .map(|c| c.place_location.as_str())
            .or(self.place_location.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRecord {
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    pub timeline_path: Vec<PathVertex>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathVertex {
    pub point: String,
    #[serde(deserialize_with = "parse_offset_minutes")]
    pub duration_minutes_offset_from_start_time: i64,
}

/// One record of the export, classified by which block it carries.
#[derive(Debug, Clone)]
pub enum RawTimelineRecord {
    Activity(ActivityRecord),
    Visit(VisitRecord),
    Path(PathRecord),
}

impl RawTimelineRecord {
    /// Classifies a raw JSON record. `timelinePath` wins over `activity`, which wins over `visit`.
    pub fn from_value(index: usize, value: Value) -> Result<Self, ParseWarning> {
        let Some(fields) = value.as_object() else {
            return Err(ParseWarning::UnrecognizedRecord { index });
        };

        let invalid = |e: serde_json::Error| ParseWarning::InvalidRecord {
            index,
            reason: e.to_string(),
        };

        if fields.contains_key("timelinePath") {
            serde_json::from_value(value).map(Self::Path).map_err(invalid)
        } else if fields.contains_key("activity") {
            serde_json::from_value(value)
                .map(Self::Activity)
                .map_err(invalid)
        } else if fields.contains_key("visit") {
            serde_json::from_value(value).map(Self::Visit).map_err(invalid)
        } else {
            Err(ParseWarning::UnrecognizedRecord { index })
        }
    }

    /// Maps the record to its location points.
    ///
    /// A bad timestamp fails the whole record. A bad geo string only drops the
    /// point it belongs to and is reported through `warnings`.
    pub fn normalize(
        &self,
        index: usize,
        anchor: VisitAnchor,
        warnings: &mut Vec<ParseWarning>,
    ) -> Result<Vec<LocationPoint>, ParseWarning> {
        let mut points = Vec::new();
        let mut push = |at: DateTime<Utc>, geo: &str, warnings: &mut Vec<ParseWarning>| {
            match parse_geo_string(geo) {
                Some((latitude, longitude)) => points.push(LocationPoint {
                    timestamp: at,
                    latitude,
                    longitude,
                }),
                None => warnings.push(ParseWarning::MalformedGeo {
                    index,
                    value: geo.to_string(),
                }),
            }
        };

        match self {
            Self::Activity(record) => {
                let start = parse_timestamp(index, &record.start_time)?;
                let end = parse_timestamp(index, &record.end_time)?;
                push(start, &record.activity.start, warnings);
                push(end, &record.activity.end, warnings);
            }
            Self::Visit(record) => {
                let start = parse_timestamp(index, &record.start_time)?;
                let end = parse_timestamp(index, &record.end_time)?;
                let at = match anchor {
                    VisitAnchor::Start => start,
                    VisitAnchor::Midpoint => start + (end - start) / 2,
                };
                let place = record.visit.place_location().ok_or_else(|| {
                    ParseWarning::InvalidRecord {
                        index,
                        reason: "visit has no placeLocation".to_string(),
                    }
                })?;
                push(at, place, warnings);
            }
            Self::Path(record) => {
                let start = parse_timestamp(index, &record.start_time)?;
                if let Some(end_time) = &record.end_time {
                    parse_timestamp(index, end_time)?;
                }
                for vertex in &record.timeline_path {
                    let minutes = vertex.duration_minutes_offset_from_start_time;
                    let at = TimeDelta::try_minutes(minutes)
                        .and_then(|offset| start.checked_add_signed(offset))
                        .ok_or_else(|| ParseWarning::InvalidRecord {
                            index,
                            reason: format!("path offset out of range: {minutes}"),
                        })?;
                    push(at, &vertex.point, warnings);
                }
            }
        }

        Ok(points)
    }
}

fn parse_timestamp(index: usize, value: &str) -> Result<DateTime<Utc>, ParseWarning> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseWarning::InvalidTimestamp {
            index,
            value: value.to_string(),
        })
}

/// Extracts the record array from a location-history document.
pub fn records_from_document(document: Value) -> Result<Vec<Value>, TimelineError> {
    match document {
        Value::Array(records) => Ok(records),
        Value::Object(mut fields) => {
            if RECORD_KEYS.iter().any(|key| fields.contains_key(*key)) {
                return Ok(vec![Value::Object(fields)]);
            }

            for key in WRAPPER_KEYS {
                if let Some(Value::Array(records)) = fields.remove(key) {
                    return Ok(records);
                }
            }

            match fields.values().filter(|v| v.is_array()).count() {
                0 => Ok(vec![Value::Object(fields)]),
                1 => Ok(fields
                    .into_iter()
                    .find_map(|(_, v)| match v {
                        Value::Array(records) => Some(records),
                        _ => None,
                    })
                    .unwrap_or_default()),
                _ => Err(TimelineError::UnsupportedDocument(
                    "an object with several arrays",
                )),
            }
        }
        Value::Null => Err(TimelineError::UnsupportedDocument("null")),
        Value::Bool(_) => Err(TimelineError::UnsupportedDocument("a boolean")),
        Value::Number(_) => Err(TimelineError::UnsupportedDocument("a number")),
        Value::String(_) => Err(TimelineError::UnsupportedDocument("a string")),
    }
}

/// Sorted location points plus everything that had to be skipped on the way.
#[derive(Debug, Default)]
pub struct ParsedTimeline {
    pub points: Vec<LocationPoint>,
    pub warnings: Vec<ParseWarning>,
}

pub fn parse_timeline(document: Value, anchor: VisitAnchor) -> Result<ParsedTimeline, TimelineError> {
    let mut parsed = ParsedTimeline::default();

    for (index, value) in records_from_document(document)?.into_iter().enumerate() {
        let result = RawTimelineRecord::from_value(index, value)
            .and_then(|record| record.normalize(index, anchor, &mut parsed.warnings));

        match result {
            Ok(points) => parsed.points.extend(points),
            Err(warning) => parsed.warnings.push(warning),
        }
    }

    // Stable, so records sharing a timestamp keep their export order.
    parsed.points.sort_by_key(|p| p.timestamp);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 13, h, m, 0).unwrap()
    }

    fn parse(document: Value) -> ParsedTimeline {
        parse_timeline(document, VisitAnchor::Midpoint).unwrap()
    }

    #[test]
    fn test_activity_yields_start_and_end() {
        let parsed = parse(json!([{
            "startTime": "2024-01-13T11:00:00.000+01:00",
            "endTime": "2024-01-13T11:45:00.000+01:00",
            "activity": { "start": "geo:47.1,8.1", "end": "geo:47.2,8.2" }
        }]));

        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.points.len(), 2);
        assert_eq!(parsed.points[0].timestamp, utc(10, 0));
        assert_eq!(parsed.points[0].latitude, 47.1);
        assert_eq!(parsed.points[1].timestamp, utc(10, 45));
        assert_eq!(parsed.points[1].longitude, 8.2);
    }

    #[test]
    fn test_visit_yields_single_point_at_midpoint() {
        let parsed = parse(json!([{
            "startTime": "2024-01-13T09:00:00Z",
            "endTime": "2024-01-13T10:30:00Z",
            "visit": { "topCandidate": { "placeLocation": "geo:40.0,-3.7" } }
        }]));

        assert_eq!(parsed.points.len(), 1);
        assert_eq!(parsed.points[0].timestamp, utc(9, 45));
        assert_eq!(parsed.points[0].longitude, -3.7);
    }

    #[test]
    fn test_visit_start_anchor_and_flat_place_location() {
        let document = json!([{
            "startTime": "2024-01-13T09:00:00Z",
            "endTime": "2024-01-13T10:30:00Z",
            "visit": { "placeLocation": "geo:40.0,-3.7" }
        }]);
        let parsed = parse_timeline(document, VisitAnchor::Start).unwrap();

        assert_eq!(parsed.points.len(), 1);
        assert_eq!(parsed.points[0].timestamp, utc(9, 0));
    }

    #[test]
    fn test_visit_without_place_is_skipped() {
        let parsed = parse(json!([{
            "startTime": "2024-01-13T09:00:00Z",
            "endTime": "2024-01-13T10:30:00Z",
            "visit": { "probability": "0.9" }
        }]));

        assert!(parsed.points.is_empty());
        assert!(matches!(
            parsed.warnings[0],
            ParseWarning::InvalidRecord { index: 0, .. }
        ));
    }

    #[test]
    fn test_path_yields_point_per_vertex() {
        let parsed = parse(json!([{
            "startTime": "2024-01-13T10:00:00.000+00:00",
            "endTime": "2024-01-13T12:00:00.000+00:00",
            "timelinePath": [
                { "point": "geo:1.0,1.0", "durationMinutesOffsetFromStartTime": "0" },
                { "point": "geo:2.0,2.0", "durationMinutesOffsetFromStartTime": "35" },
                { "point": "geo:3.0,3.0", "durationMinutesOffsetFromStartTime": 120 }
            ]
        }]));

        assert!(parsed.warnings.is_empty());
        let timestamps: Vec<_> = parsed.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![utc(10, 0), utc(10, 35), utc(12, 0)]);
    }

    #[test]
    fn test_path_offset_overflow_skips_only_that_record() {
        let parsed = parse(json!([
            {
                "startTime": "2024-01-13T10:00:00Z",
                "endTime": "2024-01-13T11:00:00Z",
                "timelinePath": [
                    { "point": "geo:1.0,1.0", "durationMinutesOffsetFromStartTime": "1000000000000" }
                ]
            },
            {
                "startTime": "2024-01-13T10:00:00Z",
                "endTime": "2024-01-13T10:30:00Z",
                "activity": { "start": "geo:1.0,2.0", "end": "geo:3.0,4.0" }
            }
        ]));

        assert_eq!(parsed.points.len(), 2);
        assert!(matches!(
            parsed.warnings.as_slice(),
            [ParseWarning::InvalidRecord { index: 0, .. }]
        ));
    }

    #[test]
    fn test_unparseable_end_time_fails_record() {
        let document = json!([
            {
                "startTime": "2024-01-13T10:00:00Z",
                "endTime": "garbage",
                "visit": { "topCandidate": { "placeLocation": "geo:1,1" } }
            },
            {
                "startTime": "2024-01-13T10:00:00Z",
                "endTime": "later",
                "timelinePath": [
                    { "point": "geo:2.0,2.0", "durationMinutesOffsetFromStartTime": "5" }
                ]
            }
        ]);
        let parsed = parse_timeline(document, VisitAnchor::Start).unwrap();

        assert!(parsed.points.is_empty());
        assert_eq!(
            parsed.warnings,
            vec![
                ParseWarning::InvalidTimestamp {
                    index: 0,
                    value: "garbage".to_string()
                },
                ParseWarning::InvalidTimestamp {
                    index: 1,
                    value: "later".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_malformed_geo_drops_points_not_records() {
        let parsed = parse(json!([
            {
                "startTime": "2024-01-13T08:00:00Z",
                "endTime": "2024-01-13T08:30:00Z",
                "activity": { "start": "geo:abc,def", "end": "geo:abc,def" }
            },
            {
                "startTime": "2024-01-13T09:00:00Z",
                "endTime": "2024-01-13T09:30:00Z",
                "activity": { "start": "geo:abc,def", "end": "geo:5.0,6.0" }
            },
            {
                "startTime": "2024-01-13T10:00:00Z",
                "endTime": "2024-01-13T10:30:00Z",
                "activity": { "start": "geo:1.0,2.0", "end": "geo:3.0,4.0" }
            }
        ]));

        let timestamps: Vec<_> = parsed.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![utc(9, 30), utc(10, 0), utc(10, 30)]);
        assert_eq!(parsed.warnings.len(), 3);
        assert!(
            parsed
                .warnings
                .iter()
                .all(|w| matches!(w, ParseWarning::MalformedGeo { .. }))
        );
    }

    #[test]
    fn test_unrecognized_and_bad_timestamp_records_are_skipped() {
        let parsed = parse(json!([
            { "startTime": "2024-01-13T08:00:00Z", "endTime": "2024-01-13T09:00:00Z" },
            {
                "startTime": "yesterday",
                "endTime": "2024-01-13T09:00:00Z",
                "activity": { "start": "geo:1,1", "end": "geo:2,2" }
            },
            {
                "startTime": "2024-01-13T10:00:00",
                "endTime": "2024-01-13T11:00:00Z",
                "visit": { "topCandidate": { "placeLocation": "geo:1,1" } }
            },
            "not a record",
            {
                "startTime": "2024-01-13T10:00:00Z",
                "endTime": "2024-01-13T10:00:00Z",
                "visit": { "topCandidate": { "placeLocation": "geo:1,1" } }
            }
        ]));

        assert_eq!(parsed.points.len(), 1);
        assert_eq!(
            parsed.warnings,
            vec![
                ParseWarning::UnrecognizedRecord { index: 0 },
                ParseWarning::InvalidTimestamp {
                    index: 1,
                    value: "yesterday".to_string()
                },
                ParseWarning::InvalidTimestamp {
                    index: 2,
                    value: "2024-01-13T10:00:00".to_string()
                },
                ParseWarning::UnrecognizedRecord { index: 3 },
            ]
        );
    }

    #[test]
    fn test_output_sorted_and_stable_on_ties() {
        let parsed = parse(json!([
            {
                "startTime": "2024-01-13T12:00:00Z",
                "endTime": "2024-01-13T13:00:00Z",
                "activity": { "start": "geo:1,1", "end": "geo:2,2" }
            },
            {
                "startTime": "2024-01-13T10:00:00Z",
                "endTime": "2024-01-13T12:00:00Z",
                "activity": { "start": "geo:3,3", "end": "geo:4,4" }
            }
        ]));

        let latitudes: Vec<_> = parsed.points.iter().map(|p| p.latitude).collect();
        // Both records put a point at 12:00; the earlier record's comes first.
        assert_eq!(latitudes, vec![3.0, 1.0, 4.0, 2.0]);
    }

    #[test]
    fn test_records_from_document_shapes() {
        let record = json!({ "startTime": "x", "visit": {} });

        assert_eq!(records_from_document(json!([record.clone()])).unwrap().len(), 1);
        assert_eq!(
            records_from_document(json!({ "timelineObjects": [record.clone(), record.clone()] }))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            records_from_document(json!({ "entries": [record.clone()] }))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(records_from_document(record).unwrap().len(), 1);
        assert!(records_from_document(json!("geo:1,1")).is_err());
        assert!(records_from_document(json!({ "a": [], "b": [] })).is_err());
    }
}
