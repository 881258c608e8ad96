// Location History Module
// This module is responsible for loading and querying Google Maps Timeline location history.

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, TimeDelta, Utc};
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info, warn};

use super::timeline::{VisitAnchor, parse_timeline};

/// Represents a single point in time and space from Google Location History.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Holds a sorted collection of `LocationPoint` instances for efficient querying.
#[derive(Debug, Default)]
pub struct LocationHistory {
    /// A collection of location points, guaranteed to be sorted by `timestamp`.
    data: Vec<LocationPoint>,
}

impl LocationHistory {
    /// Builds the index. Points sharing a timestamp keep their relative order.
    pub fn from_points(mut points: Vec<LocationPoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        LocationHistory { data: points }
    }

    /// Loads location history from a Google Timeline JSON export.
    ///
    /// Only a missing or unreadable file, or a document that is not a record
    /// array, is an error. Bad records are logged and skipped.
    pub fn from_json_file(path: &Utf8Path, anchor: VisitAnchor) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open location history: {path}"))?;
        let reader = BufReader::new(file);
        let document: serde_json::Value = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse location history JSON: {path}"))?;

        let parsed = parse_timeline(document, anchor)
            .with_context(|| format!("Unsupported location history layout: {path}"))?;

        for warning in &parsed.warnings {
            warn!("{path}: {warning}");
        }

        let history = LocationHistory::from_points(parsed.points);
        info!(
            points = history.len(),
            skipped = parsed.warnings.len(),
            "loaded location history"
        );
        if let Some((first, last)) = history.time_span() {
            debug!(%first, %last, "location history span");
        }

        Ok(history)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn points(&self) -> &[LocationPoint] {
        &self.data
    }

    /// Timestamps of the first and last points.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.data.first()?.timestamp, self.data.last()?.timestamp))
    }

    /// Finds the two points surrounding a given timestamp.
    ///
    /// The first is the last point strictly before `target`, the second the
    /// first point at or after it.
    pub fn find_closest_points(
        &self,
        target: DateTime<Utc>,
    ) -> (Option<&LocationPoint>, Option<&LocationPoint>) {
        // Insertion point: everything left of it is strictly earlier.
        let index = self.data.partition_point(|p| p.timestamp < target);

        let before = if index > 0 {
            self.data.get(index - 1)
        } else {
            None
        };
        let after = self.data.get(index);
        (before, after)
    }

    /// Returns the point closest in time to `target`, if it lies within `tolerance`.
    ///
    /// The earlier point wins when both neighbours are equally far away.
    pub fn nearest(&self, target: DateTime<Utc>, tolerance: TimeDelta) -> Option<&LocationPoint> {
        let (before, after) = self.find_closest_points(target);
        let within = |p: &&LocationPoint| (p.timestamp - target).abs() <= tolerance;

        match (before.filter(within), after.filter(within)) {
            (Some(b), Some(a)) => {
                if (a.timestamp - target).abs() < (target - b.timestamp).abs() {
                    Some(a)
                } else {
                    Some(b)
                }
            }
            (Some(b), None) => Some(b),
            (None, a) => a,
        }
    }
}
