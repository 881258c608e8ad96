use camino::{Utf8Path, Utf8PathBuf};
use chrono::TimeDelta;
use std::fmt;
use tracing::{debug, info, warn};

use crate::metadata::context::ImageRecord;
use crate::metadata::gateway::MetadataGateway;
use crate::metadata::location_history::{LocationHistory, LocationPoint};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub tolerance: TimeDelta,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Write,
    SkipHasGps,
    SkipNoMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub path: Utf8PathBuf,
    pub point: Option<LocationPoint>,
    /// Absolute distance in time between the photo and `point`.
    pub distance: Option<TimeDelta>,
    pub decision: Decision,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    HasGps,
    NoMatch,
    ReadFailed(String),
    WriteFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::HasGps => write!(f, "GPS data already present"),
            SkipReason::NoMatch => write!(f, "no location within tolerance"),
            SkipReason::ReadFailed(e) | SkipReason::WriteFailed(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    /// Images that were written, or would have been on a dry run.
    pub tagged: Vec<MatchResult>,
    pub skipped: Vec<(Utf8PathBuf, SkipReason)>,
}

impl BatchSummary {
    pub fn failures(&self) -> usize {
        self.skipped
            .iter()
            .filter(|(_, r)| matches!(r, SkipReason::ReadFailed(_) | SkipReason::WriteFailed(_)))
            .count()
    }
}

/// Decides, image by image, which location (if any) to write.
pub struct MatchEngine<'a> {
    history: &'a LocationHistory,
    policy: MatchPolicy,
}

impl<'a> MatchEngine<'a> {
    pub fn new(history: &'a LocationHistory, policy: MatchPolicy) -> Self {
        Self { history, policy }
    }

    pub fn decide(&self, image: &ImageRecord) -> MatchResult {
        let skip = |decision| MatchResult {
            path: image.path.clone(),
            point: None,
            distance: None,
            decision,
        };

        if image.has_existing_gps && !self.policy.overwrite {
            return skip(Decision::SkipHasGps);
        }

        match self
            .history
            .nearest(image.capture_timestamp, self.policy.tolerance)
        {
            Some(point) => MatchResult {
                path: image.path.clone(),
                point: Some(*point),
                distance: Some((point.timestamp - image.capture_timestamp).abs()),
                decision: Decision::Write,
            },
            None => skip(Decision::SkipNoMatch),
        }
    }

    /// Reads, matches and tags `files` one after another.
    ///
    /// A failure on one image is recorded in the summary and never stops the batch.
    pub fn run<G>(&self, gateway: &G, files: &[Utf8PathBuf], dry_run: bool) -> BatchSummary
    where
        G: MetadataGateway + ?Sized,
    {
        let mut summary = BatchSummary::default();

        for file in files {
            summary.processed += 1;
            match self.process_file(gateway, file, dry_run) {
                Ok(result) => summary.tagged.push(result),
                Err(reason) => summary.skipped.push((file.clone(), reason)),
            }
        }

        info!(
            processed = summary.processed,
            tagged = summary.tagged.len(),
            skipped = summary.skipped.len(),
            "batch finished"
        );
        summary
    }

    fn process_file<G>(
        &self,
        gateway: &G,
        file: &Utf8Path,
        dry_run: bool,
    ) -> Result<MatchResult, SkipReason>
    where
        G: MetadataGateway + ?Sized,
    {
        let image = gateway.read_image(file).map_err(|e| {
            warn!("{e}");
            SkipReason::ReadFailed(e.to_string())
        })?;

        let result = self.decide(&image);
        let Some(point) = result.point else {
            if result.decision == Decision::SkipHasGps {
                debug!(file = %file, "skipping, GPS data already present");
                return Err(SkipReason::HasGps);
            }
            debug!(
                file = %file,
                taken = %image.capture_timestamp,
                "skipping, no location within tolerance"
            );
            return Err(SkipReason::NoMatch);
        };

        let minutes = result.distance.map(|d| d.num_minutes()).unwrap_or_default();
        if dry_run {
            info!(
                file = %file,
                lat = point.latitude,
                lon = point.longitude,
                minutes,
                "would write GPS"
            );
            return Ok(result);
        }

        gateway
            .write_gps(file, point.latitude, point.longitude)
            .map_err(|e| {
                warn!("{e}");
                SkipReason::WriteFailed(e.to_string())
            })?;
        info!(
            file = %file,
            lat = point.latitude,
            lon = point.longitude,
            minutes,
            "GPS data updated"
        );
        Ok(result)
    }
}
