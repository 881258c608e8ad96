//! Run configuration loaded from a YAML file.
//!
//! Every field is optional in the file; command line flags are applied on top
//! of whatever the file provides.

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{FixedOffset, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::metadata::extractor::parse_utc_offset;
use crate::metadata::timeline::VisitAnchor;

pub const DEFAULT_CONFIG_FILE: &str = "geostamp.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum distance in time between a photo and its location, in hours.
    pub tolerance_hours: f64,
    /// Replace GPS tags that are already present.
    pub overwrite: bool,
    pub recursive: bool,
    pub visit_anchor: VisitAnchor,
    /// Program used to read and write tags.
    pub exiftool: String,
    /// Offset assumed for photos without `OffsetTimeOriginal`, e.g. `+02:00`.
    pub default_offset: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tolerance_hours: 1.0,
            overwrite: false,
            recursive: false,
            visit_anchor: VisitAnchor::default(),
            exiftool: "exiftool".to_string(),
            default_offset: None,
        }
    }
}

impl Config {
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Utf8Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.tolerance()?;
        self.default_offset()?;
        if self.exiftool.trim().is_empty() {
            anyhow::bail!("exiftool program must not be empty");
        }
        Ok(())
    }

    pub fn tolerance(&self) -> Result<TimeDelta> {
        let hours = self.tolerance_hours;
        if !hours.is_finite() || hours < 0.0 {
            anyhow::bail!("tolerance must be a non-negative number of hours, got {hours}");
        }
        TimeDelta::try_milliseconds((hours * 3_600_000.0).round() as i64)
            .with_context(|| format!("tolerance of {hours} hours is too large"))
    }

    pub fn default_offset(&self) -> Result<Option<FixedOffset>> {
        match &self.default_offset {
            None => Ok(None),
            Some(raw) => parse_utc_offset(raw)
                .map(Some)
                .with_context(|| format!("invalid default offset '{raw}', expected +HH:MM")),
        }
    }
}
