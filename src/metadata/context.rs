use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};

/// What the matcher needs to know about one photo.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub path: Utf8PathBuf,
    pub capture_timestamp: DateTime<Utc>,
    pub has_existing_gps: bool,
}
