use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

use super::context::ImageRecord;
use super::location::is_valid_coordinate;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("failed to read metadata from {path}: {reason}")]
    Read { path: Utf8PathBuf, reason: String },
    #[error("failed to write GPS tags to {path}: {reason}")]
    Write { path: Utf8PathBuf, reason: String },
    #[error("metadata tool '{program}' is not usable: {reason}")]
    Unavailable { program: String, reason: String },
}

impl GatewayError {
    pub fn read(path: &Utf8Path, reason: impl Into<String>) -> Self {
        GatewayError::Read {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn write(path: &Utf8Path, reason: impl Into<String>) -> Self {
        GatewayError::Write {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Reads capture times and GPS tags from photos, and writes GPS tags back.
pub trait MetadataGateway {
    fn read_capture_timestamp(&self, path: &Utf8Path) -> Result<DateTime<Utc>, GatewayError>;

    fn has_gps_tags(&self, path: &Utf8Path) -> Result<bool, GatewayError>;

    /// Signed decimal latitude and longitude, when both tags are present.
    fn read_gps(&self, path: &Utf8Path) -> Result<Option<(f64, f64)>, GatewayError>;

    fn write_gps(&self, path: &Utf8Path, latitude: f64, longitude: f64)
    -> Result<(), GatewayError>;

    /// Everything the matcher needs about one file.
    fn read_image(&self, path: &Utf8Path) -> Result<ImageRecord, GatewayError> {
        Ok(ImageRecord {
            path: path.to_path_buf(),
            capture_timestamp: self.read_capture_timestamp(path)?,
            has_existing_gps: self.has_gps_tags(path)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct StoredImage {
    capture: Option<DateTime<Utc>>,
    gps: Option<(f64, f64)>,
    reject_writes: bool,
}

/// Map-backed gateway for exercising the matcher without touching files.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    images: RefCell<HashMap<Utf8PathBuf, StoredImage>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a photo. A `None` capture time makes reads fail like a missing tag.
    pub fn insert(
        &self,
        path: impl Into<Utf8PathBuf>,
        capture: Option<DateTime<Utc>>,
        gps: Option<(f64, f64)>,
    ) {
        self.images.borrow_mut().insert(
            path.into(),
            StoredImage {
                capture,
                gps,
                reject_writes: false,
            },
        );
    }

    /// Makes every later write to `path` fail.
    pub fn reject_writes(&self, path: &Utf8Path) {
        if let Some(image) = self.images.borrow_mut().get_mut(path) {
            image.reject_writes = true;
        }
    }

    fn with_image<T>(
        &self,
        path: &Utf8Path,
        f: impl FnOnce(&StoredImage) -> T,
    ) -> Result<T, GatewayError> {
        self.images
            .borrow()
            .get(path)
            .map(f)
            .ok_or_else(|| GatewayError::read(path, "no such file"))
    }
}

impl MetadataGateway for InMemoryGateway {
    fn read_capture_timestamp(&self, path: &Utf8Path) -> Result<DateTime<Utc>, GatewayError> {
        self.with_image(path, |image| image.capture)?
            .ok_or_else(|| GatewayError::read(path, "DateTimeOriginal tag missing"))
    }

    fn has_gps_tags(&self, path: &Utf8Path) -> Result<bool, GatewayError> {
        self.with_image(path, |image| image.gps.is_some())
    }

    fn read_gps(&self, path: &Utf8Path) -> Result<Option<(f64, f64)>, GatewayError> {
        self.with_image(path, |image| image.gps)
    }

    fn write_gps(
        &self,
        path: &Utf8Path,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), GatewayError> {
        if !is_valid_coordinate(latitude, longitude) {
            return Err(GatewayError::write(
                path,
                format!("coordinates out of range: {latitude}, {longitude}"),
            ));
        }

        let mut images = self.images.borrow_mut();
        let image = images
            .get_mut(path)
            .ok_or_else(|| GatewayError::write(path, "no such file"))?;
        if image.reject_writes {
            return Err(GatewayError::write(path, "file is read-only"));
        }
        image.gps = Some((latitude, longitude));
        Ok(())
    }
}
