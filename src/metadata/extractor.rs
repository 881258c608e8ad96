use camino::Utf8Path;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::process::Command;
use tracing::debug;

use super::gateway::{GatewayError, MetadataGateway};
use super::location::{is_valid_coordinate, latitude_ref, longitude_ref};
use super::context::ImageRecord;
use crate::scan::is_jpeg;

const READ_TAGS: [&str; 6] = [
    "-DateTimeOriginal",
    "-OffsetTimeOriginal",
    "-GPSLatitude",
    "-GPSLatitudeRef",
    "-GPSLongitude",
    "-GPSLongitudeRef",
];

/// Tags as printed by `exiftool -j -n`. Values are kept loose because exiftool
/// prints numbers or strings depending on the file.
#[derive(Debug, Default, Deserialize)]
struct ExifToolTags {
    #[serde(rename = "DateTimeOriginal")]
    date_time_original: Option<Value>,
    #[serde(rename = "OffsetTimeOriginal")]
    offset_time_original: Option<Value>,
    #[serde(rename = "GPSLatitude")]
    gps_latitude: Option<Value>,
    #[serde(rename = "GPSLatitudeRef")]
    gps_latitude_ref: Option<Value>,
    #[serde(rename = "GPSLongitude")]
    gps_longitude: Option<Value>,
    #[serde(rename = "GPSLongitudeRef")]
    gps_longitude_ref: Option<Value>,
}

impl ExifToolTags {
    fn has_gps(&self) -> bool {
        self.gps_latitude.is_some() || self.gps_longitude.is_some()
    }

    fn gps(&self) -> Option<(f64, f64)> {
        let latitude = signed(self.gps_latitude.as_ref()?, self.gps_latitude_ref.as_ref(), 'S')?;
        let longitude = signed(
            self.gps_longitude.as_ref()?,
            self.gps_longitude_ref.as_ref(),
            'W',
        )?;
        Some((latitude, longitude))
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// With -n exiftool prints the magnitude; the hemisphere lives in the Ref tag.
fn signed(value: &Value, reference: Option<&Value>, negative_ref: char) -> Option<f64> {
    let magnitude: f64 = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };

    match reference.and_then(text) {
        Some(r) if r.starts_with(negative_ref) => Some(-magnitude.abs()),
        Some(_) => Some(magnitude.abs()),
        None => Some(magnitude),
    }
}

/// Parses a UTC offset written as `+HH:MM`, `-HHMM` or `Z`.
pub fn parse_utc_offset(offset: &str) -> Option<FixedOffset> {
    let offset = offset.trim();
    if offset.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }

    let sign = match offset.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let digits: String = offset[1..].chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Converts an EXIF `YYYY:MM:DD HH:MM:SS` local time to UTC.
///
/// The offset is the photo's own `OffsetTimeOriginal` if it has one, then
/// `fallback`, then UTC.
fn parse_exif_datetime(
    datetime: &str,
    offset: Option<&str>,
    fallback: Option<FixedOffset>,
) -> Result<DateTime<Utc>, String> {
    // Some cameras append sub-seconds or a zone; the first 19 chars are the fixed part.
    let fixed = datetime
        .trim()
        .get(..19)
        .ok_or_else(|| format!("invalid datetime format: {datetime}"))?;
    let naive = NaiveDateTime::parse_from_str(fixed, "%Y:%m:%d %H:%M:%S")
        .map_err(|e| format!("failed to parse datetime '{datetime}': {e}"))?;

    let zone = match offset {
        Some(raw) => {
            parse_utc_offset(raw).ok_or_else(|| format!("invalid OffsetTimeOriginal '{raw}'"))?
        }
        None => fallback.unwrap_or_else(|| Utc.fix()),
    };

    zone.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("ambiguous local time: {datetime}"))
}

fn parse_tags(path: &Utf8Path, stdout: &[u8]) -> Result<ExifToolTags, GatewayError> {
    let mut entries: Vec<ExifToolTags> = serde_json::from_slice(stdout)
        .map_err(|e| GatewayError::read(path, format!("unexpected exiftool output: {e}")))?;

    if entries.is_empty() {
        return Err(GatewayError::read(path, "exiftool returned no entries"));
    }
    Ok(entries.swap_remove(0))
}

/// Command line arguments that set the GPS position of a file.
pub fn gps_write_args(latitude: f64, longitude: f64) -> Vec<String> {
    vec![
        "-overwrite_original".to_string(),
        "-n".to_string(),
        format!("-GPSLatitude={:.7}", latitude.abs()),
        format!("-GPSLatitudeRef={}", latitude_ref(latitude)),
        format!("-GPSLongitude={:.7}", longitude.abs()),
        format!("-GPSLongitudeRef={}", longitude_ref(longitude)),
    ]
}

/// Gateway backed by the `exiftool` command line program, one process per call.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: String,
    default_offset: Option<FixedOffset>,
}

impl ExifTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            default_offset: None,
        }
    }

    /// Checks that `program` runs, and returns a gateway using it.
    pub fn detect(program: impl Into<String>) -> Result<Self, GatewayError> {
        let tool = Self::new(program);
        let version = tool.version()?;
        debug!(program = %tool.program, %version, "found exiftool");
        Ok(tool)
    }

    /// Offset assumed for photos that carry no `OffsetTimeOriginal` tag.
    pub fn with_default_offset(mut self, offset: Option<FixedOffset>) -> Self {
        self.default_offset = offset;
        self
    }

    pub fn version(&self) -> Result<String, GatewayError> {
        let unavailable = |reason: String| GatewayError::Unavailable {
            program: self.program.clone(),
            reason,
        };

        let output = Command::new(&self.program)
            .arg("-ver")
            .output()
            .map_err(|e| unavailable(e.to_string()))?;
        if !output.status.success() {
            return Err(unavailable(format!("exited with {}", output.status)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn read_tags(&self, path: &Utf8Path) -> Result<ExifToolTags, GatewayError> {
        let output = Command::new(&self.program)
            .args(["-j", "-n"])
            .args(READ_TAGS)
            .arg(path.as_std_path())
            .output()
            .map_err(|e| GatewayError::read(path, format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GatewayError::read(path, stderr.trim().to_string()));
        }

        parse_tags(path, &output.stdout)
    }

    fn capture_timestamp(
        &self,
        path: &Utf8Path,
        tags: &ExifToolTags,
    ) -> Result<DateTime<Utc>, GatewayError> {
        let datetime = tags
            .date_time_original
            .as_ref()
            .and_then(text)
            .ok_or_else(|| GatewayError::read(path, "DateTimeOriginal tag missing"))?;
        let offset = tags.offset_time_original.as_ref().and_then(text);

        parse_exif_datetime(&datetime, offset.as_deref(), self.default_offset)
            .map_err(|reason| GatewayError::read(path, reason))
    }
}

impl MetadataGateway for ExifTool {
    fn read_capture_timestamp(&self, path: &Utf8Path) -> Result<DateTime<Utc>, GatewayError> {
        let tags = self.read_tags(path)?;
        self.capture_timestamp(path, &tags)
    }

    fn has_gps_tags(&self, path: &Utf8Path) -> Result<bool, GatewayError> {
        Ok(self.read_tags(path)?.has_gps())
    }

    fn read_gps(&self, path: &Utf8Path) -> Result<Option<(f64, f64)>, GatewayError> {
        Ok(self.read_tags(path)?.gps())
    }

    fn write_gps(
        &self,
        path: &Utf8Path,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), GatewayError> {
        if !is_jpeg(path) {
            return Err(GatewayError::write(path, "only JPEG files are supported"));
        }
        if !is_valid_coordinate(latitude, longitude) {
            return Err(GatewayError::write(
                path,
                format!("coordinates out of range: {latitude}, {longitude}"),
            ));
        }

        let output = Command::new(&self.program)
            .args(gps_write_args(latitude, longitude))
            .arg(path.as_std_path())
            .output()
            .map_err(|e| GatewayError::write(path, format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GatewayError::write(path, stderr.trim().to_string()));
        }

        debug!(
            file = %path,
            output = %String::from_utf8_lossy(&output.stdout).trim(),
            "exiftool write"
        );
        Ok(())
    }

    // One exiftool run instead of two.
    fn read_image(&self, path: &Utf8Path) -> Result<ImageRecord, GatewayError> {
        let tags = self.read_tags(path)?;
        Ok(ImageRecord {
            path: path.to_path_buf(),
            capture_timestamp: self.capture_timestamp(path, &tags)?,
            has_existing_gps: tags.has_gps(),
        })
    }
}
