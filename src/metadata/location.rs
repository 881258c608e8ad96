use regex::Regex;

lazy_static::lazy_static! {
    static ref GEO_URI: Regex =
        Regex::new(r"^geo:\s*([-+]?\d+(?:\.\d+)?)\s*,\s*([-+]?\d+(?:\.\d+)?)$").unwrap();
}

/// Parses a `geo:<lat>,<lon>` string into signed decimal degrees.
///
/// Returns `None` when the string does not follow the convention or when the
/// coordinates fall outside the valid latitude/longitude ranges.
pub fn parse_geo_string(geo: &str) -> Option<(f64, f64)> {
    let caps = GEO_URI.captures(geo.trim())?;
    let latitude: f64 = caps[1].parse().ok()?;
    let longitude: f64 = caps[2].parse().ok()?;

    if is_valid_coordinate(latitude, longitude) {
        Some((latitude, longitude))
    } else {
        None
    }
}

pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// EXIF `GPSLatitudeRef` value for a signed latitude.
pub fn latitude_ref(latitude: f64) -> char {
    if latitude < 0.0 { 'S' } else { 'N' }
}

/// EXIF `GPSLongitudeRef` value for a signed longitude.
pub fn longitude_ref(longitude: f64) -> char {
    if longitude < 0.0 { 'W' } else { 'E' }
}
