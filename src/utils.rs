use crate::{CaptureError, CoordinatesType, Region};
use std::time::Duration;
use url::Url;

/// Parses a page URL; local files are allowed alongside http(s)
pub fn validate_url(url: &str) -> Result<Url, CaptureError> {
    let parsed = Url::parse(url)
        .map_err(|e| CaptureError::InvalidArgument(format!("invalid URL {url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" | "file" => Ok(parsed),
        scheme => Err(CaptureError::InvalidArgument(format!(
            "unsupported URL scheme {scheme}"
        ))),
    }
}

/// Parses `x,y,width,height` into a region in page coordinates
pub fn parse_region(input: &str) -> Result<Region, String> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got {input:?}"));
    };

    let coordinate = |value: &str| value.parse::<i32>().map_err(|e| format!("{value:?}: {e}"));
    let extent = |value: &str| value.parse::<u32>().map_err(|e| format!("{value:?}: {e}"));
    let region = Region::new(coordinate(x)?, coordinate(y)?, extent(width)?, extent(height)?)
        .with_coordinates(CoordinatesType::ContextRelative);

    if region.is_size_empty() {
        return Err(format!("region {input:?} has no area"));
    }
    Ok(region)
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
