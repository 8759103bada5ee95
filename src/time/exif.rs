//! EXIF time extraction for images

use crate::error::{Error, Result};
use crate::time::DateSource;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use exif::{Field, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::trace;

/// EXIF tags to try for date extraction, in priority order
const DATE_TAGS: &[(Tag, DateSource)] = &[
    (Tag::DateTimeOriginal, DateSource::ExifDateTimeOriginal),   // When the original image was taken
    (Tag::DateTimeDigitized, DateSource::ExifDateTimeDigitized), // When the image was digitized
    (Tag::DateTime, DateSource::ExifDateTime),                   // File modification date/time
];

/// Extensions whose containers kamadak-exif can read
pub const EXIF_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tif", "tiff", "heic", "heif", "webp", "cr2", "nef", "arw", "dng", "raw",
];

/// Check whether an extension can carry embedded EXIF dates
pub fn supports_extension(ext: &str) -> bool {
    let ext_lower = ext.trim_start_matches('.').to_lowercase();
    EXIF_EXTENSIONS.contains(&ext_lower.as_str())
}

/// Extract creation time from EXIF metadata.
///
/// The first tag in [`DATE_TAGS`] order that parses wins; conflicting tags
/// are not reconciled.
pub fn extract_exif_time(path: &Path) -> Result<(NaiveDateTime, DateSource)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| Error::ExifRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    for (tag, source) in DATE_TAGS {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY)
            && let Some(datetime) = field_text(field).and_then(|s| parse_exif_datetime(&s))
        {
            trace!(?path, ?tag, "Found EXIF date");
            return Ok((datetime, *source));
        }
    }

    Err(Error::ExifRead {
        path: path.to_path_buf(),
        message: "No valid date tag found in EXIF data".to_string(),
    })
}

/// Raw ASCII value of a field, falling back to its display form
fn field_text(field: &Field) -> Option<String> {
    match field.value {
        Value::Ascii(ref parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        _ => Some(field.display_value().to_string()),
    }
}

/// Parse EXIF datetime string format: "YYYY:MM:DD HH:MM:SS"
pub(crate) fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    // EXIF format: "2024:01:15 14:30:00" or with quotes
    let s = s.trim().trim_matches('"').trim_end_matches('\0');
    if s.is_empty() {
        return None;
    }

    let formats = [
        "%Y:%m:%d %H:%M:%S",
        "%Y:%m:%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ];

    for format in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    // Date-only values
    for format in ["%Y:%m:%d", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}
