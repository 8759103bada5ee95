//! Destination planning
//!
//! A [`DateLayout`] turns a resolved timestamp into a relative directory
//! such as `2024/12/25`. [`plan_destination`] joins that directory onto the
//! target root together with the file's base name. Both are pure: no
//! filesystem access happens here, which keeps simulated and live runs on
//! identical paths.

use crate::config::ConfigError;
use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDateTime};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Named layouts accepted in place of a token pattern
const PRESETS: &[(&str, &str)] = &[
    ("year_month_day", "YYYY/MM/DD"),
    ("year_month", "YYYY/MM"),
    ("year_only", "YYYY"),
    ("year_dash_month_dash_day", "YYYY-MM-DD"),
    ("year_dash_month", "YYYY-MM"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Year,
    ShortYear,
    Month,
    Day,
    Literal(String),
}

/// Parsed date-format pattern (`YYYY/MM/DD`, `YYYY-MM`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateLayout {
    pattern: String,
    segments: Vec<Segment>,
}

impl DateLayout {
    /// Parse a token pattern or preset name.
    ///
    /// Recognized tokens are `YYYY`, `YY`, `MM` and `DD`; everything else is
    /// copied literally. Patterns without any token, absolute patterns and
    /// patterns containing `..` are rejected.
    pub fn parse(pattern: &str) -> std::result::Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDateFormat {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let expanded = PRESETS
            .iter()
            .find(|(name, _)| *name == pattern)
            .map(|(_, layout)| *layout)
            .unwrap_or(pattern);

        if expanded.trim().is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if expanded.starts_with('/') || expanded.starts_with('\\') {
            return Err(invalid("pattern must be relative"));
        }
        if expanded.contains("..") {
            return Err(invalid("pattern must not contain '..'"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = expanded;

        while !rest.is_empty() {
            let token = if rest.starts_with("YYYY") {
                Some((Segment::Year, 4))
            } else if rest.starts_with("YY") {
                Some((Segment::ShortYear, 2))
            } else if rest.starts_with("MM") {
                Some((Segment::Month, 2))
            } else if rest.starts_with("DD") {
                Some((Segment::Day, 2))
            } else {
                None
            };

            match token {
                Some((segment, len)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                    rest = &rest[len..];
                }
                None => {
                    let mut chars = rest.chars();
                    if let Some(c) = chars.next() {
                        literal.push(c);
                    }
                    rest = chars.as_str();
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.iter().any(|s| !matches!(s, Segment::Literal(_))) {
            return Err(invalid("pattern contains no date token (YYYY, YY, MM, DD)"));
        }

        Ok(Self {
            pattern: expanded.to_string(),
            segments,
        })
    }

    /// The expanded pattern string
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Render the relative directory for a timestamp
    pub fn format(&self, timestamp: &NaiveDateTime) -> String {
        let mut out = String::with_capacity(self.pattern.len() + 4);
        for segment in &self.segments {
            // Writing into a String cannot fail
            let _ = match segment {
                Segment::Year => write!(out, "{:04}", timestamp.year()),
                Segment::ShortYear => write!(out, "{:02}", timestamp.year().rem_euclid(100)),
                Segment::Month => write!(out, "{:02}", timestamp.month()),
                Segment::Day => write!(out, "{:02}", timestamp.day()),
                Segment::Literal(text) => {
                    out.push_str(text);
                    Ok(())
                }
            };
        }
        out
    }
}

/// Compute `target_root / layout(date) / basename(source)`
pub fn plan_destination(
    source: &Path,
    timestamp: &NaiveDateTime,
    target_root: &Path,
    layout: &DateLayout,
) -> Result<PathBuf> {
    let filename = source.file_name().ok_or_else(|| Error::InvalidFileName {
        path: source.to_path_buf(),
    })?;

    let mut dest = target_root.to_path_buf();
    for component in layout.format(timestamp).split('/').filter(|c| !c.is_empty()) {
        dest.push(component);
    }
    dest.push(filename);
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn christmas() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-12-25 10:15:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_format_tokens() {
        let ts = christmas();
        assert_eq!(DateLayout::parse("YYYY/MM/DD").unwrap().format(&ts), "2024/12/25");
        assert_eq!(DateLayout::parse("YYYY-MM").unwrap().format(&ts), "2024-12");
        assert_eq!(DateLayout::parse("YY_MM").unwrap().format(&ts), "24_12");
        assert_eq!(
            DateLayout::parse("photos YYYY/DD.MM").unwrap().format(&ts),
            "photos 2024/25.12"
        );
    }

    #[test]
    fn test_presets() {
        let layout = DateLayout::parse("year_month_day").unwrap();
        assert_eq!(layout.pattern(), "YYYY/MM/DD");
        assert_eq!(layout.format(&christmas()), "2024/12/25");

        let layout = DateLayout::parse("year_dash_month").unwrap();
        assert_eq!(layout.format(&christmas()), "2024-12");
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(DateLayout::parse("").is_err());
        assert!(DateLayout::parse("photos").is_err());
        assert!(DateLayout::parse("/YYYY").is_err());
        assert!(DateLayout::parse("../YYYY").is_err());
    }

    #[test]
    fn test_plan_destination() {
        let layout = DateLayout::parse("YYYY/MM/DD").unwrap();
        let dest = plan_destination(
            Path::new("/source/inbox/IMG_0001.JPG"),
            &christmas(),
            Path::new("/target"),
            &layout,
        )
        .unwrap();
        assert_eq!(dest, PathBuf::from("/target/2024/12/25/IMG_0001.JPG"));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let layout = DateLayout::parse("YYYY-MM-DD").unwrap();
        let source = Path::new("/a/b/clip.mpg");
        let first = plan_destination(source, &christmas(), Path::new("/t"), &layout).unwrap();
        let second = plan_destination(source, &christmas(), Path::new("/t"), &layout).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("/t/2024-12-25/clip.mpg"));
    }

    #[test]
    fn test_plan_requires_file_name() {
        let layout = DateLayout::parse("YYYY").unwrap();
        assert!(plan_destination(Path::new("/"), &christmas(), Path::new("/t"), &layout).is_err());
    }
}
