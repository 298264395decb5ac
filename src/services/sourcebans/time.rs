//! Timestamp formats seen across SourceBans installs.
//!
//! Every parser returns `Ok(None)` for the zero timestamp, which is what
//! the sites print for permanent bans.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::{AppError, Result};

static ORDINAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)(st|nd|rd|th)").ok());

/// Parses one raw date cell.
pub type TimeParser = fn(&str) -> Result<Option<DateTime<Utc>>>;

/// Values that stand for "no timestamp".
pub fn is_zero_marker(value: &str) -> bool {
    let v = value.trim();
    v.is_empty()
        || v.eq_ignore_ascii_case("not applicable.")
        || v.eq_ignore_ascii_case("never, this is permanent")
        || v.eq_ignore_ascii_case("permanent")
}

fn parse_with(value: &str, format: &str) -> Result<Option<DateTime<Utc>>> {
    if is_zero_marker(value) {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(value.trim(), format)
        .map(|t| Some(t.and_utc()))
        .map_err(|e| AppError::parse(format!("time '{}'", value.trim()), e))
}

/// `2023-05-17 03:07:00`
pub fn parse_default(value: &str) -> Result<Option<DateTime<Utc>>> {
    parse_with(value, "%Y-%m-%d %H:%M:%S")
}

/// `05-17-23 03:07`
pub fn parse_skial(value: &str) -> Result<Option<DateTime<Utc>>> {
    parse_with(value, "%m-%d-%y %H:%M")
}

/// `May 17th, 2023 (3:07)`
pub fn parse_wonderland(value: &str) -> Result<Option<DateTime<Utc>>> {
    if is_zero_marker(value) {
        return Ok(None);
    }
    let ordinal = ORDINAL
        .as_ref()
        .ok_or_else(|| AppError::parse("ordinal", "invalid pattern"))?;
    let cleaned = ordinal.replace_all(value.trim(), "$1").replace(',', "");
    parse_with(&cleaned, "%B %d %Y (%H:%M)")
}

/// `17-05-2023 03:07`
pub fn parse_trailing_year(value: &str) -> Result<Option<DateTime<Utc>>> {
    parse_with(value, "%d-%m-%Y %H:%M")
}

/// `17.05.2023 03:07`
pub fn parse_dotted(value: &str) -> Result<Option<DateTime<Utc>>> {
    parse_with(value, "%d.%m.%Y %H:%M")
}

/// `17-05-23 03:07`
pub fn parse_day_first_short(value: &str) -> Result<Option<DateTime<Utc>>> {
    parse_with(value, "%d-%m-%y %H:%M")
}

/// `Wednesday, 17 May 2023 (03:07)`
pub fn parse_verbose(value: &str) -> Result<Option<DateTime<Utc>>> {
    parse_with(value, "%A, %d %B %Y (%H:%M)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap())
    }

    #[test]
    fn skial_format() {
        assert_eq!(parse_skial("05-17-23 03:07").unwrap(), at(2023, 5, 17, 3, 7));
        assert_eq!(parse_skial("Permanent").unwrap(), None);
    }

    #[test]
    fn wonderland_format() {
        assert_eq!(
            parse_wonderland("May 17th, 2023 (3:07)").unwrap(),
            at(2023, 5, 17, 3, 7)
        );
        assert_eq!(
            parse_wonderland("June 1st, 2022 (14:30)").unwrap(),
            at(2022, 6, 1, 14, 30)
        );
        assert!(ORDINAL.is_some());
    }

    #[test]
    fn zero_markers() {
        for raw in ["", "  ", "Not applicable.", "never, this is permanent", "Permanent"] {
            assert_eq!(parse_default(raw).unwrap(), None, "{raw:?}");
        }
    }

    #[test]
    fn remaining_formats() {
        assert_eq!(
            parse_default("2023-05-17 03:07:00").unwrap(),
            at(2023, 5, 17, 3, 7)
        );
        assert_eq!(
            parse_trailing_year("17-05-2023 03:07").unwrap(),
            at(2023, 5, 17, 3, 7)
        );
        assert_eq!(parse_dotted("17.05.2023 03:07").unwrap(), at(2023, 5, 17, 3, 7));
        assert_eq!(
            parse_day_first_short("17-05-23 03:07").unwrap(),
            at(2023, 5, 17, 3, 7)
        );
        assert_eq!(
            parse_verbose("Wednesday, 17 May 2023 (03:07)").unwrap(),
            at(2023, 5, 17, 3, 7)
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_default("yesterday").is_err());
        assert!(matches!(
            parse_skial("2023/05/17"),
            Err(AppError::Parse { .. })
        ));
    }
}
