use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use tracing::debug;

/// Timestamp layout written by the navigation conversion program,
/// e.g. `2020/10/17 03:15:24.420`.
pub const NAVIGATION_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.f";

/// Layout of [`Session::session_name`](crate::models::Session::session_name).
pub const SESSION_NAME_FORMAT: &str = "%Y%m%d-%H%M%S%.3f";

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses the timestamp spellings found in navigation artifacts, sensor
/// headers and previously exported inventories. All instants are UTC.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Parse a navigation-artifact timestamp (`YYYY/MM/DD HH:MM:SS.fff`).
    pub fn parse_navigation(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        NaiveDateTime::parse_from_str(s, NAVIGATION_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y/%m/%d %H:%M:%S"))
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Parse any supported timestamp string into a UTC [`DateTime`].
    ///
    /// Accepts RFC 3339 (with `Z` or an offset), the report layout
    /// `DD Mon YYYY HH:MM:SS.fff`, and ISO / slash / day-first naive forms with
    /// optional fractional seconds. Returns `None` for empty or unrecognised
    /// input.
    pub fn parse_str(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        // Replace trailing 'Z' with '+00:00' for RFC 3339 compatibility.
        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        const FORMATS: &[&str] = &[
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y/%m/%d %H:%M:%S%.f",
            "%d/%m/%Y %H:%M:%S%.f",
            "%d %b %Y %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y/%m/%d %H:%M:%S",
            "%d/%m/%Y %H:%M:%S",
        ];

        for fmt in FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        debug!("TimestampProcessor: could not parse timestamp \"{}\"", s);
        None
    }

    /// Combine a `YYYYMMDD` integer date and milliseconds since midnight.
    pub fn from_date_and_millis(date: u32, millis: u32) -> Option<DateTime<Utc>> {
        let day = NaiveDate::from_ymd_opt(
            (date / 10_000) as i32,
            (date / 100) % 100,
            date % 100,
        )?;
        let naive = day.and_hms_opt(0, 0, 0)? + TimeDelta::milliseconds(i64::from(millis));
        Some(Utc.from_utc_datetime(&naive))
    }

    /// Build an instant from a calendar date plus time of day with hundredths.
    pub fn from_calendar(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        hundredths: u32,
    ) -> Option<DateTime<Utc>> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_milli_opt(hour, minute, second, hundredths * 10)?;
        Some(Utc.from_utc_datetime(&naive))
    }

    /// Build an instant from a year and 1-based day of year.
    pub fn from_ordinal(
        year: i32,
        day_of_year: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Option<DateTime<Utc>> {
        let naive = NaiveDate::from_yo_opt(year, day_of_year)?.and_hms_opt(hour, minute, second)?;
        Some(Utc.from_utc_datetime(&naive))
    }
}

/// Compact, fixed-precision session key derived from a session start.
pub fn session_name(start: DateTime<Utc>) -> String {
    start.format(SESSION_NAME_FORMAT).to_string()
}

/// Signed difference `a - b` in seconds, with millisecond resolution.
pub fn seconds_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (a - b).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    // ── parse_navigation ──────────────────────────────────────────────────────

    #[test]
    fn test_parse_navigation_with_millis() {
        let dt = TimestampProcessor::parse_navigation("2020/10/17 03:15:24.420").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2020, 10, 17, 3, 15, 24).unwrap() + TimeDelta::milliseconds(420));
    }

    #[test]
    fn test_parse_navigation_without_fraction() {
        let dt = TimestampProcessor::parse_navigation(" 2020/10/17 03:15:24 ").unwrap();
        assert_eq!(dt.second(), 24);
    }

    #[test]
    fn test_parse_navigation_rejects_garbage() {
        assert!(TimestampProcessor::parse_navigation("Time").is_none());
        assert!(TimestampProcessor::parse_navigation("").is_none());
    }

    // ── parse_str ─────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_str_rfc3339_z() {
        let dt = TimestampProcessor::parse_str("2020-05-22T17:26:47.000000Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2020, 5, 22, 17, 26, 47).unwrap());
    }

    #[test]
    fn test_parse_str_iso_space() {
        let dt = TimestampProcessor::parse_str("2020-05-22 17:26:47.5").unwrap();
        assert_eq!(dt.nanosecond(), 500_000_000);
    }

    #[test]
    fn test_parse_str_report_layout() {
        let dt = TimestampProcessor::parse_str("22 May 2020 17:26:47.000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2020, 5, 22, 17, 26, 47).unwrap());
    }

    #[test]
    fn test_parse_str_day_first() {
        let dt = TimestampProcessor::parse_str("22/05/2020 17:26:47").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2020, 5, 22, 17, 26, 47).unwrap());
    }

    #[test]
    fn test_parse_str_empty_is_none() {
        assert!(TimestampProcessor::parse_str("   ").is_none());
        assert!(TimestampProcessor::parse_str("NaT").is_none());
    }

    // ── builders ──────────────────────────────────────────────────────────────

    #[test]
    fn test_from_date_and_millis() {
        let dt = TimestampProcessor::from_date_and_millis(20201017, 11_724_420).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2020, 10, 17, 3, 15, 24).unwrap() + TimeDelta::milliseconds(420));
    }

    #[test]
    fn test_from_date_and_millis_invalid_date() {
        assert!(TimestampProcessor::from_date_and_millis(20201317, 0).is_none());
    }

    #[test]
    fn test_from_calendar_hundredths() {
        let dt = TimestampProcessor::from_calendar(2020, 10, 17, 3, 15, 24, 42).unwrap();
        assert_eq!(dt.nanosecond(), 420_000_000);
    }

    #[test]
    fn test_from_ordinal() {
        let dt = TimestampProcessor::from_ordinal(2020, 143, 17, 26, 47).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2020, 5, 22, 17, 26, 47).unwrap());
        assert!(TimestampProcessor::from_ordinal(2021, 366, 0, 0, 0).is_none());
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    #[test]
    fn test_session_name_is_compact_and_fixed_precision() {
        let dt = Utc.with_ymd_and_hms(2020, 10, 17, 3, 15, 24).unwrap();
        assert_eq!(session_name(dt), "20201017-031524.000");
    }

    #[test]
    fn test_seconds_between_is_signed() {
        let a = Utc.with_ymd_and_hms(2020, 10, 17, 10, 0, 0).unwrap();
        let b = a + TimeDelta::milliseconds(2500);
        assert_eq!(seconds_between(a, b), -2.5);
        assert_eq!(seconds_between(b, a), 2.5);
    }
}
