//! UTC instants, and parsing source timestamps under a configured IANA timezone.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// A timezone-aware point in time normalized to UTC at parse time.
pub type Instant = DateTime<Utc>;

/// Parse a naive "YYYY-MM-DD HH:MM:SS"-ish timestamp under `tz`, normalizing to UTC.
///
/// Accepts RFC 3339 directly (already unambiguous); otherwise falls back to a handful of
/// common aggregator export formats before giving up.
pub fn parse_instant(raw: &str, tz: Tz) -> Result<Instant, String> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d",
    ];

    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return resolve_local(naive, tz, raw);
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, fmt) {
            let naive = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
            return resolve_local(naive, tz, raw);
        }
    }

    Err(format!("cannot parse timestamp '{raw}' under timezone {tz}"))
}

fn resolve_local(naive: NaiveDateTime, tz: Tz, raw: &str) -> Result<Instant, String> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(first, _) => Ok(first.with_timezone(&Utc)),
        chrono::LocalResult::None => Err(format!(
            "timestamp '{raw}' does not exist in timezone {tz} (DST gap)"
        )),
    }
}

/// The calendar year of `instant` as observed in `Europe/Madrid` — the tax-year boundary used
/// throughout the FIFO engine and reporting, independent of the source row's own timezone.
pub fn tax_year_of(instant: Instant) -> i32 {
    use chrono::Datelike;
    let madrid = chrono_tz::Europe::Madrid;
    instant.with_timezone(&madrid).year()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Madrid;

    #[test]
    fn parses_rfc3339() {
        let i = parse_instant("2023-01-02T10:00:00Z", Madrid).unwrap();
        assert_eq!(i.to_rfc3339(), "2023-01-02T10:00:00+00:00");
    }

    #[test]
    fn parses_naive_under_local_timezone() {
        // Madrid is UTC+1 in January (no DST).
        let i = parse_instant("2023-01-02 10:00:00", Madrid).unwrap();
        assert_eq!(i.to_rfc3339(), "2023-01-02T09:00:00+00:00");
    }

    #[test]
    fn tax_year_follows_madrid_calendar() {
        // 2023-12-31T23:30:00Z is already 2024-01-01 in Madrid (CET, UTC+1).
        let i: Instant = "2023-12-31T23:30:00Z".parse().unwrap();
        assert_eq!(tax_year_of(i), 2024);
    }
}
