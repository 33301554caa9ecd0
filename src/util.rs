use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::time::{Duration, SystemTime};

const SECONDS_IN_DAY: f64 = 86_400.0;
const DAYS_IN_MONTH: f64 = 30.44;
const DAYS_IN_YEAR: f64 = 365.25;

/// Parse RFC3339, `YYYY-MM-DD` or "N days/weeks/months ago". Revisions are
/// resolved by the repository, not here.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    // RFC3339
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    // YYYY-MM-DD
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(datetime) = date.and_hms_opt(0, 0, 0) {
            return Some(Utc.from_utc_datetime(&datetime));
        }
    }

    // Relative duration (e.g., "2 weeks ago")
    let duration = parse_natural_duration(input)?;
    let target = SystemTime::now().checked_sub(duration)?;
    Some(DateTime::<Utc>::from(target))
}

fn parse_natural_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();
    let units: [(&str, u64); 6] = [
        (" days ago", 86400),
        (" day ago", 86400),
        (" weeks ago", 7 * 86400),
        (" week ago", 7 * 86400),
        (" months ago", 30 * 86400),
        (" month ago", 30 * 86400),
    ];

    units.iter().find_map(|(suffix, secs)| {
        input
            .strip_suffix(suffix)
            .and_then(|n| n.trim().parse::<u64>().ok())
            .and_then(|n| n.checked_mul(*secs))
            .map(Duration::from_secs)
    })
}

pub fn timestamp_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

/// `part / total * 100`, reported as 0 when the total is zero.
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Render a span of seconds as `Y:MM:DD` (years, months, days), or `MM:DD`
/// below one year.
pub fn format_age(seconds: i64) -> String {
    let days = seconds.max(0) as f64 / SECONDS_IN_DAY;
    let years = (days / DAYS_IN_YEAR).floor();
    let remaining = days - years * DAYS_IN_YEAR;
    let months = (remaining / DAYS_IN_MONTH).floor();
    let rest = (remaining - months * DAYS_IN_MONTH).round() as u64;
    let (years, months) = (years as u64, months as u64);

    if years > 0 {
        format!("{years}:{months:02}:{rest:02}")
    } else {
        format!("{months:02}:{rest:02}")
    }
}
