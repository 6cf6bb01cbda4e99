//! Presentation helpers for catalog listings.

use chrono::{DateTime, Utc};

/// Renders durations as `H:MM:SS` or `M:SS` for short clips.
pub fn format_duration(duration: i64) -> String {
    let duration = duration.max(0);
    let hours = duration / 3600;
    let minutes = (duration % 3600) / 60;
    let seconds = duration % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// "3 days ago" style rendering. Timestamps in the future count as now.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }
    const UNITS: [(i64, &str); 6] = [
        (365 * 24 * 3600, "year"),
        (30 * 24 * 3600, "month"),
        (7 * 24 * 3600, "week"),
        (24 * 3600, "day"),
        (3600, "hour"),
        (60, "minute"),
    ];
    let (size, unit) = UNITS
        .into_iter()
        .find(|(size, _)| seconds >= *size)
        .unwrap_or((60, "minute"));
    let count = seconds / size;
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} {unit}{plural} ago")
}

/// `1234567` → `1,234,567`.
pub fn format_views(views: i64) -> String {
    let digits = views.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if views < 0 {
        out.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn durations() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(format_duration(-5), "0:00");
    }

    #[test]
    fn relative_times() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now, now), "just now");
        assert_eq!(relative_time(now + Duration::hours(1), now), "just now");
        assert_eq!(relative_time(now - Duration::seconds(61), now), "1 minute ago");
        assert_eq!(relative_time(now - Duration::minutes(59), now), "59 minutes ago");
        assert_eq!(relative_time(now - Duration::hours(2), now), "2 hours ago");
        assert_eq!(relative_time(now - Duration::days(1), now), "1 day ago");
        assert_eq!(relative_time(now - Duration::days(14), now), "2 weeks ago");
        assert_eq!(relative_time(now - Duration::days(65), now), "2 months ago");
        assert_eq!(relative_time(now - Duration::days(800), now), "2 years ago");
    }

    #[test]
    fn view_counts() {
        assert_eq!(format_views(0), "0");
        assert_eq!(format_views(999), "999");
        assert_eq!(format_views(1000), "1,000");
        assert_eq!(format_views(1234567), "1,234,567");
        assert_eq!(format_views(-1200), "-1,200");
    }
}
