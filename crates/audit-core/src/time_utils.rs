use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use tracing::warn;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve a configured timezone name, where `"auto"` means the system zone.
///
/// Unrecognised names fall back to UTC with a warning.
pub fn resolve_timezone(tz_name: &str) -> Tz {
    let name = if tz_name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        tz_name.to_string()
    };
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("unrecognised timezone \"{}\", falling back to UTC", name);
        Tz::UTC
    })
}

/// Validate that `tz_name` is a recognised IANA timezone identifier.
pub fn validate_timezone(tz_name: &str) -> bool {
    tz_name.parse::<Tz>().is_ok()
}

// ── Calendar helpers ──────────────────────────────────────────────────────────

/// Calendar date of `ts` in the report timezone.
pub fn local_date(ts: DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// Monday through Friday.
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The last `n` weekday dates ending at `today` (inclusive when `today` is a
/// weekday), returned in chronological order.
pub fn last_working_days(today: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut cursor = Some(today);
    while days.len() < n {
        let Some(date) = cursor else { break };
        if is_weekday(date) {
            days.push(date);
        }
        cursor = date.checked_sub_days(Days::new(1));
    }
    days.reverse();
    days
}

/// All weekday dates in `[start, end]`, chronological. Empty when `start > end`.
pub fn weekdays_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| is_weekday(*d))
        .collect()
}

/// Local midnight at the start of `now`'s calendar month, as UTC.
///
/// When midnight on the 1st is skipped by a DST jump, the month starts at the
/// first local minute that exists.
pub fn month_start(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let Some(midnight) = NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return now;
    };
    (0..24 * 60)
        .filter_map(|m| midnight.checked_add_signed(Duration::minutes(m)))
        .find_map(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Report date key, `YYYY-MM-DD`.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Compact day/month key used by the working-day report, `DD/MM`.
pub fn short_day_key(date: NaiveDate) -> String {
    date.format("%d/%m").to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
