use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const MAX_DELAY_DAYS: i64 = 365;
pub const MAX_DELAY_MINUTES: i64 = MAX_DELAY_DAYS * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeParseError {
    InvalidFormat,
    OutOfRange,
    NotInFuture,
}

impl TimeParseError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::NotInFuture => "NOT_IN_FUTURE",
        }
    }
}

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for TimeParseError {}

pub fn parse_zone(name: &str) -> Option<Tz> {
    name.parse().ok()
}

/// `<digits><m|h|d>`, e.g. "10m", "2h", "1d".
pub fn is_relative_shape(token: &str) -> bool {
    let Some(unit) = token.chars().last() else {
        return false;
    };
    if !matches!(unit, 'm' | 'h' | 'd') {
        return false;
    }
    let digits = &token[..token.len() - unit.len_utf8()];
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Strict `YYYY-MM-DD` shape (exact widths, digits only).
pub fn is_date_shape(token: &str) -> bool {
    let b = token.as_bytes();
    b.len() == 10
        && b.iter()
            .enumerate()
            .all(|(i, c)| if matches!(i, 4 | 7) { *c == b'-' } else { c.is_ascii_digit() })
}

/// Strict `HH:mm` shape.
pub fn is_time_shape(token: &str) -> bool {
    let b = token.as_bytes();
    b.len() == 5
        && b.iter()
            .enumerate()
            .all(|(i, c)| if i == 2 { *c == b':' } else { c.is_ascii_digit() })
}

/// Relative expression `<integer>[mhd]` resolved against `now`.
///
/// The computed delay must land in `[1 minute, 365 days]`.
pub fn parse_relative(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeParseError> {
    if !is_relative_shape(expr) {
        return Err(TimeParseError::InvalidFormat);
    }
    let unit = expr.chars().last().ok_or(TimeParseError::InvalidFormat)?;
    let digits = &expr[..expr.len() - unit.len_utf8()];

    // A run of digits too long for i64 is a magnitude problem, not a grammar one.
    let value: i64 = digits.parse().map_err(|_| TimeParseError::OutOfRange)?;
    let per_unit = match unit {
        'm' => 1,
        'h' => 60,
        'd' => 60 * 24,
        _ => return Err(TimeParseError::InvalidFormat),
    };
    let minutes = value.checked_mul(per_unit).ok_or(TimeParseError::OutOfRange)?;

    if !(1..=MAX_DELAY_MINUTES).contains(&minutes) {
        return Err(TimeParseError::OutOfRange);
    }

    Ok(now + Duration::minutes(minutes))
}

/// Literal `YYYY-MM-DD HH:mm` interpreted in `tz`, converted to UTC.
///
/// The zone offset is derived for the requested wall-clock moment, not for
/// "now", so DST transitions between now and the target date resolve
/// correctly. Bounds are the same as for relative expressions, plus
/// `NotInFuture` when the instant is not ahead of `now`.
pub fn parse_absolute(
    date: &str,
    time: &str,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, TimeParseError> {
    if !is_date_shape(date) || !is_time_shape(time) {
        return Err(TimeParseError::InvalidFormat);
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| TimeParseError::InvalidFormat)?;
    let time =
        NaiveTime::parse_from_str(time, "%H:%M").map_err(|_| TimeParseError::InvalidFormat)?;

    let utc = local_to_utc(NaiveDateTime::new(date, time), tz);

    if utc <= now {
        return Err(TimeParseError::NotInFuture);
    }
    let delay = utc - now;
    if delay < Duration::minutes(1) || delay > Duration::minutes(MAX_DELAY_MINUTES) {
        return Err(TimeParseError::OutOfRange);
    }

    Ok(utc)
}

/// Resolve a naive wall-clock time in `tz` to the UTC instant it names.
///
/// Round-trip technique: treat the wall clock as if it were UTC, render that
/// instant back in `tz`, and the difference between the two readings is the
/// zone offset at that moment. Subtracting it yields the true UTC instant.
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    let assumed_utc = Utc.from_utc_datetime(&local);
    let shown_in_zone = assumed_utc.with_timezone(&tz).naive_local();
    let offset = shown_in_zone.signed_duration_since(local);
    assumed_utc - offset
}

/// Render a UTC instant as `YYYY-MM-DD HH:mm` (24-hour) in `tz`.
pub fn format_local(utc: DateTime<Utc>, tz: Tz) -> String {
    utc.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}
