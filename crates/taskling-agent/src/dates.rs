use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use taskling_common::{Error, Result};

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^in\s+(\d+)\s+(minute|min|hour|hr|day|week)s?$").expect("valid regex")
});

static DAY_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(today|tonight|tomorrow)(?:\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?)?$")
        .expect("valid regex")
});

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(next\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)(?:\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?)?$",
    )
    .expect("valid regex")
});

static AT_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").expect("valid regex"));

const DEFAULT_MORNING: NaiveTime = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
const DEFAULT_EVENING: NaiveTime = NaiveTime::from_hms_opt(20, 0, 0).unwrap();

/// Parse a natural-language "when" phrase into an absolute UTC timestamp.
///
/// Handles ISO datetimes, "in N minutes/hours/days/weeks", "today/tonight/
/// tomorrow [at H[:MM] am/pm]", "[next] <weekday> [at ...]" and a bare
/// "at H[:MM] am/pm" (rolled to the next day if already past). Anything
/// else is a `Validation` error so the user gets told instead of getting
/// a silently guessed time.
pub fn parse_when(text: &str, reference: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("empty time expression".to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return local_to_utc(naive, tz);
        }
    }

    let local = reference.with_timezone(&tz);
    let today = local.date_naive();

    if let Some(caps) = RELATIVE_RE.captures(trimmed) {
        let amount: i64 = caps[1]
            .parse()
            .map_err(|_| Error::Validation(format!("bad amount in '{trimmed}'")))?;
        let duration = match caps[2].to_ascii_lowercase().as_str() {
            "minute" | "min" => chrono::Duration::minutes(amount),
            "hour" | "hr" => chrono::Duration::hours(amount),
            "day" => chrono::Duration::days(amount),
            "week" => chrono::Duration::weeks(amount),
            unit => return Err(Error::Validation(format!("unknown time unit '{unit}'"))),
        };
        return Ok(reference + duration);
    }

    if let Some(caps) = DAY_WORD_RE.captures(trimmed) {
        let word = caps[1].to_ascii_lowercase();
        let default_time = if word == "tonight" {
            DEFAULT_EVENING
        } else {
            DEFAULT_MORNING
        };
        let time = parse_clock(&caps, 2, default_time)?;
        let date = if word == "tomorrow" {
            today.succ_opt()
                .ok_or_else(|| Error::Validation("date out of range".to_string()))?
        } else {
            today
        };
        return local_to_utc(date.and_time(time), tz);
    }

    if let Some(caps) = WEEKDAY_RE.captures(trimmed) {
        let explicit_next = caps.get(1).is_some();
        let weekday: Weekday = caps[2]
            .parse()
            .map_err(|_| Error::Validation(format!("unknown weekday in '{trimmed}'")))?;
        let time = parse_clock(&caps, 3, DEFAULT_MORNING)?;

        let mut offset = days_until(today.weekday(), weekday);
        if explicit_next && offset == 0 {
            offset = 7;
        }
        // A bare weekday means the next occurrence; if that is today and
        // the time already passed, roll a week forward.
        if !explicit_next && offset == 0 && time <= local.time() {
            offset = 7;
        }
        let date = add_days(today, offset)?;
        return local_to_utc(date.and_time(time), tz);
    }

    if let Some(caps) = AT_TIME_RE.captures(trimmed) {
        let time = parse_clock(&caps, 1, DEFAULT_MORNING)?;
        let date = if time <= local.time() {
            add_days(today, 1)?
        } else {
            today
        };
        return local_to_utc(date.and_time(time), tz);
    }

    Err(Error::Validation(format!(
        "could not understand when '{trimmed}' is"
    )))
}

/// Read hour/minute/am-pm capture groups starting at `base`; absent hour
/// means the caller's default applies.
fn parse_clock(caps: &regex::Captures<'_>, base: usize, default: NaiveTime) -> Result<NaiveTime> {
    let Some(hour_match) = caps.get(base) else {
        return Ok(default);
    };
    let mut hour: u32 = hour_match
        .as_str()
        .parse()
        .map_err(|_| Error::Validation("bad hour".to_string()))?;
    let minute: u32 = match caps.get(base + 1) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| Error::Validation("bad minute".to_string()))?,
        None => 0,
    };

    match caps.get(base + 2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(meridiem) => {
            if !(1..=12).contains(&hour) {
                return Err(Error::Validation(format!("hour {hour} is not on the clock")));
            }
            if hour == 12 {
                hour = 0;
            }
            if meridiem == "pm" {
                hour += 12;
            }
        }
        None => {
            if hour > 23 {
                return Err(Error::Validation(format!("hour {hour} is not on the clock")));
            }
        }
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| Error::Validation(format!("invalid time {hour}:{minute:02}")))
}

fn days_until(from: Weekday, to: Weekday) -> u64 {
    ((to.num_days_from_monday() + 7 - from.num_days_from_monday()) % 7) as u64
}

fn add_days(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_add_days(chrono::Days::new(days))
        .ok_or_else(|| Error::Validation("date out of range".to_string()))
}

fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Validation(format!("'{naive}' does not exist in timezone {tz}")))
}

#[cfg(test)]
mod tests {
    use super::parse_when;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    // Monday, 2024-01-01, noon UTC.
    fn reference() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn parse(text: &str) -> chrono::DateTime<Utc> {
        parse_when(text, reference(), Tz::UTC).expect("parses")
    }

    #[test]
    fn iso_datetime() {
        assert_eq!(
            parse("2024-02-03T10:30:00"),
            Utc.with_ymd_and_hms(2024, 2, 3, 10, 30, 0).unwrap()
        );
        assert_eq!(
            parse("2024-02-03 10:30"),
            Utc.with_ymd_and_hms(2024, 2, 3, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn relative_offsets() {
        assert_eq!(
            parse("in 30 minutes"),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap()
        );
        assert_eq!(
            parse("in 2 hours"),
            Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap()
        );
        assert_eq!(
            parse("in 1 week"),
            Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn tomorrow_defaults_to_morning() {
        assert_eq!(
            parse("tomorrow"),
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );
        assert_eq!(
            parse("tomorrow at 5pm"),
            Utc.with_ymd_and_hms(2024, 1, 2, 17, 0, 0).unwrap()
        );
        assert_eq!(
            parse("tomorrow at 8:15 am"),
            Utc.with_ymd_and_hms(2024, 1, 2, 8, 15, 0).unwrap()
        );
    }

    #[test]
    fn tonight_defaults_to_evening() {
        assert_eq!(
            parse("tonight"),
            Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_weekday() {
        // Reference is a Monday.
        assert_eq!(
            parse("next friday"),
            Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap()
        );
        assert_eq!(
            parse("next monday"),
            Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn bare_weekday_prefers_the_future() {
        assert_eq!(
            parse("friday at 5pm"),
            Utc.with_ymd_and_hms(2024, 1, 5, 17, 0, 0).unwrap()
        );
        // Monday 9am already passed at the noon reference, so next week.
        assert_eq!(
            parse("monday"),
            Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn bare_time_rolls_forward_when_past() {
        assert_eq!(
            parse("at 5pm"),
            Utc.with_ymd_and_hms(2024, 1, 1, 17, 0, 0).unwrap()
        );
        assert_eq!(
            parse("at 9am"),
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn timezone_is_applied() {
        let when = parse_when("tomorrow at 9am", reference(), Tz::America__New_York)
            .expect("parses");
        // 9am Eastern is 14:00 UTC in January.
        assert_eq!(when, Utc.with_ymd_and_hms(2024, 1, 2, 14, 0, 0).unwrap());
    }

    #[test]
    fn nonsense_is_a_validation_error() {
        let err = parse_when("whenever", reference(), Tz::UTC).unwrap_err();
        assert!(matches!(err, taskling_common::Error::Validation(_)));

        let err = parse_when("tomorrow at 25pm", reference(), Tz::UTC).unwrap_err();
        assert!(matches!(err, taskling_common::Error::Validation(_)));
    }
}
