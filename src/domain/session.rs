//! Session calendar.
//!
//! Maps a trading date plus a session name to a half-open `[start, end)`
//! interval in the reference UTC offset. Windows are minute offsets from local
//! midnight and never extend past 24:00; a session that straddles midnight is
//! configured as two adjacent named sessions.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use std::collections::BTreeMap;

use super::error::EvalError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Reference offset of the prediction corpus (JST).
pub const DEFAULT_OFFSET_SECONDS: i32 = 9 * 3600;

pub fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix())
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl Interval {
    pub fn contains(&self, time: DateTime<FixedOffset>) -> bool {
        self.start <= time && time < self.end
    }
}

/// A session window expressed in minutes after local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl SessionWindow {
    pub fn new(start_minute: u32, end_minute: u32) -> Result<Self, String> {
        if end_minute > MINUTES_PER_DAY {
            return Err("session must end at or before 24:00".to_string());
        }
        if start_minute >= end_minute {
            return Err("session start must be before its end".to_string());
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }

    /// Parses `HH:MM-HH:MM`; `24:00` is accepted as an end time.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| format!("expected HH:MM-HH:MM, got {spec:?}"))?;
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }
}

fn parse_clock(value: &str) -> Result<u32, String> {
    let value = value.trim();
    let (h, m) = value
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got {value:?}"))?;
    let hours: u32 = h.parse().map_err(|_| format!("invalid hour in {value:?}"))?;
    let minutes: u32 = m.parse().map_err(|_| format!("invalid minute in {value:?}"))?;
    if minutes >= 60 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(format!("clock time out of range: {value:?}"));
    }
    Ok(hours * 60 + minutes)
}

/// Parses a UTC offset such as `+09:00`, `-05:00` or `Z`.
pub fn parse_offset(value: &str) -> Result<FixedOffset, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }
    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => return Err(format!("offset must start with + or -, got {value:?}")),
    };
    let minutes = parse_clock(rest)?;
    FixedOffset::east_opt(sign * (minutes as i32) * 60)
        .ok_or_else(|| format!("offset out of range: {value:?}"))
}

#[derive(Debug, Clone)]
pub struct SessionCalendar {
    offset: FixedOffset,
    sessions: BTreeMap<String, SessionWindow>,
}

impl Default for SessionCalendar {
    /// Tokyo, London and New York (split at midnight) in JST.
    fn default() -> Self {
        let mut calendar = SessionCalendar::new(default_offset());
        for (name, start, end) in [
            ("TOKYO", 9 * 60, 15 * 60),
            ("LONDON", 16 * 60, 21 * 60),
            ("NEW_YORK", 22 * 60, 24 * 60),
            ("NEW_YORK_LATE", 0, 6 * 60),
        ] {
            calendar.sessions.insert(
                name.to_string(),
                SessionWindow {
                    start_minute: start,
                    end_minute: end,
                },
            );
        }
        calendar
    }
}

impl SessionCalendar {
    /// An empty calendar in the given offset.
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            sessions: BTreeMap::new(),
        }
    }

    pub fn with_session(mut self, name: &str, window: SessionWindow) -> Self {
        self.sessions.insert(name.trim().to_uppercase(), window);
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(&name.trim().to_uppercase())
    }

    /// The `[start, end)` interval of `name` on `date`.
    pub fn interval(&self, date: NaiveDate, name: &str) -> Result<Interval, EvalError> {
        let window = self
            .sessions
            .get(&name.trim().to_uppercase())
            .ok_or_else(|| EvalError::UnknownSession {
                name: name.to_string(),
            })?;
        Ok(Interval {
            start: self.at_minute(date, window.start_minute),
            end: self.at_minute(date, window.end_minute),
        })
    }

    /// Local midnight of `date` in the reference offset.
    pub fn day_start(&self, date: NaiveDate) -> DateTime<FixedOffset> {
        self.at_minute(date, 0)
    }

    /// Calendar date of `time` in the reference offset.
    pub fn local_date(&self, time: DateTime<FixedOffset>) -> NaiveDate {
        time.with_timezone(&self.offset).date_naive()
    }

    fn at_minute(&self, date: NaiveDate, minute: u32) -> DateTime<FixedOffset> {
        let local = date.and_time(NaiveTime::default()) + Duration::minutes(minute as i64);
        let utc = local - Duration::seconds(self.offset.local_minus_utc() as i64);
        DateTime::from_naive_utc_and_offset(utc, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn default_tokyo_window_in_jst() {
        let calendar = SessionCalendar::default();
        let interval = calendar.interval(date(2025, 11, 27), "TOKYO").unwrap();
        assert_eq!(interval.start.to_rfc3339(), "2025-11-27T09:00:00+09:00");
        assert_eq!(interval.end.to_rfc3339(), "2025-11-27T15:00:00+09:00");
    }

    #[test]
    fn session_names_are_case_insensitive() {
        let calendar = SessionCalendar::default();
        let upper = calendar.interval(date(2025, 11, 27), "LONDON").unwrap();
        let lower = calendar.interval(date(2025, 11, 27), " london ").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn new_york_ends_at_midnight_without_rollover() {
        let calendar = SessionCalendar::default();
        let interval = calendar.interval(date(2025, 11, 27), "NEW_YORK").unwrap();
        assert_eq!(interval.end.to_rfc3339(), "2025-11-28T00:00:00+09:00");
        let late = calendar.interval(date(2025, 11, 27), "NEW_YORK_LATE").unwrap();
        assert_eq!(late.start.to_rfc3339(), "2025-11-27T00:00:00+09:00");
    }

    #[test]
    fn unknown_session_is_config_error() {
        let calendar = SessionCalendar::default();
        let err = calendar.interval(date(2025, 11, 27), "SYDNEY").unwrap_err();
        assert!(matches!(err, EvalError::UnknownSession { name } if name == "SYDNEY"));
    }

    #[test]
    fn interval_contains_is_half_open() {
        let calendar = SessionCalendar::default();
        let interval = calendar.interval(date(2025, 11, 27), "TOKYO").unwrap();
        assert!(interval.contains(interval.start));
        assert!(!interval.contains(interval.end));
    }

    #[test]
    fn custom_offset_calendar() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let calendar = SessionCalendar::new(utc)
            .with_session("london", SessionWindow::parse("07:00-16:00").unwrap());
        let interval = calendar.interval(date(2025, 3, 3), "LONDON").unwrap();
        assert_eq!(interval.start.to_rfc3339(), "2025-03-03T07:00:00+00:00");
        assert!(!calendar.contains("TOKYO"));
    }

    #[test]
    fn window_parse_rejects_wrapping_and_garbage() {
        assert!(SessionWindow::parse("22:00-06:00").is_err());
        assert!(SessionWindow::parse("09:00").is_err());
        assert!(SessionWindow::parse("09:60-10:00").is_err());
        assert!(SessionWindow::parse("24:30-24:45").is_err());
        assert_eq!(
            SessionWindow::parse("21:00-24:00").unwrap(),
            SessionWindow {
                start_minute: 21 * 60,
                end_minute: 24 * 60
            }
        );
    }

    #[test]
    fn parse_offset_variants() {
        assert_eq!(parse_offset("+09:00").unwrap().local_minus_utc(), 9 * 3600);
        assert_eq!(parse_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_offset("09:00").is_err());
    }

    #[test]
    fn local_date_uses_reference_offset() {
        let calendar = SessionCalendar::default();
        let t = DateTime::parse_from_rfc3339("2025-11-27T20:00:00+00:00").unwrap();
        assert_eq!(calendar.local_date(t), date(2025, 11, 28));
    }
}
