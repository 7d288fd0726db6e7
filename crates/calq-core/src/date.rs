//! Civil calendar dates and inclusive date ranges.
//!
//! The model is timezone-naive: a [`CalendarDate`] is a day on the proleptic
//! Gregorian calendar with no time-of-day and no offset. Weekdays are derived
//! with a closed-form calendrical formula so results never depend on the host
//! clock or locale.

use crate::error::QueryError;
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A date-only value, canonically rendered as `YYYY-MM-DD`.
///
/// Ordering is chronological, which for four-digit years coincides with the
/// lexicographic order of the canonical string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(CalendarDate)
    }

    /// Parses any accepted input form, see [`normalize_date_only_string`].
    pub fn parse(input: &str) -> Option<Self> {
        normalize_date_only_string(input)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn weekday(&self) -> WeekdayCode {
        WeekdayCode::from_sunday_index(day_of_week(self.year(), self.month(), self.day()))
    }

    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(CalendarDate)
    }

    pub fn pred(&self) -> Option<Self> {
        self.0.pred_opt().map(CalendarDate)
    }

    pub fn add_days(&self, days: i64) -> Option<Self> {
        Duration::try_days(days)
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(CalendarDate)
    }

    /// Signed number of days from `self` to `other`.
    pub fn days_until(&self, other: CalendarDate) -> i64 {
        (other.0 - self.0).num_days()
    }

    pub fn first_of_month(&self) -> Self {
        CalendarDate(self.0.with_day(1).unwrap_or(self.0))
    }

    pub fn last_of_month(&self) -> Self {
        self.first_of_month()
            .add_months(1)
            .and_then(|next| next.pred())
            .unwrap_or(*self)
    }

    /// Shifts by whole months, clamping the day to the target month's length.
    pub fn add_months(&self, months: i32) -> Option<Self> {
        let shifted = if months >= 0 {
            self.0.checked_add_months(Months::new(months.unsigned_abs()))
        } else {
            self.0.checked_sub_months(Months::new(months.unsigned_abs()))
        };
        shifted.map(CalendarDate)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(date: NaiveDate) -> Self {
        CalendarDate(date)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

impl FromStr for CalendarDate {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_date_only_string(s).ok_or_else(|| QueryError::InvalidDate(s.to_string()))
    }
}

impl Serialize for CalendarDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Normalizes a date-only string.
///
/// Accepted forms:
/// - `YYYY-MM-DD`, optionally followed by a `T`/space time part (ISO stamps)
/// - compact `YYYYMMDD`
/// - compact UTC stamps `YYYYMMDDTHHMMSS` with optional trailing `Z`
///
/// The date part of a stamp is taken literally; no offset is applied.
/// Anything else, including impossible calendar dates, yields `None`.
pub fn normalize_date_only_string(input: &str) -> Option<CalendarDate> {
    let s = input.trim();
    let bytes = s.as_bytes();

    if bytes.len() >= 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        let rest = &bytes[10..];
        if !rest.is_empty() && !matches!(rest[0], b'T' | b't' | b' ') {
            return None;
        }
        let year = digits(&bytes[0..4])?;
        let month = digits(&bytes[5..7])?;
        let day = digits(&bytes[8..10])?;
        return CalendarDate::from_ymd(year as i32, month, day);
    }

    if bytes.len() >= 8 {
        let year = digits(&bytes[0..4])?;
        let month = digits(&bytes[4..6])?;
        let day = digits(&bytes[6..8])?;
        let rest = &bytes[8..];
        let stamp_ok = rest.is_empty() || is_compact_utc_time(rest);
        if !stamp_ok {
            return None;
        }
        return CalendarDate::from_ymd(year as i32, month, day);
    }

    None
}

/// Matches `THHMMSS` with an optional trailing `Z`.
fn is_compact_time_part(rest: &[u8]) -> bool {
    rest.len() == 6 && rest.iter().all(u8::is_ascii_digit)
}

fn is_compact_utc_time(rest: &[u8]) -> bool {
    match rest.split_first() {
        Some((b'T' | b't', time)) => {
            let time = time.strip_suffix(b"Z").or_else(|| time.strip_suffix(b"z")).unwrap_or(time);
            is_compact_time_part(time)
        }
        _ => false,
    }
}

fn digits(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    bytes
        .iter()
        .try_fold(0u32, |acc, b| acc.checked_mul(10)?.checked_add(u32::from(b - b'0')))
}

/// Day of week with Sunday = 0 (Sakamoto's method).
pub fn day_of_week(year: i32, month: u32, day: u32) -> u32 {
    const OFFSETS: [i32; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let y = if month < 3 { year - 1 } else { year };
    let idx = (month.clamp(1, 12) - 1) as usize;
    let w = y + y.div_euclid(4) - y.div_euclid(100) + y.div_euclid(400) + OFFSETS[idx] + day as i32;
    w.rem_euclid(7) as u32
}

/// Two-letter weekday codes as used by BYDAY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeekdayCode {
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
    Su,
}

impl WeekdayCode {
    pub(crate) fn from_sunday_index(idx: u32) -> Self {
        match idx % 7 {
            0 => WeekdayCode::Su,
            1 => WeekdayCode::Mo,
            2 => WeekdayCode::Tu,
            3 => WeekdayCode::We,
            4 => WeekdayCode::Th,
            5 => WeekdayCode::Fr,
            _ => WeekdayCode::Sa,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WeekdayCode::Mo => "MO",
            WeekdayCode::Tu => "TU",
            WeekdayCode::We => "WE",
            WeekdayCode::Th => "TH",
            WeekdayCode::Fr => "FR",
            WeekdayCode::Sa => "SA",
            WeekdayCode::Su => "SU",
        }
    }
}

impl fmt::Display for WeekdayCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for WeekdayCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MO" => Ok(WeekdayCode::Mo),
            "TU" => Ok(WeekdayCode::Tu),
            "WE" => Ok(WeekdayCode::We),
            "TH" => Ok(WeekdayCode::Th),
            "FR" => Ok(WeekdayCode::Fr),
            "SA" => Ok(WeekdayCode::Sa),
            "SU" => Ok(WeekdayCode::Su),
            _ => Err(s.to_string()),
        }
    }
}

/// Inclusive range of calendar dates; `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DateRange {
    start: CalendarDate,
    end: CalendarDate,
}

impl DateRange {
    pub fn new(start: CalendarDate, end: CalendarDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(date: CalendarDate) -> Self {
        Self { start: date, end: date }
    }

    /// Builds a range from raw strings, reporting which side is malformed.
    pub fn parse(start: &str, end: &str) -> Result<Self, QueryError> {
        let s: CalendarDate = start.parse()?;
        let e: CalendarDate = end.parse()?;
        Self::new(s, e).ok_or_else(|| QueryError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    pub fn start(&self) -> CalendarDate {
        self.start
    }

    pub fn end(&self) -> CalendarDate {
        self.end
    }

    pub fn contains_date(&self, date: CalendarDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn contains(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Overlapping or directly adjacent (`end + 1 == start`).
    pub fn touches(&self, other: &DateRange) -> bool {
        self.overlaps(other)
            || self.end.succ() == Some(other.start)
            || other.end.succ() == Some(self.start)
    }

    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        DateRange::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Smallest range containing both.
    pub fn hull(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Number of days in the range, both ends included.
    pub fn len_days(&self) -> i64 {
        self.start.days_until(self.end) + 1
    }

    pub fn days(&self) -> Days {
        Days {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Day-by-day iterator over a [`DateRange`].
#[derive(Debug, Clone)]
pub struct Days {
    next: Option<CalendarDate>,
    end: CalendarDate,
}

impl Iterator for Days {
    type Item = CalendarDate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|d| *d <= self.end)?;
        self.next = current.succ();
        Some(current)
    }
}
