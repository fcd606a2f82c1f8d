//! # Civil date and time types
//! This module contains the calendar types shared by the alarm store, the
//! time source and the scheduler: a day-of-week enum, a calendar date, a
//! wall-clock date-time and the `HH:MM` time-of-day used by alarms.
//!
//! Weekdays are numbered 0 = Monday through 6 = Sunday, which is also the
//! numbering used in the persisted `days` arrays.

use core::fmt::{self, Write};
use core::str::FromStr;

use heapless::String;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Seconds per civil day.
const SECS_PER_DAY: i64 = 86_400;

/// Error returned when a date or time string cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParseError;

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed date or time string")
    }
}

/// The day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Weekday {
    /// Monday, index 0
    Monday,
    /// Tuesday, index 1
    Tuesday,
    /// Wednesday, index 2
    Wednesday,
    /// Thursday, index 3
    Thursday,
    /// Friday, index 4
    Friday,
    /// Saturday, index 5
    Saturday,
    /// Sunday, index 6
    Sunday,
}

impl Weekday {
    /// Returns the numeric index of the weekday, 0 = Monday through 6 = Sunday.
    pub const fn index(self) -> u8 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }

    /// Returns the weekday for a numeric index, 0 = Monday through 6 = Sunday.
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Monday),
            1 => Some(Self::Tuesday),
            2 => Some(Self::Wednesday),
            3 => Some(Self::Thursday),
            4 => Some(Self::Friday),
            5 => Some(Self::Saturday),
            6 => Some(Self::Sunday),
            _ => None,
        }
    }

    /// Returns the day after this one.
    pub const fn next(self) -> Self {
        match self {
            Self::Monday => Self::Tuesday,
            Self::Tuesday => Self::Wednesday,
            Self::Wednesday => Self::Thursday,
            Self::Thursday => Self::Friday,
            Self::Friday => Self::Saturday,
            Self::Saturday => Self::Sunday,
            Self::Sunday => Self::Monday,
        }
    }
}

/// Check if a year is a leap year.
/// A year is a leap year if it is divisible by 4, but not by 100, unless it is also divisible by 400.
pub const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Get the number of days in a given month and year.
pub const fn days_in_month(month: u8, year: u16) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30, // all other months
    }
}

/// A calendar date, serialized as a `"YYYY-MM-DD"` string.
///
/// Date equality is what keeps a recurring alarm from firing twice on the
/// same day, so the type is deliberately plain and comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Date {
    /// Full year, e.g. 2025
    pub year: u16,
    /// Month 1-12
    pub month: u8,
    /// Day of month 1-31
    pub day: u8,
}

impl Date {
    /// Returns true when month and day describe a real calendar day.
    pub const fn is_valid(&self) -> bool {
        self.month >= 1
            && self.month <= 12
            && self.day >= 1
            && self.day <= days_in_month(self.month, self.year)
    }
}

impl FromStr for Date {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let year = parts.next().ok_or(ParseError)?;
        let month = parts.next().ok_or(ParseError)?;
        let day = parts.next().ok_or(ParseError)?;
        if parts.next().is_some() {
            return Err(ParseError);
        }
        let date = Self {
            year: year.parse().map_err(|_| ParseError)?,
            month: month.parse().map_err(|_| ParseError)?,
            day: day.parse().map_err(|_| ParseError)?,
        };
        if date.is_valid() { Ok(date) } else { Err(ParseError) }
    }
}

impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf: String<10> = String::new();
        write!(buf, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&buf)
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DateVisitor;

        impl Visitor<'_> for DateVisitor {
            type Value = Date;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a date string in YYYY-MM-DD format")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(DateVisitor)
    }
}

/// A wall-clock time of day, serialized as an `"HH:MM"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeOfDay {
    /// Hour 0-23
    pub hour: u8,
    /// Minute 0-59
    pub minute: u8,
}

impl TimeOfDay {
    /// Create a new time of day, rejecting out-of-range values.
    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour <= 23 && minute <= 59 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s.split_once(':').ok_or(ParseError)?;
        let hour: u8 = hour.parse().map_err(|_| ParseError)?;
        let minute: u8 = minute.parse().map_err(|_| ParseError)?;
        Self::new(hour, minute).ok_or(ParseError)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf: String<5> = String::new();
        write!(buf, "{:02}:{:02}", self.hour, self.minute).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&buf)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimeVisitor;

        impl Visitor<'_> for TimeVisitor {
            type Value = TimeOfDay;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a time string in HH:MM format")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(TimeVisitor)
    }
}

/// A full wall-clock date-time as read from the time source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DateTime {
    /// Full year
    pub year: u16,
    /// Month 1-12
    pub month: u8,
    /// Day of month 1-31
    pub day: u8,
    /// Day of the week
    pub weekday: Weekday,
    /// Hour 0-23
    pub hour: u8,
    /// Minute 0-59
    pub minute: u8,
    /// Second 0-59
    pub second: u8,
}

impl DateTime {
    /// Convert seconds since the unix epoch (already shifted into local
    /// time) into a civil date-time.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_local_secs(secs: i64) -> Self {
        let days = secs.div_euclid(SECS_PER_DAY);
        let second_of_day = secs.rem_euclid(SECS_PER_DAY);

        let (year, month, day) = civil_from_days(days);
        // 1970-01-01 was a Thursday, index 3 with Monday = 0.
        let weekday_index = (days + 3).rem_euclid(7);

        Self {
            year,
            month,
            day,
            weekday: Weekday::from_index(weekday_index as u8).unwrap_or(Weekday::Monday),
            hour: (second_of_day / 3600) as u8,
            minute: (second_of_day / 60 % 60) as u8,
            second: (second_of_day % 60) as u8,
        }
    }

    /// The calendar date portion of this date-time.
    pub const fn date(&self) -> Date {
        Date {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }

    /// The time-of-day portion of this date-time, truncated to the minute.
    pub const fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay {
            hour: self.hour,
            minute: self.minute,
        }
    }
}

/// Convert days since the unix epoch into a civil `(year, month, day)`.
///
/// Days-to-civil algorithm over 400-year eras; exact for the whole u16 year
/// range handled here.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn civil_from_days(days: i64) -> (u16, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };

    (year as u16, month as u8, day as u8)
}
