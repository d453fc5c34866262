//! Date and time helpers shared by the readers and writers.
use std::{fmt::Display, str::FromStr, sync::OnceLock};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::DateTimeError;

static CF_UNITS_REGEX: OnceLock<regex::Regex> = OnceLock::new();

/// Unit of a CF-convention time variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Ok(Self::Seconds),
            "min" | "mins" | "minute" | "minutes" => Ok(Self::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Ok(Self::Hours),
            "d" | "day" | "days" => Ok(Self::Days),
            _ => Err(DateTimeError::UnknownUnit(s.to_string())),
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        write!(f, "{s}")
    }
}

/// CF time units, e.g. "minutes since 2019-01-01 00:00:00".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfTimeUnits {
    pub unit: TimeUnit,
    pub reference: DateTime<Utc>,
}

impl CfTimeUnits {
    pub fn new(unit: TimeUnit, reference: DateTime<Utc>) -> Self {
        Self { unit, reference }
    }

    /// Convert a time value in these units to a datetime, rounded to the millisecond.
    pub fn decode(&self, value: f64) -> Result<DateTime<Utc>, DateTimeError> {
        let millis = value * self.unit.seconds() * 1000.0;
        if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
            return Err(DateTimeError::OutOfRange { value, units: self.to_string() });
        }
        self.reference
            .checked_add_signed(Duration::milliseconds(millis.round() as i64))
            .ok_or_else(|| DateTimeError::OutOfRange { value, units: self.to_string() })
    }

    pub fn encode(&self, time: DateTime<Utc>) -> f64 {
        let millis = (time - self.reference).num_milliseconds() as f64;
        millis / 1000.0 / self.unit.seconds()
    }
}

impl FromStr for CfTimeUnits {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = CF_UNITS_REGEX.get_or_init(|| {
            regex::Regex::new(
                r"^\s*(?<unit>\w+)\s+since\s+(?<date>\d{1,4}-\d{1,2}-\d{1,2})(?:[ T](?<time>\d{1,2}:\d{1,2}(?::\d{1,2}(?:\.\d+)?)?))?\s*(?<tz>Z|UTC|[+-]\d{1,2}(?::?\d{2})?)?\s*$",
            )
            .expect("Could not compile CF time units regex")
        });

        let caps = re
            .captures(s)
            .ok_or_else(|| DateTimeError::InvalidUnits(s.to_string()))?;
        let unit = TimeUnit::from_str(&caps["unit"])?;

        let date = NaiveDate::parse_from_str(&caps["date"], "%Y-%m-%d")
            .map_err(|_| DateTimeError::InvalidUnits(s.to_string()))?;
        let time = match caps.name("time") {
            Some(t) => parse_naive_time(t.as_str()).ok_or_else(|| DateTimeError::InvalidUnits(s.to_string()))?,
            None => NaiveTime::MIN,
        };
        let offset = match caps.name("tz").map(|m| m.as_str()) {
            None | Some("Z") | Some("UTC") => FixedOffset::east_opt(0),
            Some(tz) => parse_utc_offset(tz),
        }
        .ok_or_else(|| DateTimeError::InvalidUnits(s.to_string()))?;

        let reference = offset
            .from_local_datetime(&NaiveDateTime::new(date, time))
            .single()
            .ok_or_else(|| DateTimeError::InvalidUnits(s.to_string()))?
            .with_timezone(&Utc);
        Ok(Self { unit, reference })
    }
}

impl Display for CfTimeUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} since {}", self.unit, self.reference.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn parse_naive_time(s: &str) -> Option<NaiveTime> {
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .into_iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

fn parse_utc_offset(tz: &str) -> Option<FixedOffset> {
    let sign = if tz.starts_with('-') { -1 } else { 1 };
    let digits = tz[1..].replace(':', "");
    let (hours, minutes) = if digits.len() <= 2 {
        (digits.parse::<i32>().ok()?, 0)
    } else {
        let (h, m) = digits.split_at(digits.len() - 2);
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parse a datetime string as found in JSON inputs: RFC 3339 (e.g. "2019-01-01T12:00:00Z"),
/// or a naive "YYYY-MM-DD HH:MM:SS" / "YYYY-MM-DDTHH:MM:SS" taken as UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DateTimeError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .into_iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|ndt| ndt.and_utc())
        .ok_or_else(|| DateTimeError::InvalidDatetime(s.to_string()))
}
