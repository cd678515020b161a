use crate::error::CoreError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ISO_FORMAT: &str = "%Y-%m-%d";

/// A calendar date in its normalized form.
///
/// Every store call and every cache key goes through this type, so two dates
/// compare equal exactly when their ISO-8601 strings do. It serializes as
/// `"YYYY-MM-DD"` and maps to a Postgres `DATE` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TradingDate(NaiveDate);

impl TradingDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parses a strict ISO-8601 calendar date. Anything else is rejected
    /// rather than coerced.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        // chrono accepts unpadded fields; the canonical form is always 10 chars.
        if trimmed.len() != 10 {
            return Err(CoreError::UnsupportedDate(input.to_string()));
        }
        NaiveDate::parse_from_str(trimmed, ISO_FORMAT)
            .map(Self)
            .map_err(|_| CoreError::UnsupportedDate(input.to_string()))
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, CoreError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| CoreError::UnsupportedDate(format!("{year:04}-{month:02}-{day:02}")))
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    pub fn to_iso(&self) -> String {
        self.0.format(ISO_FORMAT).to_string()
    }
}

impl From<NaiveDate> for TradingDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl From<TradingDate> for NaiveDate {
    fn from(date: TradingDate) -> Self {
        date.0
    }
}

impl FromStr for TradingDate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for TradingDate {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for TradingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(ISO_FORMAT))
    }
}

/// An inclusive `[start, end]` range of trading dates.
///
/// No ordering check is made: a range whose start lies after its end simply
/// matches nothing, which is how an empty query is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: TradingDate,
    pub end: TradingDate,
}

impl DateRange {
    pub fn new(start: TradingDate, end: TradingDate) -> Self {
        Self { start, end }
    }

    /// A range covering a single day.
    pub fn single(date: TradingDate) -> Self {
        Self { start: date, end: date }
    }

    /// Normalizes raw request inputs. A missing end collapses the range to
    /// the start date.
    pub fn from_inputs(start: &str, end: Option<&str>) -> Result<Self, CoreError> {
        let start = TradingDate::parse(start)?;
        let end = match end {
            Some(raw) if !raw.trim().is_empty() => TradingDate::parse(raw)?,
            _ => start,
        };
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: TradingDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
