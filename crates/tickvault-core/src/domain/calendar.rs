use std::fmt::{Display, Formatter};
use std::iter::FusedIterator;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Weekday};

use crate::ValidationError;

const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(input: &str) -> Result<Date, ValidationError> {
    Date::parse(input.trim(), ISO_DATE).map_err(|_| ValidationError::InvalidDate {
        value: input.to_owned(),
    })
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(ISO_DATE).unwrap_or_else(|_| date.to_string())
}

/// Current UTC calendar date.
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

pub const fn is_weekday(date: Date) -> bool {
    !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday)
}

/// Whether the last day of a [`DateRange`] is enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndBound {
    #[default]
    Exclusive,
    Inclusive,
}

/// Span of calendar days iterated as business days (Monday–Friday).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: Date,
    to: Date,
    end: EndBound,
}

impl DateRange {
    /// `[from, to)`.
    pub fn new(from: Date, to: Date) -> Result<Self, ValidationError> {
        Self::with_end(from, to, EndBound::Exclusive)
    }

    /// `[from, to]`.
    pub fn inclusive(from: Date, to: Date) -> Result<Self, ValidationError> {
        Self::with_end(from, to, EndBound::Inclusive)
    }

    pub fn with_end(from: Date, to: Date, end: EndBound) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvertedRange {
                from: format_date(from),
                to: format_date(to),
            });
        }
        Ok(Self { from, to, end })
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, ValidationError> {
        Self::new(parse_date(from)?, parse_date(to)?)
    }

    pub const fn from(&self) -> Date {
        self.from
    }

    pub const fn to(&self) -> Date {
        self.to
    }

    pub const fn end_bound(&self) -> EndBound {
        self.end
    }

    pub fn contains(&self, date: Date) -> bool {
        match self.end {
            EndBound::Exclusive => self.from <= date && date < self.to,
            EndBound::Inclusive => self.from <= date && date <= self.to,
        }
    }

    /// Business days of the range in ascending order.
    pub fn weekdays(&self) -> Weekdays {
        Weekdays {
            next: Some(self.from),
            range: *self,
        }
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let close = match self.end {
            EndBound::Exclusive => ')',
            EndBound::Inclusive => ']',
        };
        write!(
            f,
            "[{}, {}{close}",
            format_date(self.from),
            format_date(self.to)
        )
    }
}

impl IntoIterator for DateRange {
    type Item = Date;
    type IntoIter = Weekdays;

    fn into_iter(self) -> Self::IntoIter {
        self.weekdays()
    }
}

/// Iterator over the business days of a [`DateRange`].
#[derive(Debug, Clone)]
pub struct Weekdays {
    next: Option<Date>,
    range: DateRange,
}

impl Iterator for Weekdays {
    type Item = Date;

    fn next(&mut self) -> Option<Date> {
        while let Some(day) = self.next {
            if !self.range.contains(day) {
                self.next = None;
                return None;
            }
            self.next = day.next_day();
            if is_weekday(day) {
                return Some(day);
            }
        }
        None
    }
}

impl FusedIterator for Weekdays {}
