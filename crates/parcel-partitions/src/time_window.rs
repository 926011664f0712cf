//! Time-window partition series.
//!
//! A [`TimeWindowPartitions`] is a start instant, an optional exclusive end,
//! and a [`Cadence`]. Window `i` starts at `start + i * cadence` and its key is
//! that start formatted with the series format string.
//!
//! Nothing here materialises the series: counting windows, formatting the
//! key at an index and locating a key are all constant-time arithmetic, so a
//! decade of hourly windows costs the same as a week of daily ones.
//!
//! # Enumeration rule
//!
//! A window is part of the series at `effective` iff its end is at or before
//! `effective` and, when an end date is configured, at or before that end.
//! Windows that are still open are never yielded.

use std::fmt;

use chrono::format::{Item, StrftimeItems};
use chrono::{
    DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key format used by hourly series.
pub const HOURLY_FORMAT: &str = "%Y-%m-%d-%H:%M";
/// Key format used by daily, weekly and monthly series.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

/// The spacing between consecutive windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// One window per hour.
    Hourly,
    /// One window per day.
    Daily,
    /// One window per seven days.
    Weekly,
    /// One window per calendar month.
    Monthly,
}

impl Cadence {
    /// The key format used when none is configured.
    #[must_use]
    pub const fn default_format(self) -> &'static str {
        match self {
            Self::Hourly => HOURLY_FORMAT,
            Self::Daily | Self::Weekly | Self::Monthly => DATE_FORMAT,
        }
    }

    /// Fixed window length in seconds, `None` for calendar months.
    const fn fixed_seconds(self) -> Option<i64> {
        match self {
            Self::Hourly => Some(SECONDS_PER_HOUR),
            Self::Daily => Some(SECONDS_PER_DAY),
            Self::Weekly => Some(SECONDS_PER_WEEK),
            Self::Monthly => None,
        }
    }

    /// Returns true if `instant` is a legal series start for this cadence.
    #[must_use]
    pub fn is_aligned(self, instant: DateTime<Utc>) -> bool {
        let on_hour = instant.minute() == 0 && instant.second() == 0 && instant.nanosecond() == 0;
        match self {
            Self::Hourly => on_hour,
            Self::Daily | Self::Weekly => on_hour && instant.hour() == 0,
            Self::Monthly => on_hour && instant.hour() == 0 && instant.day() == 1,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

/// A half-open `[start, end)` time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

/// A time-ordered series of partition windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindowPartitions {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    cadence: Cadence,
    fmt: String,
}

impl TimeWindowPartitions {
    /// Creates a series starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `start` is not aligned to a
    /// cadence boundary.
    pub fn new(start: DateTime<Utc>, cadence: Cadence) -> Result<Self> {
        if !cadence.is_aligned(start) {
            return Err(Error::configuration(format!(
                "start {start} is not aligned to a {cadence} boundary"
            )));
        }
        Ok(Self {
            start,
            end: None,
            cadence,
            fmt: cadence.default_format().to_string(),
        })
    }

    /// Hourly series starting at `start` (`YYYY-MM-DD` or `YYYY-MM-DD-HH:MM`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on an unparseable or unaligned start.
    pub fn hourly(start: &str) -> Result<Self> {
        Self::new(parse_instant(start)?, Cadence::Hourly)
    }

    /// Daily series starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on an unparseable or unaligned start.
    pub fn daily(start: &str) -> Result<Self> {
        Self::new(parse_instant(start)?, Cadence::Daily)
    }

    /// Weekly series starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on an unparseable or unaligned start.
    pub fn weekly(start: &str) -> Result<Self> {
        Self::new(parse_instant(start)?, Cadence::Weekly)
    }

    /// Monthly series starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on an unparseable or unaligned start.
    pub fn monthly(start: &str) -> Result<Self> {
        Self::new(parse_instant(start)?, Cadence::Monthly)
    }

    /// Sets an exclusive end for the series.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `end` precedes the start.
    pub fn with_end(mut self, end: DateTime<Utc>) -> Result<Self> {
        if end < self.start {
            return Err(Error::configuration(format!(
                "end {end} precedes start {}",
                self.start
            )));
        }
        self.end = Some(end);
        Ok(self)
    }

    /// Sets an exclusive end date, parsed like the start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on an unparseable end or one before
    /// the start.
    pub fn with_end_date(self, end: &str) -> Result<Self> {
        let end = parse_instant(end)?;
        self.with_end(end)
    }

    /// Replaces the key format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the format is malformed or does not
    /// round-trip the series start.
    pub fn with_format(mut self, fmt: impl Into<String>) -> Result<Self> {
        let fmt = fmt.into();
        if StrftimeItems::new(&fmt).any(|item| matches!(item, Item::Error)) {
            return Err(Error::configuration(format!("malformed format '{fmt}'")));
        }
        let rendered = self.start.format(&fmt).to_string();
        if parse_with_format(&rendered, &fmt) != Some(self.start) {
            return Err(Error::configuration(format!(
                "format '{fmt}' does not round-trip the start {}",
                self.start
            )));
        }
        self.fmt = fmt;
        Ok(self)
    }

    /// Series start.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive series end, if configured.
    #[must_use]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Series cadence.
    #[must_use]
    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Key format string.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.fmt
    }

    /// Number of closed windows at `effective`.
    #[must_use]
    pub fn num_windows(&self, effective: DateTime<Utc>) -> usize {
        let horizon = match self.end {
            Some(end) if end < effective => end,
            _ => effective,
        };
        usize::try_from(self.floor_index(horizon).max(0)).unwrap_or(usize::MAX)
    }

    /// Start of window `index`. Negative indices address windows before the
    /// series start, which partition mappings use for offsets.
    #[must_use]
    pub fn window_start(&self, index: i64) -> Option<DateTime<Utc>> {
        match self.cadence.fixed_seconds() {
            Some(step) => {
                let delta = TimeDelta::try_seconds(index.checked_mul(step)?)?;
                self.start.checked_add_signed(delta)
            }
            None => {
                let months = Months::new(u32::try_from(index.unsigned_abs()).ok()?);
                if index >= 0 {
                    self.start.checked_add_months(months)
                } else {
                    self.start.checked_sub_months(months)
                }
            }
        }
    }

    /// Window at `index`, which may lie outside the enumerated series.
    #[must_use]
    pub fn window_at(&self, index: i64) -> Option<TimeWindow> {
        Some(TimeWindow {
            start: self.window_start(index)?,
            end: self.window_start(index.checked_add(1)?)?,
        })
    }

    /// Formats the key of window `index`.
    #[must_use]
    pub fn key_at(&self, index: usize) -> Option<String> {
        let start = self.window_start(i64::try_from(index).ok()?)?;
        Some(start.format(&self.fmt).to_string())
    }

    /// Index of the window whose key is `key`, ignoring the effective time
    /// but honouring the configured end.
    #[must_use]
    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        let instant = parse_with_format(key, &self.fmt)?;
        if instant < self.start {
            return None;
        }
        let index = self.floor_index(instant);
        if self.window_start(index)? != instant {
            return None;
        }
        if instant.format(&self.fmt).to_string() != key {
            return None;
        }
        if let Some(end) = self.end {
            if self.window_start(index.checked_add(1)?)? > end {
                return None;
            }
        }
        usize::try_from(index).ok()
    }

    /// Returns true if `key` names a closed window at `effective`.
    #[must_use]
    pub fn contains(&self, key: &str, effective: DateTime<Utc>) -> bool {
        self.index_of_key(key)
            .is_some_and(|index| index < self.num_windows(effective))
    }

    /// The window addressed by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `key` is not a window of this series.
    pub fn time_window_for_key(&self, key: &str) -> Result<TimeWindow> {
        self.index_of_key(key)
            .and_then(|index| self.window_at(i64::try_from(index).ok()?))
            .ok_or_else(|| Error::invalid_key(key, "not a window of this series"))
    }

    /// Indices of enumerated windows at `effective` that overlap
    /// `[start, end)`.
    #[must_use]
    pub fn indices_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        effective: DateTime<Utc>,
    ) -> std::ops::Range<usize> {
        let total = self.num_windows(effective);
        let first = usize::try_from(self.floor_index(start).max(0)).unwrap_or(usize::MAX);
        let last = usize::try_from(self.starts_before(end).max(0)).unwrap_or(usize::MAX);
        first.min(total)..last.min(total).max(first.min(total))
    }

    /// Largest `k` with `window_start(k) <= instant`. Also the number of
    /// windows ending at or before `instant`.
    fn floor_index(&self, instant: DateTime<Utc>) -> i64 {
        match self.cadence.fixed_seconds() {
            Some(step) => (instant - self.start).num_seconds().div_euclid(step),
            None => {
                let months = i64::from(instant.year() - self.start.year()) * 12
                    + i64::from(instant.month())
                    - i64::from(self.start.month());
                match self.window_start(months) {
                    Some(candidate) if candidate > instant => months - 1,
                    _ => months,
                }
            }
        }
    }

    /// Number of `k >= 0` with `window_start(k) < instant`.
    fn starts_before(&self, instant: DateTime<Utc>) -> i64 {
        let floor = self.floor_index(instant);
        if self.window_start(floor) == Some(instant) {
            floor
        } else {
            floor + 1
        }
    }
}

/// Parses a user-facing start or end date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD-HH:MM`, `YYYY-MM-DD HH:MM:SS` and RFC 3339.
fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    [HOURLY_FORMAT, "%Y-%m-%d %H:%M:%S", DATE_FORMAT]
        .into_iter()
        .find_map(|fmt| parse_with_format(raw, fmt))
        .ok_or_else(|| Error::configuration(format!("unparseable date '{raw}'")))
}

fn parse_with_format(raw: &str, fmt: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, fmt)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
