//! Core data types for the aggregation engine.

use crate::error::{AggregationError, Result};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single normalized sales observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub unique_id: String,
    pub date: NaiveDate,
    pub y: f64,
}

impl Record {
    /// Create a new record.
    pub fn new(unique_id: impl Into<String>, date: NaiveDate, y: f64) -> Self {
        Self {
            unique_id: unique_id.into(),
            date,
            y,
        }
    }
}

/// Target frequency for resampling daily observations.
///
/// Only coarse frequencies are supported: the windowed engine assumes every
/// window holds at least one whole day per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResampleFrequency {
    /// Seven-day periods starting on `anchor`.
    Weekly { anchor: Weekday },
    /// Calendar months, labelled by their first day.
    Monthly,
}

impl Default for ResampleFrequency {
    fn default() -> Self {
        ResampleFrequency::weekly()
    }
}

impl ResampleFrequency {
    /// Weekly periods starting on Monday.
    ///
    /// Plain `W` carries no anchor, so it follows the ISO week. Periods that
    /// must start on another day, for example weeks labelled by a Wednesday
    /// such as 2020-01-01, use [`ResampleFrequency::weekly_from`] or the
    /// `W-WED` code.
    pub fn weekly() -> Self {
        ResampleFrequency::Weekly {
            anchor: Weekday::Mon,
        }
    }

    /// Weekly periods starting on the given weekday.
    pub fn weekly_from(anchor: Weekday) -> Self {
        ResampleFrequency::Weekly { anchor }
    }

    /// Start date of the period that contains `date`.
    ///
    /// Falls back to `date` itself in the first days of the calendar, where
    /// the period start is not representable; see
    /// [`ResampleFrequency::checked_period_start`].
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        self.checked_period_start(date).unwrap_or(date)
    }

    /// Start date of the period that contains `date`, if representable.
    pub fn checked_period_start(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            ResampleFrequency::Weekly { anchor } => {
                let offset = (date.weekday().num_days_from_monday() + 7
                    - anchor.num_days_from_monday())
                    % 7;
                date.checked_sub_days(Days::new(offset as u64))
            }
            ResampleFrequency::Monthly => date.with_day(1),
        }
    }

    /// Window span used when the caller does not pick one.
    ///
    /// Roughly two periods per window keeps the per-window pivot small while
    /// keeping the number of passes over the source low.
    pub fn default_window_span(&self) -> i64 {
        match self {
            ResampleFrequency::Weekly { .. } => 14,
            ResampleFrequency::Monthly => 59,
        }
    }

    /// Short code, e.g. `W-MON` or `M`.
    pub fn code(&self) -> String {
        match self {
            ResampleFrequency::Weekly { anchor } => {
                format!("W-{}", anchor.to_string().to_uppercase())
            }
            ResampleFrequency::Monthly => "M".to_string(),
        }
    }
}

impl fmt::Display for ResampleFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for ResampleFrequency {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_uppercase();
        match code.as_str() {
            "W" | "WEEKLY" => Ok(ResampleFrequency::weekly()),
            "M" | "MS" | "MONTHLY" => Ok(ResampleFrequency::Monthly),
            other => {
                if let Some(day) = other.strip_prefix("W-") {
                    let anchor = day.parse::<Weekday>().map_err(|_| {
                        AggregationError::ConfigError(format!(
                            "Unknown weekly anchor '{}' in frequency '{}'",
                            day, s
                        ))
                    })?;
                    return Ok(ResampleFrequency::Weekly { anchor });
                }
                Err(AggregationError::ConfigError(format!(
                    "Unsupported frequency '{}': expected W, W-<DAY> or M",
                    s
                )))
            }
        }
    }
}

impl TryFrom<String> for ResampleFrequency {
    type Error = AggregationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResampleFrequency> for String {
    fn from(value: ResampleFrequency) -> Self {
        value.code()
    }
}

/// A slice of the date range processed as one batch.
///
/// Both bounds are exclusive: a date belongs to the window when
/// `start < date < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Position in the segment sequence, starting at 0.
    pub index: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub span_days: i64,
}

impl Window {
    /// Window of `span_days` opening at `start`, if its end is representable.
    pub(crate) fn starting_at(index: usize, start: NaiveDate, span_days: i64) -> Option<Self> {
        let end = start.checked_add_days(Days::new(u64::try_from(span_days).ok()?))?;
        Some(Self {
            index,
            start,
            end,
            span_days,
        })
    }

    /// Check whether `date` falls strictly inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start < date && date < self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({} .. {})", self.index, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_period_start_monday() {
        let freq = ResampleFrequency::weekly();
        // 2020-01-01 is a Wednesday
        assert_eq!(freq.period_start(date(2020, 1, 1)), date(2019, 12, 30));
        assert_eq!(freq.period_start(date(2019, 12, 30)), date(2019, 12, 30));
        assert_eq!(freq.period_start(date(2020, 1, 5)), date(2019, 12, 30));
        assert_eq!(freq.period_start(date(2020, 1, 6)), date(2020, 1, 6));
    }

    #[test]
    fn test_weekly_period_start_custom_anchor() {
        let freq = ResampleFrequency::weekly_from(Weekday::Wed);
        assert_eq!(freq.period_start(date(2020, 1, 1)), date(2020, 1, 1));
        assert_eq!(freq.period_start(date(2020, 1, 7)), date(2020, 1, 1));
        assert_eq!(freq.period_start(date(2020, 1, 8)), date(2020, 1, 8));
        assert_eq!(freq.period_start(date(2019, 12, 31)), date(2019, 12, 25));
    }

    #[test]
    fn test_plain_and_wednesday_weeks_label_new_year_differently() {
        let new_year = date(2020, 1, 1);
        let plain: ResampleFrequency = "W".parse().unwrap();
        let wed: ResampleFrequency = "W-WED".parse().unwrap();
        assert_eq!(plain.period_start(new_year), date(2019, 12, 30));
        assert_eq!(wed.period_start(new_year), new_year);
        assert_eq!(wed.period_start(date(2020, 1, 7)), new_year);
        assert_eq!(wed.period_start(date(2020, 1, 8)), date(2020, 1, 8));
    }

    #[test]
    fn test_monthly_period_start() {
        let freq = ResampleFrequency::Monthly;
        assert_eq!(freq.period_start(date(2020, 2, 29)), date(2020, 2, 1));
        assert_eq!(freq.period_start(date(2020, 3, 1)), date(2020, 3, 1));
    }

    #[test]
    fn test_parse_frequency() {
        assert_eq!("W".parse::<ResampleFrequency>().unwrap(), ResampleFrequency::weekly());
        assert_eq!(
            "w-sun".parse::<ResampleFrequency>().unwrap(),
            ResampleFrequency::weekly_from(Weekday::Sun)
        );
        assert_eq!("M".parse::<ResampleFrequency>().unwrap(), ResampleFrequency::Monthly);
        assert_eq!("MS".parse::<ResampleFrequency>().unwrap(), ResampleFrequency::Monthly);
    }

    #[test]
    fn test_parse_frequency_rejects_unsupported() {
        for code in ["D", "H", "Q", "W-XYZ", ""] {
            let err = code.parse::<ResampleFrequency>().unwrap_err();
            assert!(matches!(err, AggregationError::ConfigError(_)), "{}", code);
        }
    }

    #[test]
    fn test_frequency_code_round_trip() {
        let freq = ResampleFrequency::weekly_from(Weekday::Fri);
        assert_eq!(freq.code(), "W-FRI");
        assert_eq!(freq.code().parse::<ResampleFrequency>().unwrap(), freq);
    }

    #[test]
    fn test_default_window_span() {
        assert_eq!(ResampleFrequency::weekly().default_window_span(), 14);
        assert_eq!(ResampleFrequency::Monthly.default_window_span(), 59);
    }

    #[test]
    fn test_window_contains_is_strict() {
        let window = Window {
            index: 0,
            start: date(2020, 1, 1),
            end: date(2020, 1, 8),
            span_days: 7,
        };
        assert!(!window.contains(date(2020, 1, 1)));
        assert!(window.contains(date(2020, 1, 2)));
        assert!(window.contains(date(2020, 1, 7)));
        assert!(!window.contains(date(2020, 1, 8)));
    }

    #[test]
    fn test_period_start_at_calendar_edge() {
        let freq = ResampleFrequency::weekly();
        let first = NaiveDate::MIN;
        let back = first.weekday().num_days_from_monday();
        if back > 0 {
            assert_eq!(freq.checked_period_start(first), None);
            assert_eq!(freq.period_start(first), first);
        }
        assert_eq!(
            ResampleFrequency::Monthly.checked_period_start(first),
            first.with_day(1)
        );
        assert_eq!(freq.checked_period_start(date(2020, 1, 1)), Some(date(2019, 12, 30)));
    }
}
