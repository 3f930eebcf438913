use super::LocalClock;
use crate::CoreError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// First day an operator can query. Nothing older is kept in the store.
fn earliest_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Inclusive range of local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::Validation(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// 1 January of `today`'s year through `today`.
    pub fn year_to_date(today: NaiveDate) -> Self {
        let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
        Self { start, end: today }
    }

    /// Parses optional `YYYY-MM-DD` bounds, filling gaps from the
    /// year-to-date default. Each bound must fall between
    /// [`earliest_day`] and `today`.
    pub fn from_query(
        from: Option<&str>,
        to: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self, CoreError> {
        let default = Self::year_to_date(today);
        let parse = |raw: &str| parse_day(raw, today);
        let start = from.map(parse).transpose()?.unwrap_or(default.start);
        let end = to.map(parse).transpose()?.unwrap_or(default.end);
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// First local instant of the range.
    pub fn start_of_day(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// Last local instant of the range: the end day at 23:59:59.
    pub fn end_of_day(&self) -> NaiveDateTime {
        self.end.and_hms_opt(23, 59, 59).unwrap_or(self.end.and_time(NaiveTime::MIN))
    }

    /// Inclusive UTC bounds for comparing against stored timestamps.
    pub fn utc_bounds(
        &self,
        clock: &LocalClock,
    ) -> Result<(NaiveDateTime, NaiveDateTime), CoreError> {
        Ok((
            clock.to_utc(self.start_of_day(), true)?,
            clock.to_utc(self.end_of_day(), false)?,
        ))
    }
}

fn parse_day(raw: &str, today: NaiveDate) -> Result<NaiveDate, CoreError> {
    let day = NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| CoreError::Validation(format!("expected a YYYY-MM-DD date, got {raw}")))?;
    let earliest = earliest_day();
    if day < earliest || day > today {
        return Err(CoreError::Validation(format!(
            "{day} is outside {earliest} through {today}"
        )));
    }
    Ok(day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn end_is_normalized_to_last_second() {
        let range = DateRange::new(day(2025, 1, 1), day(2025, 1, 31)).unwrap();
        assert_eq!(range.end_of_day().to_string(), "2025-01-31 23:59:59");
        assert_eq!(range.start_of_day().to_string(), "2025-01-01 00:00:00");
    }

    #[test]
    fn single_day_range_covers_the_whole_day() {
        let clock = LocalClock::new(chrono_tz::America::Mexico_City);
        let range = DateRange::new(day(2025, 1, 15), day(2025, 1, 15)).unwrap();
        let (lo, hi) = range.utc_bounds(&clock).unwrap();
        assert_eq!(lo.to_string(), "2025-01-15 06:00:00");
        assert_eq!(hi.to_string(), "2025-01-16 05:59:59");

        // Late-evening local activity is stored on the next UTC day
        let late = day(2025, 1, 16).and_hms_opt(5, 30, 0).unwrap();
        assert!(lo <= late && late <= hi);
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(matches!(
            DateRange::new(day(2025, 2, 1), day(2025, 1, 1)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn defaults_to_year_to_date() {
        let range = DateRange::from_query(None, None, day(2025, 6, 10)).unwrap();
        assert_eq!(range.start(), day(2025, 1, 1));
        assert_eq!(range.end(), day(2025, 6, 10));

        let range = DateRange::from_query(Some("2025-03-01"), None, day(2025, 6, 10)).unwrap();
        assert_eq!(range.start(), day(2025, 3, 1));
    }

    #[test]
    fn malformed_dates_are_validation_errors() {
        assert!(matches!(
            DateRange::from_query(Some("01/03/2025"), None, day(2025, 6, 10)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn dates_outside_the_query_window_are_rejected() {
        let today = day(2025, 6, 10);
        for raw in ["+262142-12-31", "2023-12-31", "2025-06-11"] {
            assert!(
                matches!(
                    DateRange::from_query(None, Some(raw), today),
                    Err(CoreError::Validation(_))
                ),
                "{raw} should be rejected"
            );
        }
        let range = DateRange::from_query(Some("2024-01-01"), Some("2025-06-10"), today).unwrap();
        assert_eq!(range.start(), earliest_day());
        assert_eq!(range.end(), today);
    }
}
