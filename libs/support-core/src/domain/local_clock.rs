use crate::CoreError;
use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The single display zone. Every stored timestamp is UTC and goes through
/// here before it leaves the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClock {
    tz: Tz,
}

impl LocalClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Stored UTC wall time to local time, keeping the offset explicit.
    pub fn to_local(&self, utc: NaiveDateTime) -> DateTime<FixedOffset> {
        Utc.from_utc_datetime(&utc)
            .with_timezone(&self.tz)
            .fixed_offset()
    }

    /// Current calendar day in the display zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    pub fn to_local_opt(&self, utc: Option<NaiveDateTime>) -> Option<DateTime<FixedOffset>> {
        utc.map(|t| self.to_local(t))
    }

    /// Local wall time to the UTC value the store compares against.
    ///
    /// Ambiguous times (clocks going back) take the earlier instant when
    /// `earliest` is set, the later one otherwise. Times inside a gap are
    /// moved forward past it. Times chrono cannot place in the zone at all
    /// are rejected.
    pub fn to_utc(
        &self,
        local: NaiveDateTime,
        earliest: bool,
    ) -> Result<NaiveDateTime, CoreError> {
        let mut probe = local;
        // A DST gap never exceeds a couple of hours.
        for _ in 0..4 {
            match self.tz.from_local_datetime(&probe) {
                LocalResult::Single(t) => return Ok(t.naive_utc()),
                LocalResult::Ambiguous(a, b) => {
                    return Ok(if earliest { a.naive_utc() } else { b.naive_utc() });
                }
                LocalResult::None => {
                    probe = probe
                        .checked_add_signed(Duration::minutes(30))
                        .ok_or_else(|| unplaceable(local))?;
                }
            }
        }
        Err(unplaceable(local))
    }
}

fn unplaceable(local: NaiveDateTime) -> CoreError {
    CoreError::Validation(format!("{local} has no instant in the display timezone"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn converts_utc_to_mexico_city() {
        let clock = LocalClock::new(chrono_tz::America::Mexico_City);
        let local = clock.to_local(at(2025, 1, 15, 18, 0, 0));
        assert_eq!(local.to_rfc3339(), "2025-01-15T12:00:00-06:00");
    }

    #[test]
    fn optional_timestamps_convert_like_plain_ones() {
        let clock = LocalClock::new(chrono_tz::America::Mexico_City);
        let stored = at(2025, 3, 2, 5, 30, 0);
        assert_eq!(
            clock.to_local_opt(Some(stored)).map(|t| t.to_rfc3339()),
            Some("2025-03-01T23:30:00-06:00".to_string())
        );
        assert_eq!(clock.to_local_opt(None), None);
    }

    #[test]
    fn historic_dst_is_respected() {
        // Mexico City still observed DST in 2021
        let clock = LocalClock::new(chrono_tz::America::Mexico_City);
        let summer = clock.to_local(at(2021, 7, 1, 12, 0, 0));
        assert_eq!(summer.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn local_to_utc_round_trips() {
        let clock = LocalClock::new(chrono_tz::America::Mexico_City);
        let utc = clock.to_utc(at(2025, 1, 31, 23, 59, 59), false).unwrap();
        assert_eq!(utc, at(2025, 2, 1, 5, 59, 59));
    }

    #[test]
    fn gap_moves_forward() {
        // 2021-04-04 02:00 -> 03:00 in Mexico City
        let clock = LocalClock::new(chrono_tz::America::Mexico_City);
        let utc = clock.to_utc(at(2021, 4, 4, 2, 15, 0), true).unwrap();
        // 02:15 and 02:45 do not exist; 03:15 CDT is 08:15 UTC
        assert_eq!(utc, at(2021, 4, 4, 8, 15, 0));
    }

    #[test]
    fn far_future_local_time_is_an_error() {
        let clock = LocalClock::new(chrono_tz::America::Mexico_City);
        let edge = NaiveDate::MAX.and_hms_opt(23, 59, 59).unwrap();
        assert!(matches!(clock.to_utc(edge, false), Err(CoreError::Validation(_))));
    }
}
