//! Trading session time arithmetic.
//!
//! Daily counters reset at a configured session start time; the trading
//! lock unlocks at the next session start after it engages.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Parse a session time in "HH:MM" form.
pub fn parse_session_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| CoreError::InvalidTime(s.to_string()))
}

/// Start of the session that `now` belongs to.
///
/// Before today's session start the current session began yesterday.
#[must_use]
pub fn session_start_at(now: DateTime<Utc>, session_start: NaiveTime) -> DateTime<Utc> {
    let date = if now.time() < session_start {
        now.date_naive() - Duration::days(1)
    } else {
        now.date_naive()
    };
    DateTime::from_naive_utc_and_offset(date.and_time(session_start), Utc)
}

/// First session start strictly after `now` (the auto-unlock instant for a
/// lock engaged at `now`).
#[must_use]
pub fn next_session_start(now: DateTime<Utc>, session_start: NaiveTime) -> DateTime<Utc> {
    let today = DateTime::from_naive_utc_and_offset(now.date_naive().and_time(session_start), Utc);
    if now >= today {
        today + Duration::days(1)
    } else {
        today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_session_time() {
        assert_eq!(
            parse_session_time("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert!(parse_session_time("9h30").is_err());
        assert!(parse_session_time("25:00").is_err());
    }

    #[test]
    fn test_session_start_before_and_after() {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        // 10:00 is inside today's session.
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        assert_eq!(
            session_start_at(now, start),
            Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
        );

        // 08:00 still belongs to yesterday's session.
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        assert_eq!(
            session_start_at(now, start),
            Utc.with_ymd_and_hms(2026, 3, 9, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_session_start() {
        let start = NaiveTime::from_hms_opt(0, 0, 0).unwrap();

        // Mid-day lock unlocks tomorrow at midnight.
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 14, 30, 0).unwrap();
        assert_eq!(
            next_session_start(now, start),
            Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap()
        );

        // A lock engaged exactly at session start also unlocks tomorrow.
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(
            next_session_start(now, start),
            Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap()
        );

        // Before a later session start, unlock is later today.
        let start = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 14, 30, 0).unwrap();
        assert_eq!(
            next_session_start(now, start),
            Utc.with_ymd_and_hms(2026, 3, 10, 22, 0, 0).unwrap()
        );
    }
}
