//! Session-zone time helpers.
//!
//! All civil dates in the platform are interpreted in the market session
//! zone, fixed at UTC+8 for the default A-share deployment. Instants are
//! stored as UTC and only projected into the session zone when a civil
//! date is needed.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

/// The fixed session zone (UTC+8).
pub fn session_zone() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset")
}

/// Current instant in the session zone.
pub fn session_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&session_zone())
}

/// Today's civil date in the session zone.
pub fn session_today() -> NaiveDate {
    session_now().date_naive()
}

/// Yesterday's civil date in the session zone — the default end of a
/// historical download (today's bar may not be settled yet).
pub fn session_yesterday() -> NaiveDate {
    session_today() - Duration::days(1)
}

/// A batch id: a timestamp-shaped string unique per orchestrator run.
pub fn new_batch_id() -> String {
    session_now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_zone_is_utc_plus_8() {
        assert_eq!(session_zone().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_batch_id_shape() {
        let id = new_batch_id();
        assert_eq!(id.len(), 15);
        assert_eq!(id.chars().nth(8), Some('_'));
    }

    #[test]
    fn test_yesterday_precedes_today() {
        assert!(session_yesterday() < session_today());
    }
}
