use chrono::{DateTime, Timelike, Utc};
use chrono_tz::US::Eastern;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading session windows, expressed as minute offsets from midnight ET.
/// Asian wraps midnight (20:00 - 00:00); the two New York killzones are
/// collapsed into a single tag.
const ASIAN: (u32, u32) = (20 * 60, 0);
const LONDON: (u32, u32) = (2 * 60, 5 * 60);
const NEW_YORK: (u32, u32) = (7 * 60, 12 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Asian,
    London,
    NewYork,
    OffSession,
}

impl Session {
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Asian => "asian",
            Session::London => "london",
            Session::NewYork => "new_york",
            Session::OffSession => "off_session",
        }
    }

    /// Sessions where signal flow is expected to be dense.
    pub fn is_killzone(&self) -> bool {
        matches!(self, Session::London | Session::NewYork)
    }

    pub fn from_timestamp(ts: DateTime<Utc>) -> Session {
        let et = ts.with_timezone(&Eastern);
        let minute = et.hour() * 60 + et.minute();

        for (session, (start, end)) in [
            (Session::London, LONDON),
            (Session::NewYork, NEW_YORK),
            (Session::Asian, ASIAN),
        ] {
            let hit = if start < end {
                minute >= start && minute < end
            } else {
                // Wraps midnight
                minute >= start || minute < end
            };
            if hit {
                return session;
            }
        }
        Session::OffSession
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc_for_et_hour(et_hour: u32) -> DateTime<Utc> {
        // ET is UTC-5 (standard time) in January.
        use chrono::NaiveDate;
        let utc_hour = et_hour + 5;
        let (day, hour) = if utc_hour >= 24 {
            (16, utc_hour - 24)
        } else {
            (15, utc_hour)
        };
        let naive = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        Utc.from_utc_datetime(&naive)
    }

    #[test]
    fn london_window() {
        let s = Session::from_timestamp(utc_for_et_hour(3));
        assert_eq!(s, Session::London);
        assert!(s.is_killzone());
    }

    #[test]
    fn new_york_window() {
        let s = Session::from_timestamp(utc_for_et_hour(8));
        assert_eq!(s, Session::NewYork);
        assert!(s.is_killzone());
    }

    #[test]
    fn asian_wraps_midnight() {
        let s = Session::from_timestamp(utc_for_et_hour(21));
        assert_eq!(s, Session::Asian);
        assert!(!s.is_killzone());
    }

    #[test]
    fn afternoon_is_off_session() {
        let s = Session::from_timestamp(utc_for_et_hour(14));
        assert_eq!(s, Session::OffSession);
    }
}
