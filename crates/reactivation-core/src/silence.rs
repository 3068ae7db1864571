//! Silence measurement since the cursor's anchor.

use chrono::{DateTime, Utc};

/// Elapsed silence for one conversation at one instant.
///
/// Stateless: when the contact writes again the cursor must be reset before
/// measuring, otherwise the old anchor is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Silence {
    pub anchor_at: DateTime<Utc>,
    /// Whole minutes since `anchor_at`, rounded down, never negative.
    pub elapsed_minutes: i64,
}

impl Silence {
    pub fn measure(anchor_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let elapsed_minutes = (now - anchor_at).num_minutes().max(0);
        Self {
            anchor_at,
            elapsed_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_floors_to_whole_minutes() {
        let anchor = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let now = anchor + Duration::seconds(29 * 60 + 59);
        assert_eq!(Silence::measure(anchor, now).elapsed_minutes, 29);
        assert_eq!(
            Silence::measure(anchor, anchor + Duration::minutes(30)).elapsed_minutes,
            30
        );
    }

    #[test]
    fn test_never_negative() {
        let anchor = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let earlier = anchor - Duration::minutes(5);
        assert_eq!(Silence::measure(anchor, earlier).elapsed_minutes, 0);
    }
}
