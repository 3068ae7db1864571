//! Time-of-day windows that gate when a step may fire.

use std::fmt;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReactivationError, Result};

/// Minutes in a day.
pub const MINUTES_PER_DAY: u16 = 1440;

/// An allowed time-of-day range, in minutes since local midnight.
///
/// `start` is inclusive and `end` exclusive. A window with `start > end`
/// wraps past midnight (22:00-06:00). A window with `start == end` places no
/// restriction at all: it is accepted and treated as always open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: u16,
    pub end: u16,
}

impl TimeWindow {
    /// Create a window, rejecting minutes outside a day.
    pub fn new(start: u16, end: u16) -> Result<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    /// Parse a window from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_hhmm(start)?, parse_hhmm(end)?)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("start", self.start), ("end", self.end)] {
            if value >= MINUTES_PER_DAY {
                return Err(ReactivationError::InvalidConfiguration(format!(
                    "time window {} {} is outside 00:00-23:59",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Degenerate window: always open.
    pub fn is_unrestricted(&self) -> bool {
        self.start == self.end
    }

    /// Whether `minute_of_day` falls inside the window.
    pub fn contains(&self, minute_of_day: u16) -> bool {
        let m = minute_of_day % MINUTES_PER_DAY;
        if self.is_unrestricted() {
            true
        } else if self.wraps_midnight() {
            m >= self.start || m < self.end
        } else {
            self.start <= m && m < self.end
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_hhmm(self.start), format_hhmm(self.end))
    }
}

/// Parse `HH:MM` into minutes since midnight.
pub fn parse_hhmm(value: &str) -> Result<u16> {
    let invalid = || ReactivationError::InvalidConfiguration(format!("invalid time of day: {:?}", value));

    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u16 = hours.parse().map_err(|_| invalid())?;
    let minutes: u16 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    Ok(hours * 60 + minutes)
}

/// Format minutes since midnight as `HH:MM`.
pub fn format_hhmm(minute_of_day: u16) -> String {
    let m = minute_of_day % MINUTES_PER_DAY;
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Minutes since local midnight for `at`, given the business timezone offset.
pub fn minute_of_day(at: DateTime<Utc>, utc_offset_minutes: i32) -> u16 {
    let local = at + Duration::minutes(i64::from(utc_offset_minutes));
    (local.hour() * 60 + local.minute()) as u16
}

/// Decides whether a step's window is open at a given instant.
///
/// Holds the tenant's business timezone so the sequencer never deals with
/// time-of-day arithmetic itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowGate {
    utc_offset_minutes: i32,
}

impl WindowGate {
    pub fn new(utc_offset_minutes: i32) -> Self {
        Self { utc_offset_minutes }
    }

    /// Gate for UTC business hours.
    pub fn utc() -> Self {
        Self::default()
    }

    /// An absent window is always open.
    pub fn allows(&self, window: Option<&TimeWindow>, at: DateTime<Utc>) -> bool {
        match window {
            Some(window) => window.contains(minute_of_day(at, self.utc_offset_minutes)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_parse_and_format() {
        assert_eq!(parse_hhmm("22:00").unwrap(), 1320);
        assert_eq!(parse_hhmm("06:30").unwrap(), 390);
        assert_eq!(parse_hhmm(" 0:05 ").unwrap(), 5);
        assert_eq!(format_hhmm(390), "06:30");

        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("12:60").is_err());
        assert!(parse_hhmm("noon").is_err());

        let window = TimeWindow::parse("22:00", "06:00").unwrap();
        assert_eq!(window.to_string(), "22:00-06:00");
    }

    #[test]
    fn test_rejects_minutes_outside_day() {
        assert!(TimeWindow::new(0, 1440).is_err());
        assert!(TimeWindow::new(1439, 0).is_ok());
    }

    #[test]
    fn test_plain_window() {
        let window = TimeWindow::parse("09:00", "18:00").unwrap();
        assert!(!window.contains(parse_hhmm("08:59").unwrap()));
        assert!(window.contains(parse_hhmm("09:00").unwrap()));
        assert!(window.contains(parse_hhmm("17:59").unwrap()));
        assert!(!window.contains(parse_hhmm("18:00").unwrap()));
    }

    #[test]
    fn test_window_wrapping_midnight() {
        let window = TimeWindow::parse("22:00", "06:00").unwrap();
        assert!(window.wraps_midnight());
        assert!(window.contains(parse_hhmm("22:00").unwrap()));
        assert!(window.contains(parse_hhmm("23:30").unwrap()));
        assert!(window.contains(parse_hhmm("00:00").unwrap()));
        assert!(window.contains(parse_hhmm("05:59").unwrap()));
        assert!(!window.contains(parse_hhmm("06:00").unwrap()));
        assert!(!window.contains(parse_hhmm("14:00").unwrap()));
    }

    #[test]
    fn test_equal_bounds_always_open() {
        let window = TimeWindow::parse("10:00", "10:00").unwrap();
        assert!(window.is_unrestricted());
        for m in [0, 599, 600, 601, 1439] {
            assert!(window.contains(m));
        }
    }

    #[test]
    fn test_gate_without_window() {
        assert!(WindowGate::utc().allows(None, at(3, 0)));
    }

    #[test]
    fn test_gate_applies_utc_offset() {
        let window = TimeWindow::parse("09:00", "18:00").unwrap();

        // 11:00 UTC is 08:00 at UTC-3
        let gate = WindowGate::new(-180);
        assert!(!gate.allows(Some(&window), at(11, 0)));
        assert!(gate.allows(Some(&window), at(12, 0)));

        // 23:30 UTC is 09:00 next day at UTC+9:30
        let gate = WindowGate::new(570);
        assert!(gate.allows(Some(&window), at(23, 30)));
    }

    #[test]
    fn test_minute_of_day_wraps_backwards() {
        // 01:00 UTC at UTC-5 is 20:00 the previous day
        assert_eq!(minute_of_day(at(1, 0), -300), 20 * 60);
    }
}
