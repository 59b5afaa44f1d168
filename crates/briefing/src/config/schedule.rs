//! Delivery schedule: frequency, time of day, and the reference timezone.
//!
//! Schedule times are wall-clock times in a single fixed timezone (KST,
//! UTC+09:00, which observes no daylight saving). The cron trigger is
//! expected to fire once per minute; a user is due when the current
//! minute in the reference timezone equals their `scheduleTime`.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ConfigError;

/// Offset of the reference timezone from UTC, in seconds (KST).
pub const REFERENCE_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Day on which weekly briefings are delivered.
pub const WEEKLY_DELIVERY_DAY: Weekday = Weekday::Fri;

/// The fixed timezone all schedule times are interpreted in.
#[must_use]
pub fn reference_timezone() -> FixedOffset {
    FixedOffset::east_opt(REFERENCE_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// How often a briefing is delivered automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleFrequency {
    /// Every day at the scheduled time.
    #[default]
    Daily,
    /// Fridays at the scheduled time.
    Weekly,
    /// Automatic delivery off; manual triggers still work.
    #[serde(rename = "none")]
    Disabled,
}

impl ScheduleFrequency {
    /// Parse from the wire name (`daily`, `weekly`, `none`). Accepts
    /// exactly what the serde form accepts, apart from surrounding spaces.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "none" => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for ScheduleFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Disabled => "none",
        };
        f.write_str(s)
    }
}

/// Time of day (`HH:MM`) in the reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleTime {
    hour: u32,
    minute: u32,
}

impl ScheduleTime {
    /// Build from components, rejecting out-of-range values.
    pub fn new(hour: u32, minute: u32) -> Result<Self, ConfigError> {
        if hour > 23 || minute > 59 {
            return Err(ConfigError::InvalidScheduleTime(format!("{hour}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    #[must_use]
    pub const fn hour(self) -> u32 {
        self.hour
    }

    #[must_use]
    pub const fn minute(self) -> u32 {
        self.minute
    }

    fn as_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl Default for ScheduleTime {
    fn default() -> Self {
        Self { hour: 9, minute: 0 }
    }
}

impl FromStr for ScheduleTime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidScheduleTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ScheduleTime {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleTime> for String {
    fn from(value: ScheduleTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Whether a delivery is due at `now` (minute granularity).
#[must_use]
pub fn is_due(frequency: ScheduleFrequency, time: ScheduleTime, now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&reference_timezone());
    let minute_matches = local.hour() == time.hour && local.minute() == time.minute;

    match frequency {
        ScheduleFrequency::Daily => minute_matches,
        ScheduleFrequency::Weekly => minute_matches && local.weekday() == WEEKLY_DELIVERY_DAY,
        ScheduleFrequency::Disabled => false,
    }
}

/// Next scheduled delivery strictly after `now`, in the reference timezone.
#[must_use]
pub fn next_run(
    frequency: ScheduleFrequency,
    time: ScheduleTime,
    now: DateTime<Utc>,
) -> Option<DateTime<FixedOffset>> {
    let tz = reference_timezone();
    let local_now = now.with_timezone(&tz);
    let mut date = local_now.date_naive();

    // At most eight days ahead covers the weekly case.
    for _ in 0..8 {
        let candidate = tz
            .from_local_datetime(&date.and_time(time.as_naive()))
            .single()?;
        let day_ok = match frequency {
            ScheduleFrequency::Daily => true,
            ScheduleFrequency::Weekly => candidate.weekday() == WEEKLY_DELIVERY_DAY,
            ScheduleFrequency::Disabled => return None,
        };
        if day_ok && candidate > local_now {
            return Some(candidate);
        }
        date += Duration::days(1);
    }
    None
}
