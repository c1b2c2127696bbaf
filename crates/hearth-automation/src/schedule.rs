//! Periodic schedule synthesis
//!
//! Converts symbolic periods ("every hour", "every monday") and fixed
//! repeat intervals into the six-field schedule expression the host's
//! periodic-trigger mechanism consumes:
//! `second minute hour day-of-month month day-of-week`.

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Schedule synthesis errors
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid schedule configuration: {0}")]
    InvalidConfig(String),

    #[error("duration of {0} seconds cannot be expressed as a periodic schedule")]
    UnsupportedDuration(u64),
}

/// Result type for schedule synthesis
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Symbolic periods a schedule can be synthesized from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Period {
    /// Whether the period repeats more often than once a day
    ///
    /// An absolute time of day is ambiguous for these.
    fn is_sub_day(&self) -> bool {
        matches!(self, Period::Second | Period::Minute | Period::Hour)
    }

    fn weekday(&self) -> Option<Weekday> {
        match self {
            Period::Monday => Some(Weekday::Mon),
            Period::Tuesday => Some(Weekday::Tue),
            Period::Wednesday => Some(Weekday::Wed),
            Period::Thursday => Some(Weekday::Thu),
            Period::Friday => Some(Weekday::Fri),
            Period::Saturday => Some(Weekday::Sat),
            Period::Sunday => Some(Weekday::Sun),
            _ => None,
        }
    }
}

/// A single field of a schedule expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Every value (`*`)
    All,
    /// No constraint contributed (`?`)
    Unbound,
    /// A literal value
    At(u32),
    /// Every n-th value (`*/n`)
    Step(u32),
    /// A literal weekday
    Day(Weekday),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::All => write!(f, "*"),
            Field::Unbound => write!(f, "?"),
            Field::At(n) => write!(f, "{}", n),
            Field::Step(n) => write!(f, "*/{}", n),
            Field::Day(w) => {
                let name = match w {
                    Weekday::Mon => "MON",
                    Weekday::Tue => "TUE",
                    Weekday::Wed => "WED",
                    Weekday::Thu => "THU",
                    Weekday::Fri => "FRI",
                    Weekday::Sat => "SAT",
                    Weekday::Sun => "SUN",
                };
                write!(f, "{}", name)
            }
        }
    }
}

/// A six-field periodic schedule
///
/// Produced on demand and immediately serialized; never retained as
/// long-lived state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub second: Field,
    pub minute: Field,
    pub hour: Field,
    pub day_of_month: Field,
    pub month: Field,
    pub day_of_week: Field,
}

impl ScheduleSpec {
    /// Base template for a symbolic period
    ///
    /// Each template pins the fields below its granularity to 0 and
    /// leaves the rest open.
    fn template(period: Period) -> Self {
        let base = |second, minute, hour, day_of_month, month, day_of_week| Self {
            second,
            minute,
            hour,
            day_of_month,
            month,
            day_of_week,
        };

        use Field::*;
        match period {
            Period::Second => base(All, All, All, All, All, Unbound),
            Period::Minute => base(At(0), All, All, All, All, Unbound),
            Period::Hour => base(At(0), At(0), All, All, All, Unbound),
            Period::Day => base(At(0), At(0), At(0), All, All, Unbound),
            Period::Week => base(At(0), At(0), At(0), Unbound, All, Day(Weekday::Mon)),
            Period::Month => base(At(0), At(0), At(0), At(1), All, Unbound),
            Period::Year => base(At(0), At(0), At(0), At(1), At(1), Unbound),
            weekday => base(
                At(0),
                At(0),
                At(0),
                Unbound,
                All,
                // weekday() is Some for every remaining variant
                weekday.weekday().map(Day).unwrap_or(Unbound),
            ),
        }
    }

    /// Synthesize a schedule from a symbolic period
    ///
    /// `at` overwrites the second/minute/hour fields with the literal
    /// time of day; combining it with a sub-day period is rejected.
    pub fn from_period(period: Period, at: Option<NaiveTime>) -> ScheduleResult<Self> {
        let mut spec = Self::template(period);

        if let Some(at) = at {
            if period.is_sub_day() {
                return Err(ScheduleError::InvalidConfig(format!(
                    "a time of day cannot be combined with the sub-day period {:?}",
                    period
                )));
            }
            spec.second = Field::At(at.second());
            spec.minute = Field::At(at.minute());
            spec.hour = Field::At(at.hour());
        }

        Ok(spec)
    }

    /// Synthesize a schedule from a fixed repeat interval
    ///
    /// Supported only for durations with zero sub-second and zero
    /// whole-day components. The finest unit in which the duration is a
    /// whole, field-representable count wins.
    pub fn from_duration(duration: Duration) -> ScheduleResult<Self> {
        let total = duration.as_secs();

        if duration.subsec_nanos() != 0 || total == 0 || total >= 86_400 {
            return Err(ScheduleError::UnsupportedDuration(total));
        }

        // (seconds per unit, cap, template period, field selector)
        let units: [(u64, u64, Period, fn(&mut ScheduleSpec) -> &mut Field); 3] = [
            (1, 60, Period::Second, |s| &mut s.second),
            (60, 60, Period::Minute, |s| &mut s.minute),
            (3600, 24, Period::Hour, |s| &mut s.hour),
        ];

        for (unit_secs, cap, period, field) in units {
            let remainder = total % unit_secs;
            let count = total / unit_secs;
            if remainder == 0 && count > 0 && count < cap {
                let mut spec = Self::template(period);
                *field(&mut spec) = Field::Step(count as u32);
                return Ok(spec);
            }
        }

        Err(ScheduleError::UnsupportedDuration(total))
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.second, self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}
