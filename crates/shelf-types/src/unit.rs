use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;
/// Billing months are a flat 30 days.
const MINUTES_PER_MONTH: i64 = 30 * MINUTES_PER_DAY;

/// Granularity used for borrow periods and fine billing.
///
/// Borrow periods accept `minute`, `hour`, and `day`; fine billing
/// additionally accepts `month`. Unknown strings read from configuration
/// fall back to [`TimeUnit::Day`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minute,
    Hour,
    #[default]
    Day,
    Month,
}

impl TimeUnit {
    /// Length of one unit in whole minutes.
    pub const fn minutes(self) -> i64 {
        match self {
            Self::Minute => 1,
            Self::Hour => MINUTES_PER_HOUR,
            Self::Day => MINUTES_PER_DAY,
            Self::Month => MINUTES_PER_MONTH,
        }
    }

    /// Length of one unit in whole seconds.
    pub const fn seconds(self) -> i64 {
        self.minutes() * 60
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// Parse a stored configuration value, defaulting to `Day` for anything
    /// unrecognised (including the empty string).
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Parse a borrow-period unit. `month` is not a borrow unit and falls
    /// back to `Day` like any other unknown value.
    pub fn parse_borrow_lossy(s: &str) -> Self {
        match Self::parse_lossy(s) {
            Self::Month => Self::Day,
            unit => unit,
        }
    }

    /// Whether this unit may be used for a borrow period.
    pub const fn is_borrow_unit(self) -> bool {
        !matches!(self, Self::Month)
    }
}

impl FromStr for TimeUnit {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            _ => Err(TypeError::UnknownUnit(s.to_string())),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn minute_table() {
        assert_eq!(TimeUnit::Minute.minutes(), 1);
        assert_eq!(TimeUnit::Hour.minutes(), 60);
        assert_eq!(TimeUnit::Day.minutes(), 1440);
        assert_eq!(TimeUnit::Month.minutes(), 43200);
        assert_eq!(TimeUnit::Hour.seconds(), 3600);
        assert_eq!(TimeUnit::Day.seconds(), 86400);
    }

    #[test]
    fn lossy_parse_defaults_to_day() {
        assert_eq!(TimeUnit::parse_lossy(""), TimeUnit::Day);
        assert_eq!(TimeUnit::parse_lossy("fortnight"), TimeUnit::Day);
        assert_eq!(TimeUnit::parse_lossy("HOUR"), TimeUnit::Hour);
    }

    #[test]
    fn month_is_not_a_borrow_unit() {
        assert_eq!(TimeUnit::parse_borrow_lossy("month"), TimeUnit::Day);
        assert_eq!(TimeUnit::parse_borrow_lossy("minute"), TimeUnit::Minute);
        assert!(!TimeUnit::Month.is_borrow_unit());
        assert!(TimeUnit::Hour.is_borrow_unit());
    }

    #[test]
    fn strict_parse_rejects_unknown() {
        assert_eq!(
            "week".parse::<TimeUnit>(),
            Err(TypeError::UnknownUnit("week".into()))
        );
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&TimeUnit::Month).unwrap(), "\"month\"");
    }

    proptest! {
        #[test]
        fn display_parses_back(idx in 0usize..4) {
            let unit = [TimeUnit::Minute, TimeUnit::Hour, TimeUnit::Day, TimeUnit::Month][idx];
            prop_assert_eq!(unit.to_string().parse::<TimeUnit>().unwrap(), unit);
        }
    }
}
