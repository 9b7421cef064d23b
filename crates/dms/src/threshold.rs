//! Context-sensitive eye-closure allowance

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DmsError;

/// Below this speed the vehicle is presumed parked
pub const PARKED_SPEED_KMH: f64 = 15.0;

/// Weather condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Weather {
    #[default]
    Clear,
    Fog,
    Rain,
    Storm,
}

impl Weather {
    /// Poor visibility or traction
    pub fn is_adverse(&self) -> bool {
        !matches!(self, Weather::Clear)
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weather::Clear => "Clear",
            Weather::Fog => "Fog",
            Weather::Rain => "Rain",
            Weather::Storm => "Storm",
        };
        f.write_str(name)
    }
}

impl FromStr for Weather {
    type Err = DmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clear" => Ok(Weather::Clear),
            "fog" => Ok(Weather::Fog),
            "rain" => Ok(Weather::Rain),
            "storm" => Ok(Weather::Storm),
            other => Err(DmsError::Config(format!("unknown weather '{}'", other))),
        }
    }
}

/// Time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimePeriod {
    #[default]
    Day,
    Night,
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimePeriod::Day => "Day",
            TimePeriod::Night => "Night",
        })
    }
}

impl FromStr for TimePeriod {
    type Err = DmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(TimePeriod::Day),
            "night" => Ok(TimePeriod::Night),
            other => Err(DmsError::Config(format!("unknown time period '{}'", other))),
        }
    }
}

/// Driving context the allowance is computed from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdContext {
    /// Vehicle speed (km/h, >= 0)
    pub speed_kmh: f64,
    pub weather: Weather,
    pub time_period: TimePeriod,
}

impl Default for ThresholdContext {
    fn default() -> Self {
        Self {
            speed_kmh: 60.0,
            weather: Weather::Clear,
            time_period: TimePeriod::Day,
        }
    }
}

/// Allowed continuous eye closure in seconds before a drowsiness alert.
///
/// Infinite while parked; tightens with speed, at night and in bad weather.
pub fn closure_threshold(ctx: &ThresholdContext) -> f64 {
    let speed = ctx.speed_kmh;
    if speed < PARKED_SPEED_KMH {
        return f64::INFINITY;
    }

    let mut threshold = if speed < 40.0 {
        3.0
    } else if speed < 80.0 {
        2.0
    } else {
        1.5
    };

    if ctx.time_period == TimePeriod::Night {
        threshold *= 0.7;
    }
    if ctx.weather.is_adverse() {
        threshold *= 0.8;
    }

    threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(speed_kmh: f64, weather: Weather, time_period: TimePeriod) -> ThresholdContext {
        ThresholdContext {
            speed_kmh,
            weather,
            time_period,
        }
    }

    #[test]
    fn test_parked_disables_alerting() {
        assert_eq!(closure_threshold(&ctx(10.0, Weather::Clear, TimePeriod::Day)), f64::INFINITY);
        assert_eq!(closure_threshold(&ctx(0.0, Weather::Storm, TimePeriod::Night)), f64::INFINITY);
    }

    #[test]
    fn test_speed_bands() {
        assert_eq!(closure_threshold(&ctx(15.0, Weather::Clear, TimePeriod::Day)), 3.0);
        assert_eq!(closure_threshold(&ctx(39.9, Weather::Clear, TimePeriod::Day)), 3.0);
        assert_eq!(closure_threshold(&ctx(40.0, Weather::Clear, TimePeriod::Day)), 2.0);
        assert_eq!(closure_threshold(&ctx(79.9, Weather::Clear, TimePeriod::Day)), 2.0);
        assert_eq!(closure_threshold(&ctx(80.0, Weather::Clear, TimePeriod::Day)), 1.5);
    }

    #[test]
    fn test_night_and_storm_tighten() {
        let t = closure_threshold(&ctx(90.0, Weather::Storm, TimePeriod::Night));
        assert!((t - 0.84).abs() < 1e-9);

        let t = closure_threshold(&ctx(60.0, Weather::Fog, TimePeriod::Day));
        assert!((t - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("RAIN".parse::<Weather>().unwrap(), Weather::Rain);
        assert_eq!("night".parse::<TimePeriod>().unwrap(), TimePeriod::Night);
        assert!("snow".parse::<Weather>().is_err());
    }
}
