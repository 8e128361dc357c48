//! Observation domain shared by the ingest and query paths.
//!
//! The upstream quality-controlled files reserve a numeric sentinel to
//! mean "no reading". That value is stored verbatim by the loader and
//! must be excluded wherever a channel is ranked or aggregated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream marker for a missing sensor reading.
///
/// Inherited from the AMRDC file format; if the sentinel ever collides
/// with a legitimate reading the data owners need to be told before
/// this constant changes.
pub const MISSING_SENTINEL: f64 = 444.0;

/// Name of the observation table in the store.
pub const OBSERVATION_TABLE: &str = "aws_10min";

/// The six sensor channels of a 10-minute observation.
///
/// This enum is the only path from request input to a column name:
/// queries must never interpolate caller-controlled identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    Pressure,
    WindSpeed,
    WindDirection,
    Humidity,
    DeltaT,
}

impl Variable {
    /// All channels in store column order.
    pub const ALL: [Variable; 6] = [
        Variable::Temperature,
        Variable::Pressure,
        Variable::WindSpeed,
        Variable::WindDirection,
        Variable::Humidity,
        Variable::DeltaT,
    ];

    /// The store column this channel maps to.
    pub fn column(&self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::Pressure => "pressure",
            Variable::WindSpeed => "wind_speed",
            Variable::WindDirection => "wind_direction",
            Variable::Humidity => "humidity",
            Variable::DeltaT => "delta_t",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unknown variable '{0}', expected one of: temperature, pressure, wind_speed, wind_direction, humidity, delta_t")]
pub struct InvalidVariable(pub String);

impl FromStr for Variable {
    type Err = InvalidVariable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(Variable::Temperature),
            "pressure" => Ok(Variable::Pressure),
            "wind_speed" => Ok(Variable::WindSpeed),
            "wind_direction" => Ok(Variable::WindDirection),
            "humidity" => Ok(Variable::Humidity),
            "delta_t" => Ok(Variable::DeltaT),
            other => Err(InvalidVariable(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_allowed_variable() {
        for variable in Variable::ALL {
            let parsed: Variable = variable.column().parse().expect("allow-listed");
            assert_eq!(parsed, variable);
        }
    }

    #[test]
    fn rejects_unknown_variable() {
        let err = "humidity2".parse::<Variable>().unwrap_err();
        assert_eq!(err.0, "humidity2");
    }

    #[test]
    fn rejects_sql_fragment() {
        assert!("temperature; DROP TABLE aws_10min".parse::<Variable>().is_err());
    }
}
