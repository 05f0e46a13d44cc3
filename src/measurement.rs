use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::proto::command::Mode;

/// Single reading as reported by `MEAS:SHOW?`.
///
/// The meter answers with plain text and never with a unit, so the value is
/// kept verbatim and the unit is taken from the function that was last
/// configured on this side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Response text, surrounding whitespace removed
    pub value: String,
    /// Function configured when the reading was taken, if known
    pub mode: Option<Mode>,
    /// Local time the response arrived
    pub taken: DateTime<Local>,
}

impl Reading {
    pub fn new(value: impl Into<String>, mode: Option<Mode>) -> Self {
        Self {
            value: value.into(),
            mode,
            taken: Local::now(),
        }
    }

    pub fn unit(&self) -> &'static str {
        self.mode.map(|m| m.unit()).unwrap_or("")
    }

    /// Value as number, `None` if the meter sent something else
    /// (overload markers, open leads, ...).
    pub fn numeric(&self) -> Option<f64> {
        self.value
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

/// SI prefix for a power of ten that is a multiple of 3.
pub fn unit_prefix(exp: i32) -> &'static str {
    match exp {
        -12 => "p",
        -9 => "n",
        -6 => "µ",
        -3 => "m",
        3 => "k",
        6 => "M",
        9 => "G",
        _ => "",
    }
}

/// Engineering exponent (multiple of 3, clamped to the prefixes above) for a value.
fn engineering_exp(value: f64) -> i32 {
    if value == 0.0 {
        return 0;
    }
    let exp = value.abs().log10().floor() as i32;
    (exp.div_euclid(3) * 3).clamp(-12, 9)
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !f.alternate() {
            // Just raw value
            return f.write_str(&self.value);
        }
        let prec = f.precision().unwrap_or(4);
        match self.numeric() {
            Some(value) => {
                let exp = engineering_exp(value);
                let scaled = value / 10_f64.powi(exp);
                f.write_fmt(format_args!(
                    "{:>10.prec$} {}{}",
                    scaled,
                    unit_prefix(exp),
                    self.unit()
                ))
            }
            None => f.write_fmt(format_args!("{:>10} {}", self.value, self.unit())),
        }
    }
}

/// Reading in a shape suitable for CSV rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenReading {
    pub taken: DateTime<Local>,
    pub mode: Option<Mode>,
    pub value: String,
    pub numeric: Option<f64>,
    pub unit: String,
}

impl From<Reading> for FlattenReading {
    fn from(value: Reading) -> Self {
        Self {
            numeric: value.numeric(),
            unit: value.unit().to_string(),
            taken: value.taken,
            mode: value.mode,
            value: value.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_reading() {
        let r = Reading::new("+1.2345E-01", Some(Mode::DcVoltage));
        assert_eq!(r.numeric(), Some(0.12345));
        assert_eq!(r.unit(), "V");
        assert_eq!(r.to_string(), "+1.2345E-01");
        assert_eq!(format!("{:#}", r), "  123.4500 mV");
    }

    #[test]
    fn test_non_numeric_reading() {
        let r = Reading::new("OL", Some(Mode::Resistance));
        assert_eq!(r.numeric(), None);
        assert_eq!(format!("{:#}", r), "        OL Ω");
    }

    #[test]
    fn test_reading_without_mode() {
        let r = Reading::new("0.0021", None);
        assert_eq!(r.unit(), "");
        assert_eq!(format!("{:#.1}", r), "       2.1 m");
    }

    #[test]
    fn test_engineering_exp() {
        assert_eq!(engineering_exp(0.0), 0);
        assert_eq!(engineering_exp(999.0), 0);
        assert_eq!(engineering_exp(1000.0), 3);
        assert_eq!(engineering_exp(-0.004), -3);
        assert_eq!(engineering_exp(2.2e-7), -9);
        assert_eq!(engineering_exp(1e15), 9);
    }
}
