use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Measurement function of the meter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    DcVoltage,
    DcCurrent,
    Capacitance,
    Resistance,
    TemperatureRtd,
    TemperatureUnit,
    Frequency,
    Diode,
    Continuity,
}

impl Mode {
    pub const ALL: [Mode; 9] = [
        Mode::DcVoltage,
        Mode::DcCurrent,
        Mode::Capacitance,
        Mode::Resistance,
        Mode::TemperatureRtd,
        Mode::TemperatureUnit,
        Mode::Frequency,
        Mode::Diode,
        Mode::Continuity,
    ];

    /// SCPI command selecting this function, without terminator.
    pub fn command(&self) -> &'static str {
        match self {
            Mode::DcVoltage => "CONF:VOLT:DC AUTO",
            Mode::Capacitance => "CONF:CAP AUTO",
            Mode::DcCurrent => "CONF:CURR:DC AUTO",
            Mode::TemperatureRtd => "CONF:TEMP:RTD PT100",
            Mode::TemperatureUnit => "CONF:RTD:UNIT C",
            Mode::Resistance => "CONF:RES AUTO",
            Mode::Frequency => "CONF:FREQ",
            Mode::Diode => "CONF:DIOD",
            Mode::Continuity => "CONF:CONT",
        }
    }

    /// Unit of readings taken in this function.
    ///
    /// The meter never reports a unit, so this is derived from the
    /// configured function only.
    pub fn unit(&self) -> &'static str {
        match self {
            Mode::DcVoltage | Mode::Diode => "V",
            Mode::DcCurrent => "A",
            Mode::Capacitance => "F",
            Mode::Resistance | Mode::Continuity => "Ω",
            Mode::TemperatureRtd | Mode::TemperatureUnit => "°C",
            Mode::Frequency => "Hz",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::DcVoltage => f.write_str("DC Voltage"),
            Mode::DcCurrent => f.write_str("DC Current"),
            Mode::Capacitance => f.write_str("Capacitance"),
            Mode::Resistance => f.write_str("Resistance"),
            Mode::TemperatureRtd => f.write_str("Temperature (PT100)"),
            Mode::TemperatureUnit => f.write_str("Temperature unit °C"),
            Mode::Frequency => f.write_str("Frequency"),
            Mode::Diode => f.write_str("Diode"),
            Mode::Continuity => f.write_str("Continuity"),
        }
    }
}

impl clap::ValueEnum for Mode {
    fn value_variants<'a>() -> &'a [Self] {
        &Self::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::DcVoltage => clap::builder::PossibleValue::new("vdc"),
            Self::DcCurrent => clap::builder::PossibleValue::new("adc"),
            Self::Capacitance => clap::builder::PossibleValue::new("cap"),
            Self::Resistance => clap::builder::PossibleValue::new("res"),
            Self::TemperatureRtd => clap::builder::PossibleValue::new("temp"),
            Self::TemperatureUnit => clap::builder::PossibleValue::new("temp-unit"),
            Self::Frequency => clap::builder::PossibleValue::new("freq"),
            Self::Diode => clap::builder::PossibleValue::new("diode"),
            Self::Continuity => clap::builder::PossibleValue::new("cont"),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    Id,
    Configure(Mode),
    Measure,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Id => "*IDN?",
            Command::Configure(mode) => mode.command(),
            Command::Measure => "MEAS:SHOW?",
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_follow_mode() {
        assert_eq!(Mode::DcVoltage.unit(), "V");
        assert_eq!(Mode::Diode.unit(), "V");
        assert_eq!(Mode::Continuity.unit(), "Ω");
        assert_eq!(Mode::Frequency.unit(), "Hz");
    }
}
