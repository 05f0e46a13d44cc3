use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ProtoError;

/// One decoded unit of the response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Response line, terminator and surrounding whitespace removed
    Line(String),
    /// Bytes discarded because no terminator showed up in time
    Overflow(usize),
}

/// Fields of an `*IDN?` response.
///
/// The meter answers with `<manufacturer>,<model>,<serial>,<firmware...>`.
/// Only manufacturer and model are required, older firmwares leave out the
/// rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub manufacturer: String,
    pub model: String,
    pub serial: Option<String>,
    pub firmware: Option<String>,
}

impl FromStr for Ident {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<&str> = s.trim().splitn(4, ',').map(str::trim).collect();
        let non_empty = |v: Option<&&str>| v.filter(|v| !v.is_empty()).map(|v| v.to_string());
        match values.as_slice() {
            [manufacturer, model, ..] if !manufacturer.is_empty() && !model.is_empty() => {
                Ok(Self {
                    manufacturer: manufacturer.to_string(),
                    model: model.to_string(),
                    serial: non_empty(values.get(2)),
                    firmware: non_empty(values.get(3)),
                })
            }
            _ => Err(ProtoError::MalformedResponse(format!(
                "Invalid data for ID response: {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.manufacturer, self.model)?;
        if let Some(serial) = &self.serial {
            write!(f, " (S/N {})", serial)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_ident() {
        let id: Ident = "OWON,XDM1041,2118079,V3.7.2,2".parse().unwrap();
        assert_eq!(id.manufacturer, "OWON");
        assert_eq!(id.model, "XDM1041");
        assert_eq!(id.serial.as_deref(), Some("2118079"));
        assert_eq!(id.firmware.as_deref(), Some("V3.7.2,2"));
    }

    #[test]
    fn test_parse_short_ident() {
        let id: Ident = "OWON,XDM1042".parse().unwrap();
        assert_eq!(id.serial, None);
        assert_eq!(id.firmware, None);
        assert_eq!(id.to_string(), "OWON XDM1042");
    }

    #[test]
    fn test_parse_garbage_ident() {
        assert!(matches!(
            "XDM1041".parse::<Ident>(),
            Err(ProtoError::MalformedResponse(_))
        ));
        assert!(",".parse::<Ident>().is_err());
    }
}
