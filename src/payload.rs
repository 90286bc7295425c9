//! Measurement payload codec.
//!
//! Readings travel as plain strings such as `"70°C"` or `"65.5 °C"`: a decimal
//! number followed by a unit token.

use std::fmt;

use crate::error::{Result, WatchdogError};

/// The only unit accepted for threshold comparison.
pub const CELSIUS: &str = "°C";

/// A decoded numeric value with its unit token.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub unit: String,
}

impl Measurement {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    pub fn celsius(value: f64) -> Self {
        Self::new(value, CELSIUS)
    }

    /// Return the value if the unit is Celsius.
    ///
    /// A missing unit is a malformed payload; any other unit decodes fine but
    /// cannot be compared against the threshold.
    pub fn into_celsius(self) -> Result<f64> {
        if self.unit.is_empty() {
            return Err(WatchdogError::MalformedPayload(format!(
                "missing unit after {}",
                self.value
            )));
        }
        if self.unit != CELSIUS {
            return Err(WatchdogError::UnrecognizedUnit(self.unit));
        }
        Ok(self.value)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// Decode a payload into a value and unit.
///
/// Digits and decimal points form the number; everything else, trimmed, is
/// the unit.
pub fn decode(payload: &str) -> Result<Measurement> {
    let (numeric, unit): (String, String) = payload
        .chars()
        .partition(|c| c.is_ascii_digit() || *c == '.');

    if numeric.is_empty() {
        return Err(WatchdogError::MalformedPayload(format!(
            "no numeric value in '{}'",
            payload
        )));
    }

    let value: f64 = numeric
        .parse()
        .map_err(|e| WatchdogError::MalformedPayload(format!("'{}': {}", payload, e)))?;

    Ok(Measurement::new(value, unit.trim()))
}

/// Render a value and unit in wire form.
pub fn encode(value: f64, unit: &str) -> String {
    format!("{}{}", value, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_celsius() {
        let m = decode("70°C").unwrap();
        assert_eq!(m.value, 70.0);
        assert_eq!(m.unit, CELSIUS);
    }

    #[test]
    fn test_decode_fraction_with_space() {
        let m = decode("65.5 °C").unwrap();
        assert_eq!(m.value, 65.5);
        assert_eq!(m.unit, CELSIUS);
    }

    #[test]
    fn test_decode_without_unit() {
        let m = decode("42").unwrap();
        assert_eq!(m.value, 42.0);
        assert!(m.unit.is_empty());
    }

    #[test]
    fn test_decode_other_unit() {
        let m = decode("1200RPM").unwrap();
        assert_eq!(m.value, 1200.0);
        assert_eq!(m.unit, "RPM");
    }

    #[test]
    fn test_decode_rejects_missing_number() {
        assert!(matches!(
            decode("°C"),
            Err(WatchdogError::MalformedPayload(_))
        ));
        assert!(matches!(decode(""), Err(WatchdogError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_rejects_unparsable_number() {
        assert!(matches!(
            decode("1.2.3°C"),
            Err(WatchdogError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_encode_natural_representation() {
        assert_eq!(encode(70.0, CELSIUS), "70°C");
        assert_eq!(encode(65.25, CELSIUS), "65.25°C");
        assert_eq!(Measurement::celsius(50.0).to_string(), "50°C");
    }

    #[test]
    fn test_round_trip() {
        for value in [0.0, 1.5, 65.0, 70.125, 99.99, 1234.5678] {
            let decoded = decode(&encode(value, CELSIUS)).unwrap();
            assert_eq!(decoded, Measurement::celsius(value));
        }
    }

    #[test]
    fn test_into_celsius() {
        assert_eq!(Measurement::celsius(21.0).into_celsius().unwrap(), 21.0);
        assert!(matches!(
            Measurement::new(70.0, "°F").into_celsius(),
            Err(WatchdogError::UnrecognizedUnit(unit)) if unit == "°F"
        ));
        assert!(matches!(
            Measurement::new(70.0, "").into_celsius(),
            Err(WatchdogError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_sign_is_part_of_unit() {
        let m = decode("-5°C").unwrap();
        assert_eq!(m.value, 5.0);
        assert_eq!(m.unit, "-°C");
    }
}
