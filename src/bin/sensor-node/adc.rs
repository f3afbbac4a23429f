use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result, bail};

/// Full scale of the 14-bit converter.
pub const ADC_FULL_SCALE: u32 = 16384;

pub const VREF_V: f64 = 3.3;

const SERIES_RESISTOR_OHMS: f64 = 10_000.0;

// Steinhart-Hart coefficients for a common 10k NTC.
const STEINHART_A: f64 = 0.001129148;
const STEINHART_B: f64 = 0.000234125;
const STEINHART_C: f64 = 0.0000000876741;

const ABSOLUTE_ZERO_CELSIUS: f64 = -273.15;

pub fn read_raw(path: &Path) -> Result<u32> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read ADC file: {path:?}"))?;

    let raw: u32 = content
        .trim()
        .parse()
        .with_context(|| format!("failed to parse ADC value: {:?}", content.trim()))?;

    if raw >= ADC_FULL_SCALE {
        bail!("ADC value out of range: expected 0-{}, got {raw}", ADC_FULL_SCALE - 1);
    }

    Ok(raw)
}

pub fn voltage(raw: u32) -> f64 {
    raw as f64 * VREF_V / ADC_FULL_SCALE as f64
}

pub fn thermistor_celsius(raw: u32) -> f64 {
    if raw == 0 {
        return ABSOLUTE_ZERO_CELSIUS;
    }

    let resistance = SERIES_RESISTOR_OHMS * (ADC_FULL_SCALE as f64 / raw as f64 - 1.0);
    let ln_r = resistance.ln();
    let kelvin = 1.0 / (STEINHART_A + STEINHART_B * ln_r + STEINHART_C * ln_r.powi(3));

    kelvin + ABSOLUTE_ZERO_CELSIUS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midscale_is_room_temperature() {
        let t = thermistor_celsius(ADC_FULL_SCALE / 2);
        assert!((t - 25.0).abs() < 0.05, "got {t}");
    }

    #[test]
    fn zero_is_absolute_zero() {
        assert_eq!(thermistor_celsius(0), ABSOLUTE_ZERO_CELSIUS);
    }

    #[test]
    fn higher_count_is_colder() {
        assert!(thermistor_celsius(12000) < thermistor_celsius(4000));
    }

    #[test]
    fn voltage_scales_with_reference() {
        assert_eq!(voltage(0), 0.0);
        assert!((voltage(ADC_FULL_SCALE / 2) - VREF_V / 2.0).abs() < 1e-9);
    }

    #[test]
    fn reads_raw_value_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in_voltage13_raw");

        fs::write(&path, "8192\n").unwrap();
        assert_eq!(read_raw(&path).unwrap(), 8192);

        fs::write(&path, "16384\n").unwrap();
        assert!(read_raw(&path).is_err());

        fs::write(&path, "n/a\n").unwrap();
        assert!(read_raw(&path).is_err());

        assert!(read_raw(&dir.path().join("missing")).is_err());
    }
}
