use std::fmt;

use crate::error::ThresholdError;

/// Bounds a value must stay within. `min < max` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    min: f64,
    max: f64,
}

impl AlertThresholds {
    /// Builds thresholds, pushing `max` to `min + 1` when it is not above `min`.
    ///
    /// Where `min + 1` rounds back to `min`, `max` becomes the next
    /// representable value above `min` instead. NaN and infinite bounds are
    /// rejected.
    pub fn new(min: f64, max: f64) -> Result<Self, ThresholdError> {
        for (name, value) in [("min", min), ("max", max)] {
            if !value.is_finite() {
                return Err(ThresholdError::NonFinite { name, value });
            }
        }

        let max = if min < max {
            max
        } else if min + 1.0 > min {
            min + 1.0
        } else {
            min.next_up()
        };

        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn evaluate(&self, value: f64) -> AlertState {
        if value < self.min || value > self.max {
            AlertState::OutOfRange
        } else {
            AlertState::Normal
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min: 15.0,
            max: 30.0,
        }
    }
}

impl fmt::Display for AlertThresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Normal,
    OutOfRange,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Normal => "normal",
            AlertState::OutOfRange => "out of range",
        }
    }
}
