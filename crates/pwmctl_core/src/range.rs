//!Mapping between normalized control values and pwm ticks.
use serde::Deserialize;

use crate::{error::ConfigError, PWM_MAX};

///Which side of its midpoint a value sits on, taking inversion into account.
///
/// For a drive channel `Positive` is forward, for a steering channel it is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Negative,
    Neutral,
    Positive,
}

///A usable window of pwm ticks for one output, e.g. the pulse widths a servo accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PwmRange {
    pub min: u16,
    pub max: u16,
    pub inverted: bool,
}

impl Default for PwmRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: PWM_MAX,
            inverted: false,
        }
    }
}

impl PwmRange {
    pub fn new(min: u16, max: u16, inverted: bool) -> Result<Self, ConfigError> {
        let range = Self { min, max, inverted };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min >= self.max {
            Err(ConfigError::from_string(format!(
                "pwm range must have min < max, got {}..{}",
                self.min, self.max
            )))
        } else if self.max > PWM_MAX {
            Err(ConfigError::from_string(format!(
                "pwm range max {} exceeds {}",
                self.max, PWM_MAX
            )))
        } else {
            Ok(())
        }
    }

    ///Ticks between min and max. A reversed range built by hand has no width.
    fn span(&self) -> u16 {
        self.max.saturating_sub(self.min)
    }

    pub fn midpoint(&self) -> u16 {
        self.span() / 2 + self.min
    }

    ///Maps `value` in [0, 1] onto [min, max]. Out of range and NaN inputs saturate.
    pub fn ticks(&self, value: f64) -> u16 {
        let value = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
        let value = if self.inverted { 1.0 - value } else { value };
        let span = f64::from(self.span());
        self.min + (value * span).round() as u16
    }

    pub fn direction(&self, ticks: u16) -> Direction {
        let mid = self.midpoint();
        if ticks == mid {
            Direction::Neutral
        } else if (ticks > mid) != self.inverted {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }
}
