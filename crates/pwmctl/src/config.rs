use std::ops::RangeInclusive;

use pwmctl_core::error::ConfigError;
use pwmctl_devices::devices::pca9685::Pca9685DeviceConfig;
use pwmctl_i2c::bus_index;
use serde::Deserialize;

#[derive(Deserialize, Debug, Default)]
pub struct PwmctlMetadataConfig {
    pub name: Option<String>,
    pub description: Option<String>,
}

///Candidate bus numbers. `buses` lists the ones that exist and the configured bus must be one of them.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct BusRangeConfig {
    pub first: u8,
    pub last: u8,
}

impl Default for BusRangeConfig {
    fn default() -> Self {
        Self { first: 0, last: 6 }
    }
}

impl BusRangeConfig {
    pub fn range(&self) -> RangeInclusive<u8> {
        self.first..=self.last
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct PwmctlConfig {
    #[serde(default)]
    pub metadata: PwmctlMetadataConfig,
    #[serde(default)]
    pub bus_range: BusRangeConfig,
    #[serde(default)]
    pub device: Pca9685DeviceConfig,
}

impl PwmctlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();

        if self.bus_range.first > self.bus_range.last {
            errs.push(ConfigError::from_string(format!(
                "bus_range is empty: first {} is after last {}",
                self.bus_range.first, self.bus_range.last
            )));
        }
        match bus_index(&self.device.bus) {
            Some(bus) if self.bus_range.range().contains(&bus) => {}
            Some(bus) => errs.push(ConfigError::from_string(format!(
                "bus {} is outside bus_range {}..={}",
                bus, self.bus_range.first, self.bus_range.last
            ))),
            None => errs.push(ConfigError::from_string(format!(
                "\"{}\" is not an I2C bus path",
                self.device.bus
            ))),
        }
        if let Err(err) = self.device.validate() {
            errs.push(err);
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::from_errs(errs))
        }
    }
}
