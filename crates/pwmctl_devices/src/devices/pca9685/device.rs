use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use embedded_hal::delay::DelayNs;
use futures::future::join_all;
use pwmctl_core::{
    error::{ConfigError, DriverError},
    range::{Direction, PwmRange},
    Output,
};
use pwmctl_i2c::{BusProvider, SlaveAddress};
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{registers::CHANNEL_COUNT, Pca9685};

fn default_bus() -> String {
    "/dev/i2c-1".to_string()
}

fn default_address() -> u8 {
    0x40
}

fn default_frequency() -> f32 {
    60.0
}

//one named pwm output
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub channel: u8,
    #[serde(default)]
    pub range: PwmRange,
    ///Normalized value applied right after the chip is initialized. Without it the channel stays silent.
    pub start: Option<f64>,
}

//system level config -- corresponds to 1 pwm chip instance
#[derive(Debug, Clone, Deserialize)]
pub struct Pca9685DeviceConfig {
    #[serde(default = "default_bus")]
    pub bus: String,
    #[serde(default = "default_address")]
    pub i2c_address: u8,
    ///Datasheet style 8 bit write address (e.g. 0x80). Takes precedence over `i2c_address` when set.
    #[serde(default)]
    pub i2c_write_address: Option<u8>,
    #[serde(default = "default_frequency")]
    pub frequency_hz: f32,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
}

impl Default for Pca9685DeviceConfig {
    fn default() -> Self {
        Self {
            bus: default_bus(),
            i2c_address: default_address(),
            i2c_write_address: None,
            frequency_hz: default_frequency(),
            channels: HashMap::new(),
        }
    }
}

impl Pca9685DeviceConfig {
    ///The 7 bit address the chip is selected with.
    pub fn address(&self) -> u8 {
        match self.i2c_write_address {
            Some(write) => SlaveAddress::from_write_address(write).value(),
            None => self.i2c_address,
        }
    }

    ///Checks everything that can be checked without touching the bus, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();

        match self.i2c_write_address {
            Some(write) if write & 1 != 0 => errs.push(ConfigError::from_string(format!(
                "i2c_write_address {:#04x} has the read bit set",
                write
            ))),
            Some(_) => {}
            None => {
                if SlaveAddress::new(self.i2c_address).is_none() {
                    errs.push(ConfigError::from_string(format!(
                        "i2c_address {:#04x} is not a 7 bit address",
                        self.i2c_address
                    )));
                }
            }
        }
        if !self.frequency_hz.is_finite() {
            errs.push(ConfigError::from_string(format!(
                "frequency_hz must be a finite number, got {}",
                self.frequency_hz
            )));
        }

        let mut names: Vec<&String> = self.channels.keys().collect();
        names.sort();
        for name in names {
            let cfg = &self.channels[name];
            if cfg.channel >= CHANNEL_COUNT {
                errs.push(ConfigError::from_string(format!(
                    "channel \"{}\": {} is not a PCA9685 channel, expected 0 to 15",
                    name, cfg.channel
                )));
            }
            if let Err(err) = cfg.range.validate() {
                errs.push(err.context(&format!("channel \"{}\"", name)));
            }
            if let Some(start) = cfg.start {
                if !(0.0..=1.0).contains(&start) {
                    errs.push(ConfigError::from_string(format!(
                        "channel \"{}\": start value {} is outside 0 to 1",
                        name, start
                    )));
                }
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::from_errs(errs))
        }
    }
}

//connected pwm chip instance
pub struct Pca9685Device<P: BusProvider, D> {
    pub join_handle: JoinHandle<()>,
    pub channels: HashMap<String, Output<f64>>,
    driver: Arc<Mutex<Pca9685<P, D>>>,
}

impl<P, D> Pca9685Device<P, D>
where
    P: BusProvider + Send + 'static,
    P::Bus: Send + 'static,
    D: DelayNs + Send + 'static,
{
    ///Connects `driver` as configured, initializes the chip, applies start values and spawns one output task per channel.
    ///
    /// Once every channel's `Output` is dropped the tasks finish and `join_handle` silences and closes the chip.
    pub async fn build(
        config: &Pca9685DeviceConfig,
        mut driver: Pca9685<P, D>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        driver.connect(&config.bus, config.address())?;
        driver.initialize(config.frequency_hz)?;
        for (name, cfg) in &config.channels {
            if let Some(start) = cfg.start {
                let (ticks, _) = apply_output(&mut driver, name, cfg, start)?;
                info!("{} (channel {}) starts at {} ticks", name, cfg.channel, ticks);
            }
        }

        let driver = Arc::new(Mutex::new(driver));

        let mut channels = HashMap::with_capacity(config.channels.len());
        let mut join_handles: Vec<JoinHandle<()>> = Vec::with_capacity(config.channels.len());
        for (name, cfg) in &config.channels {
            let (output, rx) = Output::new();
            join_handles.push(spawn_pca_output_task(
                driver.clone(),
                name.clone(),
                cfg.clone(),
                rx,
            ));
            channels.insert(name.clone(), output);
        }

        let shutdown_driver = driver.clone();
        let join_handle = tokio::spawn(async move {
            join_all(join_handles).await;
            match lock(&shutdown_driver).disconnect() {
                Ok(()) => info!("PCA9685 outputs done, chip silenced and closed"),
                Err(err) => error!("error shutting down PCA9685: {}", err),
            }
        });

        Ok(Self {
            join_handle,
            channels,
            driver,
        })
    }

    ///Shared handle to the driver, for chip level commands alongside the channel outputs.
    pub fn driver(&self) -> Arc<Mutex<Pca9685<P, D>>> {
        self.driver.clone()
    }

    pub fn output(&self, name: &str) -> Option<&Output<f64>> {
        self.channels.get(name)
    }
}

///Locks the driver, recovering it if a task panicked while holding the lock.
pub fn lock<P: BusProvider, D>(driver: &Mutex<Pca9685<P, D>>) -> MutexGuard<'_, Pca9685<P, D>> {
    match driver.lock() {
        Ok(driver) => driver,
        Err(poisoned) => poisoned.into_inner(),
    }
}

///Maps `value` through the channel's range and writes it, returning the ticks and which side of the range's midpoint they fall on.
pub fn apply_output<P, D>(
    driver: &mut Pca9685<P, D>,
    name: &str,
    cfg: &ChannelConfig,
    value: f64,
) -> Result<(u16, Direction), DriverError>
where
    P: BusProvider,
    D: DelayNs,
{
    let ticks = cfg.range.ticks(value);
    driver.set_channel(i32::from(cfg.channel), 0, i32::from(ticks))?;
    let direction = cfg.range.direction(ticks);
    debug!("{} -> {} ticks ({:?})", name, ticks, direction);
    Ok((ticks, direction))
}

//pwm float output associated with a channel (pin) on a Pca9685Device
//values in [0.0, 1.0] are mapped across the channel's tick range
fn spawn_pca_output_task<P, D>(
    driver: Arc<Mutex<Pca9685<P, D>>>,
    name: String,
    cfg: ChannelConfig,
    mut rx: mpsc::Receiver<f64>,
) -> JoinHandle<()>
where
    P: BusProvider + Send + 'static,
    P::Bus: Send + 'static,
    D: DelayNs + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            if value.is_nan() {
                warn!("ignoring NaN for PCA9685 output {}", name);
                continue;
            }
            if let Err(err) = apply_output(&mut *lock(&driver), &name, &cfg, value) {
                error!("error setting PCA9685 output {}! {}", name, err);
            }
        }
        info!("PCA9685 output {} (channel {}) shutting down.", name, cfg.channel);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::pca9685::{
        registers::{led_base, ALL_LED_OFF_H, PRE_SCALE},
        testing::{driver, sim, RecordingDelay, ADDRESS, BUS},
    };
    use pwmctl_i2c::sim::{SimProvider, SimTransaction};

    fn channel(channel: u8, min: u16, max: u16, start: Option<f64>) -> ChannelConfig {
        ChannelConfig {
            channel,
            range: PwmRange::new(min, max, false).unwrap(),
            start,
        }
    }

    fn config(channels: Vec<(&str, ChannelConfig)>) -> Pca9685DeviceConfig {
        Pca9685DeviceConfig {
            channels: channels
                .into_iter()
                .map(|(name, cfg)| (name.to_string(), cfg))
                .collect(),
            ..Default::default()
        }
    }

    fn off_ticks(sim: &SimProvider, channel: u8) -> u16 {
        let base = led_base(channel);
        (u16::from(sim.register(ADDRESS, base + 3)) << 8) | u16::from(sim.register(ADDRESS, base + 2))
    }

    async fn build(
        sim: &SimProvider,
        cfg: &Pca9685DeviceConfig,
    ) -> Pca9685Device<SimProvider, RecordingDelay> {
        let (pca, _) = driver(sim);
        match Pca9685Device::build(cfg, pca).await {
            Ok(dev) => dev,
            Err(err) => panic!("build failed: {:?}", err),
        }
    }

    #[test]
    fn defaults() {
        let cfg = Pca9685DeviceConfig::default();
        assert_eq!(cfg.bus, BUS);
        assert_eq!(cfg.i2c_address, ADDRESS);
        assert_eq!(cfg.i2c_write_address, None);
        assert_eq!(cfg.address(), ADDRESS);
        assert_eq!(cfg.frequency_hz, 60.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut cfg = config(vec![
            ("a", channel(16, 0, 4095, None)),
            ("b", ChannelConfig {
                channel: 2,
                range: PwmRange { min: 500, max: 100, inverted: false },
                start: Some(2.0),
            }),
        ]);
        cfg.i2c_address = 0x80;
        cfg.frequency_hz = f32::NAN;
        match cfg.validate() {
            Err(ConfigError::Messages(msgs)) => assert_eq!(msgs.len(), 5, "{:?}", msgs),
            other => panic!("expected multiple messages, got {:?}", other),
        }
    }

    #[test]
    fn write_address_overrides_the_7_bit_address() {
        let mut cfg = Pca9685DeviceConfig {
            i2c_address: 0x7F,
            i2c_write_address: Some(0x82),
            ..Default::default()
        };
        assert_eq!(cfg.address(), 0x41);
        assert!(cfg.validate().is_ok());

        //an out of range i2c_address is not used, so it is not reported
        cfg.i2c_address = 0xFF;
        assert!(cfg.validate().is_ok());

        cfg.i2c_write_address = Some(0x81);
        let msgs = cfg.validate().err().map(ConfigError::into_messages).unwrap_or_default();
        assert_eq!(msgs.len(), 1, "{:?}", msgs);
        assert!(msgs[0].contains("0x81"), "{}", msgs[0]);
    }

    #[tokio::test]
    async fn build_selects_the_write_address() {
        let sim = SimProvider::new().with_bus(BUS).with_device(0x41);
        let cfg = Pca9685DeviceConfig {
            i2c_write_address: Some(0x82),
            ..Default::default()
        };
        let dev = build(&sim, &cfg).await;

        assert!(sim
            .transactions()
            .contains(&SimTransaction::Select { address: 0x41 }));
        let connection = super::lock(&dev.driver()).connection().cloned();
        assert_eq!(connection.map(|c| c.address), Some(0x41));
    }

    #[tokio::test]
    async fn build_initializes_and_applies_start_values() {
        let sim = sim();
        let cfg = config(vec![
            ("pan", channel(0, 200, 400, Some(0.5))),
            ("light", channel(5, 0, 4095, None)),
        ]);
        let dev = build(&sim, &cfg).await;

        assert_eq!(sim.register(ADDRESS, PRE_SCALE), 100);
        assert_eq!(off_ticks(&sim, 0), 300);
        assert_eq!(off_ticks(&sim, 5), 0);
        assert!(dev.output("pan").is_some());
        assert!(dev.output("tilt").is_none());
        assert!(super::lock(&dev.driver()).is_connected());
    }

    #[tokio::test]
    async fn outputs_drive_their_channels() {
        let sim = sim();
        let cfg = config(vec![
            ("pan", channel(0, 200, 400, None)),
            ("tilt", channel(1, 0, 4095, None)),
        ]);
        let dev = build(&sim, &cfg).await;

        dev.output("pan").unwrap().sink().send(1.0).await.unwrap();
        dev.output("tilt").unwrap().sink().send(0.5).await.unwrap();
        dev.output("tilt").unwrap().sink().send(f64::NAN).await.unwrap();

        let Pca9685Device { join_handle, channels, .. } = dev;
        drop(channels);
        join_handle.await.unwrap();

        let writes = sim.writes();
        assert!(writes.contains(&(led_base(0) + 2, (400 & 0xFF) as u8)));
        assert!(writes.contains(&(led_base(1) + 3, (2048 >> 8) as u8)));
        //last thing to happen is silencing all outputs then closing
        assert_eq!(writes.last(), Some(&(ALL_LED_OFF_H, 0)));
        assert_eq!(
            sim.transactions().last(),
            Some(&SimTransaction::Close { path: BUS.to_string() })
        );
        assert_eq!(sim.open_handles(), 0);
    }

    #[tokio::test]
    async fn output_errors_do_not_stop_the_task() {
        let sim = sim();
        let cfg = config(vec![("pan", channel(0, 0, 4095, None))]);
        let dev = build(&sim, &cfg).await;
        let sink = dev.output("pan").unwrap().sink();

        sim.clear_transactions();
        sim.fail_transfers_after(0);
        sink.send(0.25).await.unwrap();
        //failed transfers are still logged
        while sim.writes().is_empty() {
            tokio::task::yield_now().await;
        }
        sim.restore_transfers();
        sink.send(1.0).await.unwrap();

        drop(sink);
        let Pca9685Device { join_handle, channels, .. } = dev;
        drop(channels);
        join_handle.await.unwrap();
        assert!(sim.writes().contains(&(led_base(0) + 3, 0x0F)));
    }

    #[test]
    fn applied_values_report_their_direction() {
        let sim = sim();
        let (mut pca, _) = driver(&sim);
        pca.connect(BUS, ADDRESS).unwrap();
        let steer = ChannelConfig {
            channel: 3,
            range: PwmRange::new(200, 400, false).unwrap(),
            start: None,
        };
        let inverted = ChannelConfig {
            range: PwmRange::new(200, 400, true).unwrap(),
            ..steer.clone()
        };

        assert_eq!(
            apply_output(&mut pca, "steer", &steer, 0.5),
            Ok((300, Direction::Neutral))
        );
        assert_eq!(
            apply_output(&mut pca, "steer", &steer, 1.0),
            Ok((400, Direction::Positive))
        );
        assert_eq!(off_ticks(&sim, 3), 400);
        assert_eq!(
            apply_output(&mut pca, "steer", &inverted, 1.0),
            Ok((200, Direction::Positive))
        );
        assert_eq!(
            apply_output(&mut pca, "steer", &inverted, 0.0),
            Ok((400, Direction::Negative))
        );
        assert_eq!(off_ticks(&sim, 3), 400);

        sim.fail_transfers_after(0);
        assert!(matches!(
            apply_output(&mut pca, "steer", &steer, 0.0),
            Err(DriverError::TransferFailed { .. })
        ));
    }

    #[tokio::test]
    async fn build_fails_on_a_missing_bus() {
        let sim = SimProvider::new().with_device(ADDRESS);
        let (pca, _) = driver(&sim);
        let result = Pca9685Device::build(&Pca9685DeviceConfig::default(), pca).await;
        match result {
            Err(ConfigError::Message(msg)) => assert!(msg.contains("/dev/i2c-1"), "{}", msg),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("built without a bus"),
        }
    }

    #[tokio::test]
    async fn invalid_config_never_opens_the_bus() {
        let sim = sim();
        let (pca, _) = driver(&sim);
        let cfg = config(vec![("x", channel(20, 0, 4095, None))]);
        assert!(Pca9685Device::build(&cfg, pca).await.is_err());
        assert!(sim.transactions().is_empty());
    }
}
