use embedded_hal::delay::DelayNs;
use pwmctl_core::{error::DriverError, PWM_MAX};
use pwmctl_i2c::{BusDevice, BusProvider};
use tracing::{debug, info, warn};

use registers::{mode1, mode2};

//datasheet register map
pub mod registers;

//async per channel outputs around a shared driver
pub mod device;

pub use device::{ChannelConfig, Pca9685Device, Pca9685DeviceConfig};

///Wait after a mode register write that may have toggled SLEEP. The oscillator needs 500us; 2ms leaves margin.
pub const SETTLE_DELAY_US: u32 = 2_000;

///Where the driver is currently connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub bus_path: String,
    pub address: u8,
}

///Saturates `value` into the 12 bit tick range.
pub fn clamp_ticks(value: i32) -> u16 {
    value.clamp(0, i32::from(PWM_MAX)) as u16
}

///Prescale for an output frequency, after clamping it to the oscillator's 24..=1526 Hz.
///
/// `floor(25MHz / (4096 * f) - 1)`, so 60 Hz gives 100 and 200 Hz gives 29. NaN is treated as the lowest frequency.
pub fn prescale_for(frequency_hz: f32) -> u8 {
    let frequency = if frequency_hz.is_nan() {
        registers::FREQUENCY_MIN_HZ
    } else {
        frequency_hz.clamp(registers::FREQUENCY_MIN_HZ, registers::FREQUENCY_MAX_HZ)
    };
    let prescale = (registers::OSC_CLOCK_HZ / (registers::PWM_STEPS * f64::from(frequency)) - 1.0)
        .floor();
    prescale.clamp(
        f64::from(registers::PRESCALE_MIN),
        f64::from(registers::PRESCALE_MAX),
    ) as u8
}

///Output frequency the chip produces for a given prescale.
pub fn frequency_for_prescale(prescale: u8) -> f64 {
    registers::OSC_CLOCK_HZ / (registers::PWM_STEPS * (f64::from(prescale) + 1.0))
}

///Driver for one PCA9685 on one I2C bus.
///
/// The driver exclusively owns its `BusDevice`; dropping the driver closes the bus. It does no locking of its own, so share it behind a single mutex (see `Pca9685Device`).
pub struct Pca9685<P: BusProvider, D> {
    device: BusDevice<P>,
    delay: D,
    connection: Option<Connection>,
}

impl<P, D> Pca9685<P, D>
where
    P: BusProvider,
    D: DelayNs,
{
    pub fn new(provider: P, delay: D) -> Self {
        Self {
            device: BusDevice::new(provider),
            delay,
            connection: None,
        }
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && self.device.is_connected()
    }

    ///Connects to the chip at the 7 bit `address` on `bus_path`, disconnecting any previous connection first.
    pub fn connect(&mut self, bus_path: &str, address: u8) -> Result<(), DriverError> {
        if self.is_connected() {
            //the chip being left behind may no longer answer; only a failed release stops the new connection
            if let Err(err) = self.set_all_channels(0, 0) {
                warn!("could not silence previous PCA9685 before reconnecting: {}", err);
            }
        }
        if self.device.is_open() {
            self.close()?;
        }
        self.device.open_device(bus_path, address)?;
        self.connection = Some(Connection {
            bus_path: bus_path.to_string(),
            address,
        });
        info!("connected to PCA9685 {:#04x} on bus {}", address, bus_path);
        Ok(())
    }

    ///Releases the bus. The driver counts as disconnected afterwards even if the release reported an error.
    pub fn close(&mut self) -> Result<(), DriverError> {
        let result = self.device.close();
        if let Some(connection) = self.connection.take() {
            debug!(
                "closed PCA9685 {:#04x} on bus {}",
                connection.address, connection.bus_path
            );
        }
        result
    }

    ///Silences every output, then closes.
    ///
    /// Silencing is best effort: a close failure always wins, a silencing failure is returned only if the close succeeded and there was a connection to silence.
    pub fn disconnect(&mut self) -> Result<(), DriverError> {
        let silenced = self.set_all_channels(0, 0);
        if let Err(ref err) = silenced {
            if *err != DriverError::NotConnected {
                warn!("could not silence PCA9685 outputs before disconnecting: {}", err);
            }
        }
        self.close()?;
        match silenced {
            Err(DriverError::NotConnected) => Ok(()),
            other => other,
        }
    }

    ///Puts both mode registers back to their defaults: oscillator running, all call enabled, totem pole non inverted outputs updating on STOP.
    pub fn reset(&mut self) -> Result<(), DriverError> {
        self.device.write_register(registers::MODE1, mode1::ALLCALL)?;
        self.device.write_register(registers::MODE2, mode2::OUTDRV)?;
        self.delay.delay_us(SETTLE_DELAY_US);
        debug!("reset PCA9685 mode registers");
        Ok(())
    }

    ///Reprograms the pwm frequency.
    ///
    /// PRE_SCALE is only writable while the oscillator sleeps, so this puts the chip to sleep, writes the prescale, wakes it with every other MODE1 bit as it was, waits for the oscillator and then restarts the pwm outputs.
    pub fn set_frequency(&mut self, frequency_hz: f32) -> Result<(), DriverError> {
        let prescale = prescale_for(frequency_hz);
        let mode = self.device.read_register(registers::MODE1)?;
        //writing 0 to RESTART has no effect, so masking it leaves the chip's state alone
        let awake = mode & !(mode1::SLEEP | mode1::RESTART);

        self.device
            .write_register(registers::MODE1, awake | mode1::SLEEP)?;
        self.device.write_register(registers::PRE_SCALE, prescale)?;
        self.device.write_register(registers::MODE1, awake)?;
        self.delay.delay_us(SETTLE_DELAY_US);
        self.device
            .write_register(registers::MODE1, awake | mode1::RESTART)?;

        debug!(
            "PCA9685 frequency set to {:.3} Hz (requested {} Hz, prescale {})",
            frequency_for_prescale(prescale),
            frequency_hz,
            prescale
        );
        Ok(())
    }

    ///Sets the on and off tick of one channel. Ticks outside 0..=4095 are saturated.
    ///
    /// The four registers are written one transaction at a time; a failure part way leaves the channel half updated.
    pub fn set_channel(&mut self, channel: i32, on: i32, off: i32) -> Result<(), DriverError> {
        let channel = channel_index(channel)?;
        self.write_block(registers::led_base(channel), on, off)
    }

    ///Sets the on and off tick of every channel at once through the ALL_LED registers.
    pub fn set_all_channels(&mut self, on: i32, off: i32) -> Result<(), DriverError> {
        self.write_block(registers::ALL_LED_ON_L, on, off)
    }

    ///Reads back a channel's `(on, off)` ticks. The full on / full off flags (bit 12) are not reported.
    pub fn channel(&mut self, channel: i32) -> Result<(u16, u16), DriverError> {
        let base = registers::led_base(channel_index(channel)?);
        let on_l = self.device.read_register(base)?;
        let on_h = self.device.read_register(base + 1)?;
        let off_l = self.device.read_register(base + 2)?;
        let off_h = self.device.read_register(base + 3)?;
        Ok((ticks_from_bytes(on_l, on_h), ticks_from_bytes(off_l, off_h)))
    }

    pub fn prescale(&mut self) -> Result<u8, DriverError> {
        self.device.read_register(registers::PRE_SCALE)
    }

    ///The output frequency currently programmed into the chip.
    pub fn frequency(&mut self) -> Result<f64, DriverError> {
        self.prescale().map(frequency_for_prescale)
    }

    ///Brings a freshly connected chip into a known state: default modes, the given frequency, all outputs off.
    pub fn initialize(&mut self, frequency_hz: f32) -> Result<(), DriverError> {
        self.reset()?;
        self.set_frequency(frequency_hz)?;
        self.set_all_channels(0, 0)
    }

    pub fn read_register(&mut self, register: u8) -> Result<u8, DriverError> {
        self.device.read_register(register)
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), DriverError> {
        self.device.write_register(register, value)
    }

    fn write_block(&mut self, base: u8, on: i32, off: i32) -> Result<(), DriverError> {
        let on = clamp_ticks(on);
        let off = clamp_ticks(off);
        self.device.write_register(base, (on & 0xFF) as u8)?;
        self.device.write_register(base + 1, (on >> 8) as u8)?;
        self.device.write_register(base + 2, (off & 0xFF) as u8)?;
        self.device.write_register(base + 3, (off >> 8) as u8)
    }
}

fn channel_index(channel: i32) -> Result<u8, DriverError> {
    match u8::try_from(channel) {
        Ok(index) if index < registers::CHANNEL_COUNT => Ok(index),
        _ => Err(DriverError::InvalidChannel(i64::from(channel))),
    }
}

fn ticks_from_bytes(low: u8, high: u8) -> u16 {
    ((u16::from(high) << 8) | u16::from(low)) & PWM_MAX
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use embedded_hal::delay::DelayNs;
    use pwmctl_i2c::sim::SimProvider;

    use super::Pca9685;

    pub const BUS: &str = "/dev/i2c-1";
    pub const ADDRESS: u8 = 0x40;

    ///Records every requested delay instead of sleeping.
    #[derive(Clone, Default)]
    pub struct RecordingDelay {
        pub total_ns: Arc<Mutex<u64>>,
    }

    impl RecordingDelay {
        pub fn total_us(&self) -> u64 {
            *self.total_ns.lock().unwrap() / 1_000
        }
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            *self.total_ns.lock().unwrap() += u64::from(ns);
        }
    }

    pub fn sim() -> SimProvider {
        SimProvider::new().with_bus(BUS).with_device(ADDRESS)
    }

    pub fn driver(sim: &SimProvider) -> (Pca9685<SimProvider, RecordingDelay>, RecordingDelay) {
        let delay = RecordingDelay::default();
        (Pca9685::new(sim.clone(), delay.clone()), delay)
    }
}
