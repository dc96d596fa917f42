//!PCA9685 register map and bit masks, as listed in the NXP datasheet (tables 4, 5 and 6).

///Mode register 1
pub const MODE1: u8 = 0x00;
///Mode register 2
pub const MODE2: u8 = 0x01;
///I2C-bus subaddress 1
pub const SUBADR1: u8 = 0x02;
///I2C-bus subaddress 2
pub const SUBADR2: u8 = 0x03;
///I2C-bus subaddress 3
pub const SUBADR3: u8 = 0x04;
///LED All Call I2C-bus address
pub const ALLCALLADR: u8 = 0x05;

///LED0 output and brightness control, byte 0. Every channel has the same four byte block, `LED_STRIDE` apart.
pub const LED0_ON_L: u8 = 0x06;
pub const LED0_ON_H: u8 = 0x07;
pub const LED0_OFF_L: u8 = 0x08;
pub const LED0_OFF_H: u8 = 0x09;

pub const LED_STRIDE: u8 = 4;
pub const CHANNEL_COUNT: u8 = 16;

///First register (`LEDn_ON_L`) of every channel block.
pub const LED_ON_L: [u8; CHANNEL_COUNT as usize] = [
    0x06, 0x0A, 0x0E, 0x12, 0x16, 0x1A, 0x1E, 0x22, //
    0x26, 0x2A, 0x2E, 0x32, 0x36, 0x3A, 0x3E, 0x42,
];

///Load all the LEDn_ON registers, byte 0
pub const ALL_LED_ON_L: u8 = 0xFA;
///Load all the LEDn_ON registers, byte 1
pub const ALL_LED_ON_H: u8 = 0xFB;
///Load all the LEDn_OFF registers, byte 0
pub const ALL_LED_OFF_L: u8 = 0xFC;
///Load all the LEDn_OFF registers, byte 1
pub const ALL_LED_OFF_H: u8 = 0xFD;

///Prescaler for pwm output frequency
pub const PRE_SCALE: u8 = 0xFE;
///Defines the test mode to be entered
pub const TESTMODE: u8 = 0xFF;

///MODE1 bits
pub mod mode1 {
    pub const RESTART: u8 = 0b1000_0000;
    pub const EXTCLK: u8 = 0b0100_0000;
    ///Register auto increment
    pub const AI: u8 = 0b0010_0000;
    ///Low power mode, oscillator off
    pub const SLEEP: u8 = 0b0001_0000;
    pub const SUB1: u8 = 0b0000_1000;
    pub const SUB2: u8 = 0b0000_0100;
    pub const SUB3: u8 = 0b0000_0010;
    pub const ALLCALL: u8 = 0b0000_0001;
}

///MODE2 bits
pub mod mode2 {
    ///Invert output logic state
    pub const INVRT: u8 = 0b0001_0000;
    ///Outputs change on ACK instead of STOP
    pub const OCH: u8 = 0b0000_1000;
    ///Totem pole outputs instead of open drain
    pub const OUTDRV: u8 = 0b0000_0100;
    pub const OUTNE_1: u8 = 0b0000_0010;
    pub const OUTNE_0: u8 = 0b0000_0001;
}

///Internal oscillator frequency.
pub const OSC_CLOCK_HZ: f64 = 25_000_000.0;
///Ticks per pwm cycle.
pub const PWM_STEPS: f64 = 4096.0;

///Output frequency limits of the internal oscillator.
pub const FREQUENCY_MIN_HZ: f32 = 24.0;
pub const FREQUENCY_MAX_HZ: f32 = 1526.0;

///The chip forces any PRE_SCALE value below 3 to 3.
pub const PRESCALE_MIN: u8 = 3;
pub const PRESCALE_MAX: u8 = 255;

///First register of a channel's four byte block.
pub const fn led_base(channel: u8) -> u8 {
    LED0_ON_L + LED_STRIDE * channel
}
