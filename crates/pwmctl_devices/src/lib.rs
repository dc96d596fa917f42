//!Chip drivers built on the `pwmctl_i2c` bus device.

pub mod devices;
