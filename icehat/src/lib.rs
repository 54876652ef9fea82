use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use std::path::Path;
use thiserror::Error;

pub mod bus;
pub mod config;
pub mod frontend;
pub mod ice;
pub mod r820t2;
pub mod registers;
pub mod rxadc;
pub mod si5351;

#[cfg(test)] use proptest::prelude::*;

pub type Hz = u64;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("I2C communication failed")]
    I2c(#[from] i2cdev::linux::LinuxI2CError),
    #[error("GPIO request failed")]
    Gpio(#[from] gpiocdev::Error),
    #[error("Invalid config file")]
    Config(#[from] toml::de::Error),
    #[error("No device answering at I2C address {0:#04x}")]
    DeviceAbsent(u8),
    #[error("Tuner calibration failed after {0} attempts")]
    CalibrationFailed(usize),
    #[error("Timeout waiting for DONE low")]
    ConfigurationTimeout,
    #[error("FPGA configuration failed, DONE not high")]
    ConfigurationFailed,
    #[error("Frequency out of range: {0} Hz")]
    FrequencyRange(Hz),
    #[error("Register {0:#04x} outside device map")]
    Register(u8),
    #[error("FPGA configuration needs the RESET/SS/DONE lines")]
    NoConfigLines,
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn div_nearest(dividend: u64, divisor: u64) -> u64 {
    (dividend + (divisor >> 1)) / divisor
}

#[cfg(test)]
proptest! {
    #[test]
    fn div_even(n: u8) {
        let v = u64::from(n);
        assert_eq!(v, div_nearest(v*2, 2));
    }

    #[test]
    fn div_odd(n: u8) {
        let v = u64::from(n);
        assert_eq!(v+1, div_nearest((v+1)*2, 2));
    }

    #[test]
    fn div_rounds_half_up(n in 0..1_000_000u64, d in 1..1_000u64) {
        let q = div_nearest(n, d);
        assert!(q * d <= n + d / 2);
        assert!(n + d / 2 < (q + 1) * d);
    }
}

/// Opens the FPGA SPI port. The iCE40 slave and the register frames both use mode 0.
pub fn open<P: AsRef<Path>>(path: P, speed_hz: u32) -> std::io::Result<Spidev> {
    let mut spi = Spidev::open(path)?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options)?;
    Ok(spi)
}
