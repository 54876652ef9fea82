//! TOML configuration. Every section defaults to the reference hardware, so
//! an empty file describes a stock board.
use crate::{Hz, Result};
use serde::{Deserialize, Serialize};
use std::{fs::read_to_string, path::Path, path::PathBuf};

pub mod board;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fpga: FpgaConfig,
    pub i2c: I2cConfig,
    pub tuner: TunerConfig,
    pub clock: ClockConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// GPIO line offsets of the configuration handshake.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pins {
    pub done: u32,
    pub reset: u32,
    pub chip_select: u32,
}

impl Default for Pins {
    fn default() -> Self {
        board::ICEHAT_PINS
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FpgaConfig {
    pub spi: PathBuf,
    pub spi_speed_hz: u32,
    pub gpio_chip: PathBuf,
    pub bitstream: PathBuf,
    pub pins: Pins,
}

impl Default for FpgaConfig {
    fn default() -> Self {
        Self {
            spi: board::SPI_DEV.into(),
            spi_speed_hz: board::SPI_SPEED_HZ,
            gpio_chip: board::GPIO_CHIP.into(),
            bitstream: board::BITSTREAM.into(),
            pins: Pins::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct I2cConfig {
    pub bus: PathBuf,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            bus: board::I2C_DEV.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub xtal_freq: Hz,
    pub if_freq: Hz,
    /// Tuned after calibration.
    pub freq: Hz,
    /// Measured LO error of the crystal.
    pub ppm_error: i64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        board::R820T2
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub xtal_freq: Hz,
    /// Zero leaves the output disabled.
    pub clk0: Hz,
    pub clk1: Hz,
}

impl Default for ClockConfig {
    fn default() -> Self {
        board::SI5351
    }
}
