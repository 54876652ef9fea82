use crate::config::*;

pub const SPI_DEV: &str = "/dev/spidev0.0";
pub const SPI_SPEED_HZ: u32 = 15_600_000;
pub const GPIO_CHIP: &str = "/dev/gpiochip0";
pub const I2C_DEV: &str = "/dev/i2c-1";
pub const BITSTREAM: &str = "/usr/share/icehat/icehat_rxadc.bin";

#[rustfmt::skip]
pub const ICEHAT_PINS: Pins = Pins { done: 23, reset: 24, chip_select: 25 };

pub const R820T2: TunerConfig = TunerConfig {
    xtal_freq: 28_800_000,
    if_freq: 5_000_000,
    freq: 144_000_000,
    ppm_error: -48,
};

// CLK0 drives the ADC, CLK1 is spare
pub const SI5351: ClockConfig = ClockConfig {
    xtal_freq: 25_000_000,
    clk0: 50_000_000,
    clk1: 25_000_000,
};
