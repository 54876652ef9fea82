//! Blocking bus primitives the drivers are written against.
//!
//! Nothing here retries. A failed ioctl comes back as an [`Error`] and the
//! caller decides whether to give up, log, or carry on.
use crate::{config::Pins, Result};
use gpiocdev::{
    line::{Offset, Value},
    Request,
};
use i2cdev::{core::I2CDevice, linux::LinuxI2CDevice};
use spidev::{Spidev, SpidevTransfer};
use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

pub trait SpiBus {
    /// One full duplex exchange. `rx` must be as long as `tx`.
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()>;
}

impl SpiBus for Spidev {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        let mut transfer = SpidevTransfer::read_write(tx, rx);
        self.transfer(&mut transfer)?;
        Ok(())
    }
}

impl<T: SpiBus + ?Sized> SpiBus for &mut T {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        (**self).exchange(tx, rx)
    }
}

/// Register level access to 7 bit addressed devices on one adapter.
pub trait I2cBus {
    fn write_reg(&mut self, addr: u8, reg: u8, data: u8) -> Result<()>;
    fn read_reg(&mut self, addr: u8, reg: u8) -> Result<u8>;
    /// Register address followed by `data` in a single write.
    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()>;
    /// Plain read without a register address phase.
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()>;
}

impl<T: I2cBus + ?Sized> I2cBus for &mut T {
    fn write_reg(&mut self, addr: u8, reg: u8, data: u8) -> Result<()> {
        (**self).write_reg(addr, reg, data)
    }

    fn read_reg(&mut self, addr: u8, reg: u8) -> Result<u8> {
        (**self).read_reg(addr, reg)
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        (**self).write_block(addr, reg, data)
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }
}

/// An i2c-dev adapter. The slave address is reassigned before every
/// transaction so the tuner and the clock generator can share the handle.
pub struct LinuxI2c {
    dev: LinuxI2CDevice,
}

impl LinuxI2c {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        // placeholder address, every transaction selects its own
        let dev = LinuxI2CDevice::new(path, 0)?;
        Ok(Self { dev })
    }

    fn select(&mut self, addr: u8) -> Result<&mut LinuxI2CDevice> {
        self.dev.set_slave_address(u16::from(addr))?;
        Ok(&mut self.dev)
    }
}

impl I2cBus for LinuxI2c {
    fn write_reg(&mut self, addr: u8, reg: u8, data: u8) -> Result<()> {
        self.select(addr)?.smbus_write_byte_data(reg, data)?;
        Ok(())
    }

    fn read_reg(&mut self, addr: u8, reg: u8) -> Result<u8> {
        Ok(self.select(addr)?.smbus_read_byte_data(reg)?)
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(reg);
        buf.extend_from_slice(data);
        self.select(addr)?.write(&buf)?;
        Ok(())
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        self.select(addr)?.read(buf)?;
        Ok(())
    }
}

/// One adapter shared between drivers. The lock covers address selection
/// and the transfer together.
pub struct SharedI2c<B>(Arc<Mutex<B>>);

impl<B> Clone for SharedI2c<B> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<B: I2cBus> SharedI2c<B> {
    pub fn new(bus: B) -> Self {
        Self(Arc::new(Mutex::new(bus)))
    }

    fn with<T>(&self, f: impl FnOnce(&mut B) -> Result<T>) -> Result<T> {
        // a panic mid transfer leaves nothing half written on our side
        let mut bus = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut bus)
    }
}

impl<B: I2cBus> I2cBus for SharedI2c<B> {
    fn write_reg(&mut self, addr: u8, reg: u8, data: u8) -> Result<()> {
        self.with(|bus| bus.write_reg(addr, reg, data))
    }

    fn read_reg(&mut self, addr: u8, reg: u8) -> Result<u8> {
        self.with(|bus| bus.read_reg(addr, reg))
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        self.with(|bus| bus.write_block(addr, reg, data))
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        self.with(|bus| bus.read(addr, buf))
    }
}

/// The FPGA configuration handshake signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line {
    Reset,
    ChipSelect,
    Done,
}

pub trait ConfigLines {
    /// Drive an output. `true` is electrically high.
    fn set(&mut self, line: Line, high: bool) -> Result<()>;
    fn get(&mut self, line: Line) -> Result<bool>;
}

/// RESET and SS as outputs, DONE as input, all in one gpiocdev request.
/// The lines are released when this is dropped.
pub struct GpioLines {
    req: Request,
    pins: Pins,
}

impl GpioLines {
    pub fn open<P: AsRef<Path>>(chip: P, pins: &Pins) -> Result<Self> {
        // both outputs idle high: FPGA out of reset, slave deselected
        let req = Request::builder()
            .on_chip(chip.as_ref())
            .with_consumer("icehat")
            .with_lines(&[pins.reset, pins.chip_select])
            .as_output(Value::Active)
            .with_line(pins.done)
            .as_input()
            .request()?;
        Ok(Self { req, pins: *pins })
    }

    #[rustfmt::skip]
    fn offset(&self, line: Line) -> Offset {
        match line {
            Line::Reset      => self.pins.reset,
            Line::ChipSelect => self.pins.chip_select,
            Line::Done       => self.pins.done,
        }
    }
}

impl ConfigLines for GpioLines {
    fn set(&mut self, line: Line, high: bool) -> Result<()> {
        let value = if high { Value::Active } else { Value::Inactive };
        self.req.set_value(self.offset(line), value)?;
        Ok(())
    }

    fn get(&mut self, line: Line) -> Result<bool> {
        Ok(self.req.value(self.offset(line))? == Value::Active)
    }
}
