//! iCE40 slave SPI configuration and register access.
//!
//! Configuration: hold SS and CRESET_B low, wait for CDONE to drop, release
//! reset, clock the bitstream in, add trailing clocks, then check CDONE.
use crate::{
    bus::{ConfigLines, Line, SpiBus},
    registers::Frame,
    Error, Result,
};
use std::{
    fs::File,
    io::{self, Read},
    path::Path,
    thread::sleep,
    time::Duration,
};

pub const CHUNK_SIZE: usize = 4096;
/// Zero bytes clocked after the bitstream to finish startup.
pub const DUMMY_CLOCKS: usize = 10;
pub const DONE_POLL_LIMIT: usize = 1000;
/// CRESET_B low time, datasheet minimum is 200 ns.
const RESET_HOLD: Duration = Duration::from_micros(1);
/// Time for the device to clear its configuration memory.
const RESET_SETTLE: Duration = Duration::from_micros(1200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigState {
    Idle,
    Resetting,
    WaitingDoneLow,
    Streaming,
    Verifying,
    Configured,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Configured {
    pub bytes: usize,
    /// DONE never went low during reset. Reported, not fatal.
    pub done_timeout: bool,
}

/// A bitstream source and the number of bytes taken from it so far.
pub struct BitstreamTransfer<R> {
    reader: R,
    count: usize,
}

impl<R: Read> BitstreamTransfer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, count: 0 }
    }

    /// Fills `buf` unless the source runs out. Returns 0 at end of stream.
    pub fn next_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.count += filled;
        Ok(filled)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

pub struct Ice<S: SpiBus, G: ConfigLines> {
    spi: S,
    lines: Option<G>,
    state: ConfigState,
}

impl<S: SpiBus, G: ConfigLines> Ice<S, G> {
    /// `lines` may be omitted when only register access is needed.
    pub fn new(spi: S, lines: Option<G>) -> Self {
        Self {
            spi,
            lines,
            state: ConfigState::Idle,
        }
    }

    pub fn state(&self) -> ConfigState {
        self.state
    }

    /// DONE is high while a design is loaded.
    pub fn is_configured(&mut self) -> Result<bool> {
        self.lines.as_mut().ok_or(Error::NoConfigLines)?.get(Line::Done)
    }

    pub fn configure_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Configured> {
        let file = File::open(path.as_ref())?;
        log::info!("Configuring FPGA from {}", path.as_ref().display());
        self.configure(file)
    }

    /// Loads a bitstream. SS and CRESET_B are released on every exit path;
    /// DONE low at the end is `ConfigurationFailed`.
    pub fn configure<R: Read>(&mut self, bitstream: R) -> Result<Configured> {
        let lines = self.lines.as_mut().ok_or(Error::NoConfigLines)?;
        let mut transfer = BitstreamTransfer::new(bitstream);

        let result = handshake(&mut self.spi, lines, &mut self.state, &mut transfer);
        if result.is_err() {
            self.state = ConfigState::Failed;
            for line in [Line::Reset, Line::ChipSelect] {
                if let Err(e) = lines.set(line, true) {
                    log::warn!("Could not release {line:?}: {e}");
                }
            }
        }
        result
    }

    pub fn read(&mut self, reg: u8) -> Result<u32> {
        let tx = Frame::read(reg);
        let mut rx = [0; Frame::LEN];
        self.spi.exchange(&tx.0, &mut rx)?;
        let data = Frame(rx).data();
        log::trace!("FPGA {reg:#04x} -> {data:#010x}");
        Ok(data)
    }

    pub fn write(&mut self, reg: u8, data: u32) -> Result<()> {
        let tx = Frame::write(reg, data);
        let mut rx = [0; Frame::LEN];
        log::trace!("FPGA {reg:#04x} <- {data:#010x}");
        self.spi.exchange(&tx.0, &mut rx)
    }

    /// Raw exchange for frames this crate has no helper for.
    pub fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        self.spi.exchange(tx, rx)
    }

    pub fn release(self) -> (S, Option<G>) {
        (self.spi, self.lines)
    }
}

fn wait_done_low<G: ConfigLines>(lines: &mut G) -> Result<()> {
    for _ in 0..DONE_POLL_LIMIT {
        if !lines.get(Line::Done)? {
            return Ok(());
        }
    }
    Err(Error::ConfigurationTimeout)
}

fn handshake<S: SpiBus, G: ConfigLines, R: Read>(
    spi: &mut S,
    lines: &mut G,
    state: &mut ConfigState,
    transfer: &mut BitstreamTransfer<R>,
) -> Result<Configured> {
    *state = ConfigState::Resetting;
    lines.set(Line::ChipSelect, false)?;
    lines.set(Line::Reset, false)?;
    sleep(RESET_HOLD);

    *state = ConfigState::WaitingDoneLow;
    let done_timeout = match wait_done_low(lines) {
        Ok(()) => false,
        Err(Error::ConfigurationTimeout) => {
            log::warn!("{}", Error::ConfigurationTimeout);
            true
        }
        Err(e) => return Err(e),
    };

    lines.set(Line::Reset, true)?;
    sleep(RESET_SETTLE);

    *state = ConfigState::Streaming;
    let mut chunk = vec![0; CHUNK_SIZE];
    let mut rx = vec![0; CHUNK_SIZE];
    loop {
        let n = transfer.next_chunk(&mut chunk)?;
        if n == 0 {
            break;
        }
        spi.exchange(&chunk[..n], &mut rx[..n])?;
    }
    log::debug!("Sent {} bitstream bytes", transfer.count());
    spi.exchange(&[0; DUMMY_CLOCKS], &mut rx[..DUMMY_CLOCKS])?;
    lines.set(Line::ChipSelect, true)?;

    *state = ConfigState::Verifying;
    if lines.get(Line::Done)? {
        *state = ConfigState::Configured;
        log::info!("FPGA configured");
        Ok(Configured {
            bytes: transfer.count(),
            done_timeout,
        })
    } else {
        *state = ConfigState::Failed;
        Err(Error::ConfigurationFailed)
    }
}
