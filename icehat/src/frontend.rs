//! Board bring-up: FPGA design, DAC mux, tuner and clock generator.
//!
//! Without a tuner the board runs in HF mode and the DDC LO is the receive
//! frequency. With one it runs in VHF mode and the DDC sits on the tuner IF.
use crate::{
    bus::{ConfigLines, I2cBus, SharedI2c, SpiBus},
    config::Config,
    ice::Ice,
    r820t2::{Calibration, Tuner},
    rxadc::{RxAdc, ID_MASK, ID_VALUE},
    si5351::{Channel, ChannelState, ClockGen},
    Error, Hz, Result,
};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Hf,
    Vhf,
}

pub struct FrontEnd<S: SpiBus, G: ConfigLines, B: I2cBus> {
    ice: Ice<S, G>,
    tuner: Option<Tuner<SharedI2c<B>>>,
    clock: Option<ClockGen<SharedI2c<B>>>,
}

impl<S: SpiBus, G: ConfigLines, B: I2cBus> FrontEnd<S, G, B> {
    pub fn bring_up(mut ice: Ice<S, G>, i2c: SharedI2c<B>, config: &Config) -> Result<Self> {
        let id = RxAdc::new(&mut ice).id()?;
        if id & ID_MASK != ID_VALUE {
            log::info!(
                "DDC ID {:#08x}, expected {:#08x}, loading {}",
                id >> 8,
                ID_VALUE >> 8,
                config.fpga.bitstream.display()
            );
            ice.configure_file(&config.fpga.bitstream)?;
            let id = RxAdc::new(&mut ice).id()?;
            if id & ID_MASK != ID_VALUE {
                log::warn!("DDC ID still {id:#010x} after configuration");
            }
        }
        RxAdc::new(&mut ice).set_dac_mux(true)?;

        let tuner = match Tuner::init(i2c.clone(), &config.tuner) {
            Ok(tuner) => {
                log::info!("R820T2 found, VHF mode");
                Some(tuner)
            }
            Err(Error::DeviceAbsent(_)) => {
                log::info!("R820T2 not found, HF mode");
                None
            }
            Err(e) => return Err(e),
        };

        let clock = match ClockGen::init(i2c, &config.clock) {
            Ok(mut clock) => {
                let freqs = [config.clock.clk0, config.clock.clk1];
                for (channel, freq) in Channel::ALL.into_iter().zip(freqs) {
                    if freq != 0 {
                        clock.set_output_channel(channel, freq)?;
                    }
                }
                Some(clock)
            }
            Err(e) => {
                log::warn!("Si5351 unavailable, ignoring: {e}");
                None
            }
        };

        let mut frontend = Self { ice, tuner, clock };
        if let Some(if_freq) = frontend.tuner.as_ref().map(Tuner::if_freq) {
            frontend.ddc().set_lo(if_freq)?;
        }
        Ok(frontend)
    }

    pub fn mode(&self) -> Mode {
        match self.tuner {
            Some(_) => Mode::Vhf,
            None => Mode::Hf,
        }
    }

    /// Receive `freq`. Returns the DDC LO as read back.
    pub fn tune(&mut self, freq: Hz) -> Result<Hz> {
        let lo = match self.tuner.as_mut() {
            Some(tuner) => {
                tuner.set_frequency(freq)?;
                tuner.if_freq()
            }
            None => freq,
        };
        self.ddc().set_lo(lo)
    }

    pub fn ddc(&mut self) -> RxAdc<'_, S, G> {
        RxAdc::new(&mut self.ice)
    }

    pub fn tuner(&self) -> Option<&Tuner<SharedI2c<B>>> {
        self.tuner.as_ref()
    }

    pub fn tuner_mut(&mut self) -> Option<&mut Tuner<SharedI2c<B>>> {
        self.tuner.as_mut()
    }

    pub fn clock(&self) -> Option<&ClockGen<SharedI2c<B>>> {
        self.clock.as_ref()
    }

    pub fn clock_mut(&mut self) -> Option<&mut ClockGen<SharedI2c<B>>> {
        self.clock.as_mut()
    }

    pub fn status(&mut self) -> Result<Status> {
        let mode = self.mode();
        let tuner = self.tuner.as_ref().map(|t| (t.freq(), t.calibration()));
        let clocks = self
            .clock
            .as_ref()
            .map(|c| Channel::ALL.map(|ch| *c.channel(ch)));
        let mut ddc = self.ddc();
        Ok(Status {
            mode,
            id: ddc.id()?,
            lo: ddc.lo()?,
            if_gain: ddc.if_gain()?,
            cic_saturation: ddc.cic_saturation()?,
            tuner,
            clocks,
        })
    }

    pub fn release(self) -> Ice<S, G> {
        self.ice
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub mode: Mode,
    pub id: u32,
    pub lo: Hz,
    pub if_gain: u8,
    pub cic_saturation: u32,
    pub tuner: Option<(Hz, Calibration)>,
    pub clocks: Option<[ChannelState; 2]>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mode:      {:?}", self.mode)?;
        writeln!(f, "ddc id:    {:#010x}", self.id)?;
        writeln!(f, "ddc lo:    {} Hz", self.lo)?;
        writeln!(f, "if gain:   {} ({} dB)", self.if_gain, 6 * u32::from(self.if_gain))?;
        writeln!(f, "cic sat:   {}", self.cic_saturation)?;
        match self.tuner {
            Some((freq, cal)) => writeln!(f, "tuner:     {freq} Hz, {cal:?}")?,
            None => writeln!(f, "tuner:     absent")?,
        }
        match &self.clocks {
            Some(clocks) => {
                for (ch, state) in Channel::ALL.iter().zip(clocks) {
                    writeln!(f, "{ch:?}:      {} Hz, vco {} Hz", state.freq, state.vco_freq)?;
                }
                Ok(())
            }
            None => writeln!(f, "clock:     absent"),
        }
    }
}
