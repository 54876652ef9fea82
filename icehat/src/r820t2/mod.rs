//! Rafael Micro R820T2 tuner.
//!
//! The chip cannot read back single registers, so every write goes through a
//! shadow cache and masked updates are computed against it.
use crate::{
    bus::I2cBus,
    config::TunerConfig,
    registers::{bitrev, TunerReg},
    Error, Hz, Result,
};
use std::{thread::sleep, time::Duration};

pub mod pll;
pub mod tables;

pub use pll::PllParameters;
pub use tables::{FrequencyRange, FREQ_RANGES, REG_COUNT};

pub const ADDR: u8 = 0x1A;
/// Register 0 as read back after bit reversal.
pub const CHIP_ID: u8 = 0x96;
pub const CAL_ATTEMPTS: usize = 5;
pub const CAL_FREQ: Hz = 88_000_000;
const CAL_DWELL: Duration = Duration::from_millis(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Calibration {
    Calibrated { attempts: usize, code: u8 },
    Failed,
}

impl Calibration {
    pub fn check(self) -> Result<u8> {
        match self {
            Calibration::Calibrated { code, .. } => Ok(code),
            Calibration::Failed => Err(Error::CalibrationFailed(CAL_ATTEMPTS)),
        }
    }
}

pub struct Tuner<B: I2cBus> {
    bus: B,
    regs: [u8; REG_COUNT],
    xtal_freq: Hz,
    if_freq: Hz,
    ppm_error: i64,
    freq: Hz,
    calibration: Calibration,
}

impl<B: I2cBus> Tuner<B> {
    /// Checks the chip id. Any failure, bus or mismatch, means no tuner.
    pub fn probe(bus: &mut B) -> Result<()> {
        let mut id = [0];
        match bus.read(ADDR, &mut id) {
            Ok(()) if bitrev(id[0]) == CHIP_ID => Ok(()),
            Ok(()) => {
                log::debug!("R820T2 id mismatch: {:#04x}", bitrev(id[0]));
                Err(Error::DeviceAbsent(ADDR))
            }
            Err(e) => {
                log::debug!("R820T2 probe failed: {e}");
                Err(Error::DeviceAbsent(ADDR))
            }
        }
    }

    /// Probe, load the power up image, calibrate and tune to `config.freq`.
    /// A failed calibration is logged and the tuner is still returned.
    pub fn init(mut bus: B, config: &TunerConfig) -> Result<Self> {
        Self::probe(&mut bus)?;
        let mut tuner = Self::new(bus, config);

        for reg in tables::WRITE_START..REG_COUNT as u8 {
            tuner.write_reg(reg, tables::INIT_REGS[usize::from(reg)])?;
        }

        match tuner.calibrate()?.check() {
            Ok(code) => log::info!("R820T2 calibrated, code {code:#x}"),
            Err(e) => log::warn!("{e}"),
        }

        tuner.set_frequency(config.freq)?;
        Ok(tuner)
    }

    fn new(bus: B, config: &TunerConfig) -> Self {
        Self {
            bus,
            regs: [0; REG_COUNT],
            xtal_freq: config.xtal_freq,
            if_freq: config.if_freq,
            ppm_error: config.ppm_error,
            freq: 0,
            calibration: Calibration::Failed,
        }
    }

    fn index(reg: u8) -> Result<usize> {
        let idx = usize::from(reg);
        if idx < REG_COUNT {
            Ok(idx)
        } else {
            Err(Error::Register(reg))
        }
    }

    /// The cache is updated before the bus write, so it holds the intended
    /// value even if the transfer fails.
    pub fn write_reg<R: Into<u8>>(&mut self, reg: R, data: u8) -> Result<()> {
        let reg = reg.into();
        self.regs[Self::index(reg)?] = data;
        log::trace!("R820T2 {reg:#04x} <- {data:#04x}");
        self.bus.write_reg(ADDR, reg, data)
    }

    /// Replaces the bits of `mask` with those of `data`, keeping the rest
    /// of the cached value.
    pub fn write_masked<R: Into<u8>>(&mut self, reg: R, data: u8, mask: u8) -> Result<()> {
        let reg = reg.into();
        let cached = self.regs[Self::index(reg)?];
        self.write_reg(reg, (data & mask) | (cached & !mask))
    }

    pub fn read_cached<R: Into<u8>>(&self, reg: R) -> Result<u8> {
        Ok(self.regs[Self::index(reg.into())?])
    }

    /// Reads registers from 0 up, undoing the chip's LSB first readback.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() > REG_COUNT {
            // first register past the map that the read would reach
            let last = u8::try_from(buf.len() - 1).unwrap_or(u8::MAX);
            return Err(Error::Register(last));
        }
        self.bus.read(ADDR, buf)?;
        for b in buf.iter_mut() {
            *b = bitrev(*b);
        }
        Ok(())
    }

    /// Diagnostic read straight from the chip. The cache is left alone.
    pub fn read_uncached<R: Into<u8>>(&mut self, reg: R) -> Result<u8> {
        let idx = Self::index(reg.into())?;
        let mut buf = [0; REG_COUNT];
        self.read_raw(&mut buf[..=idx])?;
        Ok(buf[idx])
    }

    /// LO frequency after the crystal ppm correction.
    pub fn corrected(&self, freq: Hz) -> Result<Hz> {
        let signed = i64::try_from(freq).map_err(|_| Error::FrequencyRange(freq))?;
        let err = signed
            .checked_mul(self.ppm_error)
            .ok_or(Error::FrequencyRange(freq))?
            / 1_000_000;
        freq.checked_add_signed(err).ok_or(Error::FrequencyRange(freq))
    }

    pub fn set_tracking_filter(&mut self, freq: Hz) -> Result<&'static FrequencyRange> {
        let range = tables::lookup(freq);
        log::debug!("R820T2 tracking filter {} MHz band", range.mhz);

        self.write_masked(TunerReg::OPENDRAIN, range.open_d, 0x08)?;
        self.write_masked(TunerReg::RFMUX, range.rf_mux_ploy, 0xC3)?;
        self.write_reg(TunerReg::TFBAND, range.tf_c)?;
        // xtal cap and drive
        self.write_masked(TunerReg::PLLDIV, 0x08, 0x0B)?;
        self.write_masked(TunerReg::IMRGAIN, 0x00, 0x3F)?;
        self.write_masked(TunerReg::IMRPHASE, 0x00, 0x3F)?;
        Ok(range)
    }

    pub fn set_pll(&mut self, freq: Hz) -> Result<PllParameters> {
        let pll = PllParameters::compute(freq, self.xtal_freq)?;
        log::debug!("R820T2 PLL {freq} Hz: {pll:?}");
        self.write_pll(&pll)?;
        Ok(pll)
    }

    fn write_pll(&mut self, pll: &PllParameters) -> Result<()> {
        self.write_masked(TunerReg::PLLDIV, pll.output_divider << 5, 0xE0)?;
        self.write_reg(TunerReg::PLLINT, pll.pll_int_reg())?;
        match pll.sdm {
            None => self.write_masked(TunerReg::SDMCTRL, 0x08, 0x08),
            Some(sdm) => {
                let [hi, lo] = sdm.to_be_bytes();
                self.write_reg(TunerReg::SDMLO, lo)?;
                self.write_reg(TunerReg::SDMHI, hi)?;
                self.write_masked(TunerReg::SDMCTRL, 0x00, 0x08)
            }
        }
    }

    /// Tune so `freq` lands on the IF. An unreachable LO is rejected before
    /// any register is touched.
    pub fn set_frequency(&mut self, freq: Hz) -> Result<()> {
        let lo = freq.checked_add(self.if_freq).ok_or(Error::FrequencyRange(freq))?;
        let lo = self.corrected(lo)?;
        let pll = PllParameters::compute(lo, self.xtal_freq)?;
        log::debug!("R820T2 {freq} Hz, LO {lo} Hz: {pll:?}");
        self.set_tracking_filter(freq)?;
        self.write_pll(&pll)?;
        self.freq = freq;
        Ok(())
    }

    pub fn set_lna_gain(&mut self, gain: u8) -> Result<()> {
        self.write_masked(TunerReg::LNA, gain, 0x0F)
    }

    pub fn set_mixer_gain(&mut self, gain: u8) -> Result<()> {
        self.write_masked(TunerReg::MIXER, gain, 0x0F)
    }

    pub fn set_vga_gain(&mut self, gain: u8) -> Result<()> {
        self.write_masked(TunerReg::VGA, gain, 0x0F)
    }

    /// Bit 4 of R5 is manual LNA gain: AGC on clears it.
    pub fn set_lna_agc(&mut self, enable: bool) -> Result<()> {
        self.write_masked(TunerReg::LNA, if enable { 0x00 } else { 0x10 }, 0x10)
    }

    /// Bit 4 of R7 is mixer AGC: AGC on sets it.
    pub fn set_mixer_agc(&mut self, enable: bool) -> Result<()> {
        self.write_masked(TunerReg::MIXER, if enable { 0x10 } else { 0x00 }, 0x10)
    }

    /// `bw` bits 3:0 select the channel filter, 0 widest. Bits 5:4 pick the
    /// second IF filter mode.
    pub fn set_if_bandwidth(&mut self, bw: u8) -> Result<()> {
        let a = 0xB0 | (0x0F - (bw & 0x0F));
        let b = 0x0F | tables::IF_BANDWIDTH_MODES[usize::from((bw >> 4) & 0x03)];
        self.write_reg(TunerReg::FILTCAP, a)?;
        self.write_reg(TunerReg::FILTBW, b)
    }

    /// Filter calibration against the PLL at `CAL_FREQ`. Bus errors abort;
    /// running out of attempts does not.
    pub fn calibrate(&mut self) -> Result<Calibration> {
        for attempt in 1..=CAL_ATTEMPTS {
            self.write_masked(TunerReg::FILTBW, 0x08, 0x60)?;
            self.write_masked(TunerReg::CALCLK, 0x04, 0x04)?;
            // 0 pF xtal cap
            self.write_masked(TunerReg::PLLDIV, 0x00, 0x03)?;
            self.set_pll(CAL_FREQ)?;

            self.write_masked(TunerReg::FILTBW, 0x10, 0x10)?;
            sleep(CAL_DWELL);
            self.write_masked(TunerReg::FILTBW, 0x00, 0x10)?;
            self.write_masked(TunerReg::CALCLK, 0x00, 0x04)?;

            let code = self.read_uncached(TunerReg::CALCODE)? & 0x0F;
            log::debug!("R820T2 calibration attempt {attempt}: code {code:#x}");
            if code != 0 && code != 0x0F {
                self.calibration = Calibration::Calibrated { attempts: attempt, code };
                return Ok(self.calibration);
            }
        }
        self.calibration = Calibration::Failed;
        Ok(self.calibration)
    }

    pub fn freq(&self) -> Hz {
        self.freq
    }

    pub fn if_freq(&self) -> Hz {
        self.if_freq
    }

    pub fn xtal_freq(&self) -> Hz {
        self.xtal_freq
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn regs(&self) -> &[u8; REG_COUNT] {
        &self.regs
    }

    pub fn release(self) -> B {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::mock::MockI2c, config::board};
    use proptest::prelude::*;

    fn tuner(bus: &mut MockI2c) -> Tuner<&mut MockI2c> {
        Tuner::new(bus, &board::R820T2)
    }

    #[test]
    fn init_sequence() {
        let mut bus = MockI2c::default().with_tuner();
        let tuner = Tuner::init(&mut bus, &board::R820T2).unwrap();
        assert_eq!(Calibration::Calibrated { attempts: 1, code: 5 }, tuner.calibration());
        assert_eq!(144_000_000, tuner.freq());
        let cache = *tuner.regs();
        drop(tuner);

        let writes = bus.writes_to(ADDR);
        for (i, reg) in (tables::WRITE_START..REG_COUNT as u8).enumerate() {
            assert_eq!((reg, vec![tables::INIT_REGS[usize::from(reg)]]), writes[i]);
        }

        // cache mirrors silicon
        for reg in tables::WRITE_START..REG_COUNT as u8 {
            assert_eq!(bus.reg(ADDR, reg), cache[usize::from(reg)]);
        }

        // 148 992 848 Hz LO
        assert_eq!(3, bus.reg(ADDR, 0x10) >> 5);
        assert_eq!(0x51, bus.reg(ADDR, 0x14));
        assert_eq!(0x18, bus.reg(ADDR, 0x15));
        assert_eq!(0xC6, bus.reg(ADDR, 0x16));
        assert_eq!(0, bus.reg(ADDR, 0x12) & 0x08);
        // 140 MHz tracking filter
        assert_eq!(0x14, bus.reg(ADDR, 0x1B));
        assert_eq!(0x22, bus.reg(ADDR, 0x1A));
        assert_eq!(0x30, bus.reg(ADDR, 0x17));
    }

    #[test]
    fn ppm_correction() {
        let mut bus = MockI2c::default();
        let tuner = tuner(&mut bus);
        assert_eq!(148_992_848, tuner.corrected(149_000_000).unwrap());
        assert_eq!(0, tuner.corrected(0).unwrap());
    }

    #[test]
    fn absent_tuner() {
        let mut bus = MockI2c::default();
        assert!(matches!(
            Tuner::init(&mut bus, &board::R820T2),
            Err(Error::DeviceAbsent(ADDR))
        ));

        let mut bus = MockI2c::default().with_device(ADDR);
        assert!(matches!(
            Tuner::init(&mut bus, &board::R820T2),
            Err(Error::DeviceAbsent(ADDR))
        ));
        assert!(bus.writes.is_empty());
    }

    #[test]
    fn calibration_retries() {
        let mut bus = MockI2c::default().with_tuner();
        bus.cal_codes.extend([0x00, 0x0F, 0x17]);
        let mut tuner = tuner(&mut bus);
        assert_eq!(Calibration::Calibrated { attempts: 3, code: 7 }, tuner.calibrate().unwrap());
        // trigger and calibration clock released
        assert_eq!(0, tuner.read_cached(TunerReg::FILTBW).unwrap() & 0x10);
        assert_eq!(0, tuner.read_cached(TunerReg::CALCLK).unwrap() & 0x04);
    }

    #[test]
    fn calibration_exhausted_is_not_fatal() {
        let mut bus = MockI2c::default().with_tuner();
        bus.cal_codes.extend([0x0F; CAL_ATTEMPTS]);
        let tuner = Tuner::init(&mut bus, &board::R820T2).unwrap();
        assert_eq!(Calibration::Failed, tuner.calibration());
        assert!(matches!(tuner.calibration().check(), Err(Error::CalibrationFailed(5))));
        assert_eq!(144_000_000, tuner.freq());
    }

    #[test]
    fn uncached_read_leaves_cache() {
        let mut bus = MockI2c::default().with_tuner();
        let mut tuner = tuner(&mut bus);
        tuner.write_reg(0x05, 0x12).unwrap();
        bus_poke(&mut tuner, 5, 0x34);
        assert_eq!(0x34, tuner.read_uncached(0x05).unwrap());
        assert_eq!(0x12, tuner.read_cached(0x05).unwrap());
    }

    fn bus_poke(tuner: &mut Tuner<&mut MockI2c>, reg: u8, value: u8) {
        tuner.bus.regs.get_mut(&ADDR).unwrap()[usize::from(reg)] = value;
    }

    #[test]
    fn register_bounds() {
        let mut bus = MockI2c::default().with_tuner();
        let mut tuner = tuner(&mut bus);
        assert!(matches!(tuner.write_reg(0x20, 0), Err(Error::Register(0x20))));
        assert!(matches!(tuner.write_masked(0x20, 0, 0xFF), Err(Error::Register(0x20))));
        assert!(matches!(tuner.read_cached(0x20), Err(Error::Register(0x20))));
        assert!(matches!(tuner.read_uncached(0x20), Err(Error::Register(0x20))));
    }

    #[test]
    fn agc_polarity() {
        let mut bus = MockI2c::default().with_tuner();
        let mut tuner = tuner(&mut bus);
        tuner.write_reg(TunerReg::LNA, 0x90).unwrap();
        tuner.write_reg(TunerReg::MIXER, 0x60).unwrap();

        tuner.set_lna_agc(true).unwrap();
        tuner.set_mixer_agc(true).unwrap();
        assert_eq!(0x80, tuner.read_cached(TunerReg::LNA).unwrap());
        assert_eq!(0x70, tuner.read_cached(TunerReg::MIXER).unwrap());

        tuner.set_lna_agc(false).unwrap();
        tuner.set_mixer_agc(false).unwrap();
        assert_eq!(0x90, tuner.read_cached(TunerReg::LNA).unwrap());
        assert_eq!(0x60, tuner.read_cached(TunerReg::MIXER).unwrap());
    }

    #[test]
    fn gains_stay_in_nibble() {
        let mut bus = MockI2c::default().with_tuner();
        let mut tuner = tuner(&mut bus);
        tuner.write_reg(TunerReg::VGA, 0x40).unwrap();
        tuner.set_vga_gain(0xFB).unwrap();
        tuner.set_lna_gain(0x07).unwrap();
        tuner.set_mixer_gain(0x0A).unwrap();
        assert_eq!(0x4B, tuner.read_cached(TunerReg::VGA).unwrap());
        assert_eq!(0x07, tuner.read_cached(TunerReg::LNA).unwrap());
        assert_eq!(0x0A, tuner.read_cached(TunerReg::MIXER).unwrap());
    }

    #[test]
    fn if_bandwidth() {
        let mut bus = MockI2c::default().with_tuner();
        let mut tuner = tuner(&mut bus);
        tuner.set_if_bandwidth(0x03).unwrap();
        assert_eq!(0xBC, tuner.read_cached(TunerReg::FILTCAP).unwrap());
        assert_eq!(0xEF, tuner.read_cached(TunerReg::FILTBW).unwrap());
        tuner.set_if_bandwidth(0x20).unwrap();
        assert_eq!(0xBF, tuner.read_cached(TunerReg::FILTCAP).unwrap());
        assert_eq!(0x6F, tuner.read_cached(TunerReg::FILTBW).unwrap());
    }

    #[test]
    fn unreachable_frequency() {
        let mut bus = MockI2c::default().with_tuner();
        let mut tuner = tuner(&mut bus);
        tuner.set_frequency(144_000_000).unwrap();
        let before = *tuner.regs();
        let writes = tuner.bus.writes.len();
        assert!(matches!(tuner.set_frequency(10_000_000), Err(Error::FrequencyRange(_))));
        assert!(matches!(tuner.set_frequency(2_100_000_000), Err(Error::FrequencyRange(_))));
        assert_eq!(144_000_000, tuner.freq());
        // filter bank and PLL left on the old band
        assert_eq!(0x14, tuner.read_cached(TunerReg::TFBAND).unwrap());
        assert_eq!(before, *tuner.regs());
        assert_eq!(writes, tuner.bus.writes.len());
    }

    #[test]
    fn huge_frequency_rejected() {
        let mut bus = MockI2c::default().with_tuner();
        let mut tuner = tuner(&mut bus);
        for freq in [1_000_000_000_000_000_000, i64::MAX as u64, u64::MAX - 1] {
            assert!(matches!(tuner.set_frequency(freq), Err(Error::FrequencyRange(_))));
        }
        assert!(matches!(tuner.corrected(200_000_000_000_000_000), Err(Error::FrequencyRange(_))));
        assert!(tuner.bus.writes.is_empty());
    }

    #[test]
    fn oversized_raw_read() {
        let mut bus = MockI2c::default().with_tuner();
        let mut tuner = tuner(&mut bus);
        assert!(matches!(tuner.read_raw(&mut [0; REG_COUNT + 1]), Err(Error::Register(0x20))));
        assert!(matches!(tuner.read_raw(&mut [0; 256]), Err(Error::Register(0xFF))));
        assert!(matches!(tuner.read_raw(&mut [0; 300]), Err(Error::Register(0xFF))));
    }

    #[test]
    fn write_errors_surface() {
        let mut bus = MockI2c::default();
        let mut tuner = tuner(&mut bus);
        assert!(matches!(tuner.set_lna_gain(3), Err(Error::Io(_))));
        // cache still takes the value
        assert_eq!(3, tuner.read_cached(TunerReg::LNA).unwrap());
    }

    proptest! {
        #[test]
        fn masked_write_keeps_other_bits(reg in 5..0x20u8, prev: u8, data: u8, mask: u8) {
            let mut bus = MockI2c::default().with_tuner();
            let mut tuner = tuner(&mut bus);
            tuner.write_reg(reg, prev).unwrap();
            tuner.write_masked(reg, data, mask).unwrap();
            assert_eq!((data & mask) | (prev & !mask), tuner.read_cached(reg).unwrap());
        }

        #[test]
        fn tracking_filter_matches_table(freq in 24_000_000..1_700_000_000u64) {
            let mut bus = MockI2c::default().with_tuner();
            let mut tuner = tuner(&mut bus);
            let range = tuner.set_tracking_filter(freq).unwrap();
            assert_eq!(tables::lookup(freq), range);
            assert_eq!(range.tf_c, tuner.read_cached(TunerReg::TFBAND).unwrap());
            assert_eq!(range.open_d, tuner.read_cached(TunerReg::OPENDRAIN).unwrap() & 0x08);
            assert_eq!(range.rf_mux_ploy, tuner.read_cached(TunerReg::RFMUX).unwrap() & 0xC3);
        }
    }
}
