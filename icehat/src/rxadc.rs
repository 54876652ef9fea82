//! Registers of the receive DDC design loaded into the FPGA.
use crate::{
    bus::{ConfigLines, SpiBus},
    div_nearest,
    ice::Ice,
    registers::DdcReg,
    Error, Hz, Result,
};

pub const ID_MASK: u32 = 0xFFFF_FF00;
pub const ID_VALUE: u32 = 0xADC5_0000;
pub const FSAMPLE: Hz = 50_000_000;
/// Width of the LO phase increment.
pub const LOBITS: u32 = 26;

/// Phase increment to the nearest LO frequency.
pub fn lo_to_hz(raw: u32) -> Hz {
    div_nearest(FSAMPLE * u64::from(raw), 1 << LOBITS)
}

/// LO frequency to the nearest phase increment. Must stay below the sample rate.
pub fn hz_to_lo(freq: Hz) -> Result<u32> {
    let raw = freq
        .checked_mul(1 << LOBITS)
        .map(|f| div_nearest(f, FSAMPLE))
        .filter(|&raw| raw < 1 << LOBITS)
        .ok_or(Error::FrequencyRange(freq))?;
    // < 2^26 always fits
    Ok(raw as u32)
}

pub struct RxAdc<'a, S: SpiBus, G: ConfigLines> {
    ice: &'a mut Ice<S, G>,
}

impl<'a, S: SpiBus, G: ConfigLines> RxAdc<'a, S, G> {
    pub fn new(ice: &'a mut Ice<S, G>) -> Self {
        Self { ice }
    }

    pub fn id(&mut self) -> Result<u32> {
        self.ice.read(DdcReg::ID.into())
    }

    pub fn is_loaded(&mut self) -> Result<bool> {
        Ok(self.id()? & ID_MASK == ID_VALUE)
    }

    pub fn lo(&mut self) -> Result<Hz> {
        Ok(lo_to_hz(self.ice.read(DdcReg::LO.into())?))
    }

    /// Returns the frequency the DDC actually settled on.
    pub fn set_lo(&mut self, freq: Hz) -> Result<Hz> {
        let raw = hz_to_lo(freq)?;
        self.ice.write(DdcReg::LO.into(), raw)?;
        let actual = self.lo()?;
        log::debug!("DDC LO {freq} Hz, increment {raw:#x}, readback {actual} Hz");
        Ok(actual)
    }

    pub fn set_dac_mux(&mut self, enable: bool) -> Result<()> {
        self.ice.write(DdcReg::DACMUX.into(), u32::from(enable))
    }

    /// CIC output shift, 6 dB per step.
    pub fn if_gain(&mut self) -> Result<u8> {
        Ok((self.ice.read(DdcReg::CICSHF.into())? & 0xFF) as u8)
    }

    pub fn set_if_gain(&mut self, shift: u8) -> Result<()> {
        self.ice.write(DdcReg::CICSHF.into(), u32::from(shift))
    }

    pub fn cic_saturation(&mut self) -> Result<u32> {
        self.ice.read(DdcReg::CICSAT.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{MockGpio, MockSpi};
    use proptest::prelude::*;

    fn ice(id: u32) -> Ice<MockSpi, MockGpio> {
        let mut spi = MockSpi::default();
        spi.regs.insert(DdcReg::ID.into(), id);
        Ice::new(spi, None)
    }

    #[test]
    fn id_match() {
        assert!(RxAdc::new(&mut ice(0xADC5_0003)).is_loaded().unwrap());
        assert!(!RxAdc::new(&mut ice(0xADC4_0000)).is_loaded().unwrap());
        assert!(!RxAdc::new(&mut ice(0)).is_loaded().unwrap());
    }

    #[test]
    fn lo_increment() {
        let mut ice = ice(0);
        let mut ddc = RxAdc::new(&mut ice);
        assert_eq!(5_000_000, ddc.set_lo(5_000_000).unwrap());
        assert_eq!(5_000_000, ddc.lo().unwrap());
        let (spi, _) = ice.release();
        assert_eq!(0x66_6666, spi.regs[&u8::from(DdcReg::LO)]);
    }

    #[test]
    fn lo_limits() {
        assert_eq!(0x3FF_FFFF, hz_to_lo(49_999_999).unwrap());
        assert!(matches!(hz_to_lo(FSAMPLE), Err(Error::FrequencyRange(FSAMPLE))));
        assert!(hz_to_lo(u64::MAX).is_err());
        assert_eq!(0, hz_to_lo(0).unwrap());
    }

    #[test]
    fn gain_mux_saturation() {
        let mut ice = ice(0);
        let mut ddc = RxAdc::new(&mut ice);
        ddc.set_dac_mux(true).unwrap();
        ddc.set_if_gain(4).unwrap();
        assert_eq!(4, ddc.if_gain().unwrap());
        assert_eq!(0, ddc.cic_saturation().unwrap());
        let (mut spi, _) = ice.release();
        assert_eq!(1, spi.regs[&u8::from(DdcReg::DACMUX)]);
        spi.regs.insert(DdcReg::CICSAT.into(), 17);
        let mut ice = Ice::<_, MockGpio>::new(spi, None);
        assert_eq!(17, RxAdc::new(&mut ice).cic_saturation().unwrap());
    }

    proptest! {
        #[test]
        fn lo_readback_within_a_hertz(freq in 0..FSAMPLE) {
            let back = lo_to_hz(hz_to_lo(freq).unwrap());
            assert!(back.abs_diff(freq) <= 1);
        }
    }
}
