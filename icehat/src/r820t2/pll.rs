//! Fractional-N LO synthesis.
//!
//! The VCO runs between 1.77 and 3.9 GHz and is divided by 2^(d+1) to reach
//! the LO. The feedback divider is an integer part `nint` plus a 16 bit
//! sigma-delta word in units of xtal / 2^16.
use crate::{Error, Hz, Result};
#[cfg(test)] use proptest::prelude::*;

pub const VCO_MIN: Hz = 1_770_000_000;
pub const VCO_MAX: Hz = 3_900_000_000;
pub const MAX_DIVIDER: u8 = 4;
/// Subtracted from `nint` before it is split into NI/SI.
const NINT_OFFSET: u8 = 13;

/// Smallest output divider that puts the VCO in range.
pub fn vco_divider(freq: Hz) -> Option<u8> {
    (0..=MAX_DIVIDER).find(|div| {
        freq.checked_mul(2 << div)
            .is_some_and(|vco| (VCO_MIN..=VCO_MAX).contains(&vco))
    })
}

/// Greedy 16 bit allocation of `frac` against halving fractions of `pll_ref`.
pub fn sigma_delta(mut frac: u64, pll_ref: u64) -> u16 {
    let mut sdm = 0;
    for n in 0..16 {
        let con = pll_ref >> n;
        if frac >= con {
            sdm |= 0x8000 >> n;
            frac -= con;
            if frac == 0 {
                break;
            }
        }
    }
    sdm
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllParameters {
    pub output_divider: u8,
    /// Feedback integer divider, before the offset.
    pub nint: u8,
    /// `None` runs the PLL integer-N.
    pub sdm: Option<u16>,
}

impl PllParameters {
    pub fn compute(freq: Hz, xtal: Hz) -> Result<Self> {
        if xtal == 0 {
            return Err(Error::FrequencyRange(freq));
        }
        let output_divider = vco_divider(freq).ok_or(Error::FrequencyRange(freq))?;
        let vco = freq << (output_divider + 1);
        let pll_ref = xtal >> 1;
        // half an SDM LSB, rounds nint and the fraction to nearest
        let eps = pll_ref >> 16;

        let nint = (vco + eps) / xtal;
        let frac = vco + eps - nint * xtal;
        let sdm = (frac != eps).then(|| sigma_delta(frac, pll_ref));

        let nint = u8::try_from(nint)
            .ok()
            .filter(|n| (NINT_OFFSET..=NINT_OFFSET + 0x7F).contains(n))
            .ok_or(Error::FrequencyRange(freq))?;

        Ok(Self {
            output_divider,
            nint,
            sdm,
        })
    }

    pub fn ni(&self) -> u8 {
        (self.nint - NINT_OFFSET) >> 2
    }

    pub fn si(&self) -> u8 {
        (self.nint - NINT_OFFSET) & 3
    }

    /// R20 value: NI in bits 5:0, SI in bits 7:6.
    pub fn pll_int_reg(&self) -> u8 {
        self.ni() + (self.si() << 6)
    }

    pub fn vco(&self, xtal: Hz) -> Hz {
        ((u64::from(self.nint) << 16) + u64::from(self.sdm.unwrap_or(0))) * xtal >> 16
    }

    /// LO actually synthesized.
    pub fn frequency(&self, xtal: Hz) -> Hz {
        self.vco(xtal) >> (self.output_divider + 1)
    }
}

#[cfg(test)]
const XTAL: Hz = 28_800_000;

#[test]
fn fractional_lo() {
    // 149 MHz LO after the -48 ppm crystal correction
    let p = PllParameters::compute(148_992_848, XTAL).unwrap();
    assert_eq!(3, p.output_divider);
    assert_eq!(2_383_885_568u64, 148_992_848u64 << 4);
    assert_eq!(82, p.nint);
    assert_eq!(17, p.ni());
    assert_eq!(1, p.si());
    assert_eq!(0x51, p.pll_int_reg());
    assert_eq!(Some(50_712), p.sdm);
}

#[test]
fn integer_lo() {
    let p = PllParameters::compute(144_000_000, XTAL).unwrap();
    assert_eq!(3, p.output_divider);
    assert_eq!(80, p.nint);
    assert_eq!(208, p.pll_int_reg());
    assert_eq!(None, p.sdm);
    assert_eq!(144_000_000, p.frequency(XTAL));
}

#[test]
fn calibration_lo() {
    let p = PllParameters::compute(88_000_000, XTAL).unwrap();
    assert_eq!(4, p.output_divider);
    assert_eq!(97, p.nint);
    assert_eq!(Some(50_972), p.sdm);
}

#[test]
fn out_of_range() {
    assert_eq!(None, vco_divider(1_950_000_001));
    assert_eq!(Some(0), vco_divider(1_950_000_000));
    assert_eq!(None, vco_divider(55_312_499));
    assert_eq!(Some(4), vco_divider(55_312_500));
    assert_eq!(None, vco_divider((1 << 63) + 1_000_000_000));
    assert!(matches!(
        PllParameters::compute(2_000_000_000, XTAL),
        Err(Error::FrequencyRange(2_000_000_000))
    ));
    assert!(matches!(
        PllParameters::compute(10_000_000, XTAL),
        Err(Error::FrequencyRange(10_000_000))
    ));
    assert!(matches!(
        PllParameters::compute(144_000_000, 0),
        Err(Error::FrequencyRange(144_000_000))
    ));
}

#[cfg(test)]
proptest! {
    #[test]
    fn smallest_divider(freq in 55_312_500..=1_950_000_000u64) {
        let div = vco_divider(freq).unwrap();
        assert!((VCO_MIN..=VCO_MAX).contains(&(freq << (div + 1))));
        for smaller in 0..div {
            assert!(!(VCO_MIN..=VCO_MAX).contains(&(freq << (smaller + 1))));
        }
    }

    #[test]
    fn no_divider_above_range(freq in 1_950_000_001..8_000_000_000u64) {
        assert_eq!(None, vco_divider(freq));
    }

    #[test]
    fn sigma_delta_deterministic(frac in 0..XTAL) {
        let sdm = sigma_delta(frac, XTAL >> 1);
        assert_eq!(sdm, sigma_delta(frac, XTAL >> 1));
        // allocated weight never exceeds the remainder
        let weight: u64 = (0..16)
            .filter(|n| sdm & (0x8000 >> n) != 0)
            .map(|n| (XTAL >> 1) >> n)
            .sum();
        assert!(weight <= frac);
        assert!(frac - weight <= XTAL >> 15);
    }

    #[test]
    fn vco_within_half_lsb(freq in 55_312_500..=1_950_000_000u64) {
        let p = PllParameters::compute(freq, XTAL).unwrap();
        let vco = freq << (p.output_divider + 1);
        assert!(p.vco(XTAL).abs_diff(vco) <= XTAL >> 16);
    }
}
