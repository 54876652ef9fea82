//! Multisynth divider math. A divider is `a + b/c`; the chip takes it as
//! the P1/P2/P3 triple packed into 8 registers.
use crate::{div_nearest, registers::Reg, Error, Hz, Result};

/// Fractional denominator used for the PLL feedback dividers.
pub const C_MAX: u32 = (1 << 20) - 1;
pub const VCO_MIN: Hz = 600_000_000;
pub const VCO_MAX: Hz = 900_000_000;
/// Feedback divider limits, integer part.
const A_MIN: u64 = 15;
const A_MAX: u64 = 90;
/// Fixed point bits of the feedback ratio.
const RATIO_BITS: u32 = 21;

pub type Block = Reg<8>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Multisynth {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl Multisynth {
    pub fn integer(a: u32) -> Self {
        Self { a, b: 0, c: 1 }
    }

    /// (P1, P2, P3). A zero denominator is taken as integer mode; the chip
    /// floors P1 at zero, which is `a + b/c` below 4.
    pub fn params(&self) -> (u32, u32, u32) {
        if self.b == 0 || self.c == 0 {
            (self.a.saturating_mul(128).saturating_sub(512), 0, self.c)
        } else {
            let (a, b, c) = (u64::from(self.a), u64::from(self.b), u64::from(self.c));
            // floor(128 * b / c)
            let frac = ((b << 20) / c) >> (20 - 7);
            let p1 = ((a << 7) + frac).saturating_sub(512);
            let p2 = (b << 7) - c * frac;
            (p1 as u32, p2 as u32, self.c)
        }
    }

    pub fn encode(&self) -> Block {
        let (p1, p2, p3) = self.params();
        Reg([
            (p3 >> 8) as u8,
            p3 as u8,
            ((p1 >> 16) & 0x03) as u8,
            (p1 >> 8) as u8,
            p1 as u8,
            (((p3 >> 12) & 0xF0) | ((p2 >> 16) & 0x0F)) as u8,
            (p2 >> 8) as u8,
            p2 as u8,
        ])
    }

    /// `input * (a + b/c)`, rounded to the nearest Hz.
    pub fn output(&self, input: Hz) -> Hz {
        match u64::from(self.c) {
            0 => input * u64::from(self.a),
            c => div_nearest(input * (u64::from(self.a) * c + u64::from(self.b)), c),
        }
    }
}

/// Output divider block: integer mode, R divider in bits 6:4 of byte 2 and
/// the divide by 4 enable in bits 3:2.
pub fn output_block(ms_div: u32, r_div: u8) -> Block {
    let mut block = Multisynth::integer(ms_div).encode();
    block.0[2] |= (r_div & 0x07) << 4;
    if ms_div == 4 {
        block.0[2] |= 0x0C;
    }
    block
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelPlan {
    /// Even integer output divider.
    pub ms_div: u32,
    /// PLL feedback divider, denominator `C_MAX`.
    pub pll: Multisynth,
    /// VCO the feedback divider actually produces.
    pub vco: Hz,
}

/// Largest even output divider keeping the VCO at or under 900 MHz, then
/// the feedback ratio to reach it from `xtal`.
pub fn plan(freq: Hz, xtal: Hz) -> Result<ChannelPlan> {
    if xtal == 0 {
        return Err(Error::FrequencyRange(freq));
    }
    let ratio = VCO_MAX.checked_div(freq).ok_or(Error::FrequencyRange(freq))?;
    if !(4..=0xFF).contains(&ratio) {
        return Err(Error::FrequencyRange(freq));
    }
    let ms_div = ratio & 0xFE;
    let target = freq * ms_div;

    let idiv = (target << RATIO_BITS) / xtal;
    let a = idiv >> RATIO_BITS;
    let b = (((idiv & ((1 << RATIO_BITS) - 1)) + 1) >> 1).min(u64::from(C_MAX));
    if !(A_MIN..=A_MAX).contains(&a) {
        return Err(Error::FrequencyRange(freq));
    }

    let pll = Multisynth {
        a: a as u32,
        b: b as u32,
        c: C_MAX,
    };
    let vco = pll.output(xtal);
    if !(VCO_MIN..=VCO_MAX).contains(&vco) {
        return Err(Error::FrequencyRange(freq));
    }
    Ok(ChannelPlan {
        ms_div: ms_div as u32,
        pll,
        vco,
    })
}
