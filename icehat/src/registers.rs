/* Register and frame definitions for the FPGA, R820T2 and Si5351
 *
 * Addresses only. Reset values and shadow state live with the drivers that
 * own them.
 * */
// FIXME: rustfmt enum_discrim_align_threshold when it gets out of nightly
//        instead of rustfmt::skip
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(test)] use proptest::prelude::*;

// newtypes to placate the orphan rule
// registers are big endian
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reg<const S: usize>(pub [u8; S]);
pub type Reg32 = Reg<4>;

impl From<u32> for Reg32 {
    fn from(item: u32) -> Self {
        Self(item.to_be_bytes())
    }
}

impl From<Reg32> for u32 {
    fn from(item: Reg32) -> Self {
        Self::from_be_bytes(item.0)
    }
}

/// FPGA register access is a single 5 byte exchange: an address byte with
/// the read flag in bit 7, then 32 bits of big endian data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame(pub [u8; Frame::LEN]);

impl Frame {
    pub const LEN: usize = 5;
    const READ: u8 = 0x80;
    const ADDR: u8 = 0x7F;

    pub fn read(reg: u8) -> Self {
        Self([Self::READ | (reg & Self::ADDR), 0, 0, 0, 0])
    }

    pub fn write(reg: u8, data: u32) -> Self {
        let Reg(d) = Reg32::from(data);
        Self([reg & Self::ADDR, d[0], d[1], d[2], d[3]])
    }

    pub fn is_read(&self) -> bool {
        self.0[0] & Self::READ != 0
    }

    pub fn addr(&self) -> u8 {
        self.0[0] & Self::ADDR
    }

    /// Payload of a response or request, bytes 1..5.
    pub fn data(&self) -> u32 {
        Reg([self.0[1], self.0[2], self.0[3], self.0[4]]).into()
    }
}

/* DDC design register map */
#[rustfmt::skip]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DdcReg {
    ID     = 0x00,
    LO     = 0x10,
    DACMUX = 0x11,
    NSENA  = 0x12,
    CICSHF = 0x13,
    CICSAT = 0x15,
}

/* R820T2 registers touched by the tuner driver */
#[rustfmt::skip]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TunerReg {
    CHIPID    = 0x00,
    CALCODE   = 0x04,
    LNA       = 0x05,
    MIXER     = 0x07,
    IMRGAIN   = 0x08,
    IMRPHASE  = 0x09,
    FILTCAP   = 0x0A,
    FILTBW    = 0x0B,
    VGA       = 0x0C,
    CALCLK    = 0x0F,
    PLLDIV    = 0x10,
    SDMCTRL   = 0x12,
    PLLINT    = 0x14,
    SDMLO     = 0x15,
    SDMHI     = 0x16,
    OPENDRAIN = 0x17,
    RFMUX     = 0x1A,
    TFBAND    = 0x1B,
}

/* Si5351 register map, first byte of each group */
#[rustfmt::skip]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ClockReg {
    OUTPUTENABLE = 3,
    CLK0CTRL     = 16,
    CLK1CTRL     = 17,
    MSNA         = 26,
    MSNB         = 34,
    MS0          = 42,
    MS1          = 50,
    PLLRESET     = 177,
    XTALLOAD     = 183,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct ClkControl: u8 {
        const PDN     = 0x80;
        const MS_INT  = 0x40;
        const MS_SRC  = 0x20;
        const INV     = 0x10;
        const SRC_MS  = 0x0C;
        const DRV_8MA = 0x03;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct PllReset: u8 {
        const PLLB = 0x80;
        const PLLA = 0x20;
    }
}

/// Crystal load capacitance 10 pF, reserved bits as the datasheet requires.
pub const XTAL_LOAD_10PF: u8 = 0xD2;

// R820T2 shifts register readback out LSB first
const BITREV_NIBBLE: [u8; 16] = [
    0x0, 0x8, 0x4, 0xC, 0x2, 0xA, 0x6, 0xE,
    0x1, 0x9, 0x5, 0xD, 0x3, 0xB, 0x7, 0xF,
];

pub fn bitrev(v: u8) -> u8 {
    (BITREV_NIBBLE[usize::from(v & 0xF)] << 4) | BITREV_NIBBLE[usize::from(v >> 4)]
}

#[cfg(test)]
proptest! {
    #[test]
    fn reg32_u32_inverse(n: u32) {
        assert_eq!(n, u32::from(Reg32::from(n)));
    }

    #[test]
    fn bitrev_matches_reverse_bits(n: u8) {
        assert_eq!(n.reverse_bits(), bitrev(n));
        assert_eq!(n, bitrev(bitrev(n)));
    }

    #[test]
    fn frame_write(reg: u8, data: u32) {
        let f = Frame::write(reg, data);
        assert!(!f.is_read());
        assert_eq!(reg & 0x7F, f.addr());
        assert_eq!(data, f.data());
    }

    #[test]
    fn frame_read(reg: u8) {
        let f = Frame::read(reg);
        assert!(f.is_read());
        assert_eq!(reg & 0x7F, f.addr());
        assert_eq!(0, f.data());
    }
}

#[test]
fn frame_layout() {
    assert_eq!([0x10, 0xDE, 0xAD, 0xBE, 0xEF], Frame::write(0x10, 0xDEAD_BEEF).0);
    assert_eq!([0x95, 0, 0, 0, 0], Frame::read(0x15).0);
    assert_eq!([0x7F, 0, 0, 0, 1], Frame::write(0xFF, 1).0);
}

#[test]
fn clk_control_words() {
    let clk0 = ClkControl::MS_INT | ClkControl::SRC_MS | ClkControl::DRV_8MA;
    assert_eq!(0x4F, clk0.bits());
    assert_eq!(0x6F, (clk0 | ClkControl::MS_SRC).bits());
    assert_eq!(0x80, ClkControl::PDN.bits());
}
