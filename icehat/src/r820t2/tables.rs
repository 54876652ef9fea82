use crate::Hz;
#[cfg(test)] use proptest::prelude::*;

pub const REG_COUNT: usize = 0x20;
/// Registers below this are read only.
pub const WRITE_START: u8 = 5;

/// Power up image, also the initial contents of the shadow cache.
#[rustfmt::skip]
pub const INIT_REGS: [u8; REG_COUNT] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x90, 0x80, 0x60, // 05: LNA manual gain
    0x80, 0x40, 0xA8, 0x0F, 0x40, 0x63, 0x75, 0xF8, // 0A/0B: channel/HP filter
    0x7C, 0x83, 0x80, 0x00, 0x0F, 0x00, 0xC0, 0x30,
    0x48, 0xCC, 0x60, 0x00, 0x54, 0xAE, 0x0A, 0xC0,
];

/// Second IF filter register value, indexed by bits 5:4 of the bandwidth code.
pub const IF_BANDWIDTH_MODES: [u8; 4] = [0xE0, 0x80, 0x60, 0x00];

/// Tracking filter and RF mux settings for frequencies at or above `mhz`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyRange {
    pub mhz: u16,
    /// R23 bit 3
    pub open_d: u8,
    /// R26 bits 7:6 and 1:0
    pub rf_mux_ploy: u8,
    /// R27
    pub tf_c: u8,
}

#[rustfmt::skip]
pub const FREQ_RANGES: [FrequencyRange; 21] = [
    FrequencyRange { mhz:   0, open_d: 0x08, rf_mux_ploy: 0x02, tf_c: 0xDF },
    FrequencyRange { mhz:  50, open_d: 0x08, rf_mux_ploy: 0x02, tf_c: 0xBE },
    FrequencyRange { mhz:  55, open_d: 0x08, rf_mux_ploy: 0x02, tf_c: 0x8B },
    FrequencyRange { mhz:  60, open_d: 0x08, rf_mux_ploy: 0x02, tf_c: 0x7B },
    FrequencyRange { mhz:  65, open_d: 0x08, rf_mux_ploy: 0x02, tf_c: 0x69 },
    FrequencyRange { mhz:  70, open_d: 0x08, rf_mux_ploy: 0x02, tf_c: 0x58 },
    FrequencyRange { mhz:  75, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x44 },
    FrequencyRange { mhz:  80, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x44 },
    FrequencyRange { mhz:  90, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x34 },
    FrequencyRange { mhz: 100, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x34 },
    FrequencyRange { mhz: 110, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x24 },
    FrequencyRange { mhz: 120, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x24 },
    FrequencyRange { mhz: 140, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x14 },
    FrequencyRange { mhz: 180, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x13 },
    FrequencyRange { mhz: 220, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x13 },
    FrequencyRange { mhz: 250, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x11 },
    FrequencyRange { mhz: 280, open_d: 0x00, rf_mux_ploy: 0x02, tf_c: 0x00 },
    FrequencyRange { mhz: 310, open_d: 0x00, rf_mux_ploy: 0x41, tf_c: 0x00 },
    FrequencyRange { mhz: 450, open_d: 0x00, rf_mux_ploy: 0x41, tf_c: 0x00 },
    FrequencyRange { mhz: 588, open_d: 0x00, rf_mux_ploy: 0x40, tf_c: 0x00 },
    FrequencyRange { mhz: 650, open_d: 0x00, rf_mux_ploy: 0x40, tf_c: 0x00 },
];

/// Whole MHz by multiply and shift; 4295 / 2^32 is 1e-6 within 8 ppm.
pub fn to_mhz(freq: Hz) -> u64 {
    freq.saturating_mul(4295) >> 32
}

/// Highest entry whose threshold does not exceed `freq`.
pub fn lookup(freq: Hz) -> &'static FrequencyRange {
    let mhz = to_mhz(freq);
    let above = FREQ_RANGES.partition_point(|r| u64::from(r.mhz) <= mhz);
    // the first entry starts at 0 MHz so `above` is at least 1
    &FREQ_RANGES[above.saturating_sub(1)]
}

#[test]
fn thresholds_ascend() {
    assert_eq!(0, FREQ_RANGES[0].mhz);
    assert!(FREQ_RANGES.windows(2).all(|w| w[0].mhz < w[1].mhz));
}

#[test]
fn boundaries_inclusive() {
    assert_eq!(140, lookup(144_000_000).mhz);
    assert_eq!(0x14, lookup(144_000_000).tf_c);
    assert_eq!(140, lookup(140_000_000).mhz);
    assert_eq!(120, lookup(139_900_000).mhz);
    assert_eq!(0, lookup(0).mhz);
    assert_eq!(650, lookup(1_700_000_000).mhz);
}

#[cfg(test)]
proptest! {
    #[test]
    fn picks_highest_threshold_below(mhz in 0..2_000u64, offset in 0..900_000u64) {
        let freq = mhz * 1_000_000 + offset;
        let expected = FREQ_RANGES.iter().filter(|r| u64::from(r.mhz) <= mhz).last().unwrap();
        assert_eq!(expected, lookup(freq));
    }

    #[test]
    fn mhz_never_low(freq in 0..4_000_000_000u64) {
        let mhz = to_mhz(freq);
        assert!(mhz >= freq / 1_000_000);
        assert!(mhz <= freq / 1_000_000 + 1);
    }
}
