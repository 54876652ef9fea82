//! Si5351 clock generator. Two outputs are used, each on its own PLL:
//! CLK0 from PLLA and CLK1 from PLLB, both with integer output dividers.
use crate::{
    bus::I2cBus,
    config::ClockConfig,
    registers::{ClkControl, ClockReg, PllReset, XTAL_LOAD_10PF},
    Error, Hz, Result,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(test)] use proptest_derive::Arbitrary;

pub mod multisynth;

pub use multisynth::{ChannelPlan, Multisynth, C_MAX};

pub const ADDR: u8 = 0x60;

#[rustfmt::skip]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(test, derive(Arbitrary))]
#[repr(u8)]
pub enum Channel {
    Clk0 = 0,
    Clk1 = 1,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Clk0, Channel::Clk1];

    #[rustfmt::skip]
    fn registers(self) -> (ClockReg, ClockReg, ClockReg) {
        match self {
            Channel::Clk0 => (ClockReg::MSNA, ClockReg::MS0, ClockReg::CLK0CTRL),
            Channel::Clk1 => (ClockReg::MSNB, ClockReg::MS1, ClockReg::CLK1CTRL),
        }
    }

    fn pll_reset(self) -> PllReset {
        match self {
            Channel::Clk0 => PllReset::PLLA,
            Channel::Clk1 => PllReset::PLLB,
        }
    }

    /// Powered up, integer mode, 8 mA, fed from its own multisynth and PLL.
    fn control(self) -> ClkControl {
        let control = ClkControl::MS_INT | ClkControl::SRC_MS | ClkControl::DRV_8MA;
        match self {
            Channel::Clk0 => control,
            Channel::Clk1 => control | ClkControl::MS_SRC,
        }
    }

    /// Active low bit in the output enable register.
    fn disable_bit(self) -> u8 {
        1 << u8::from(self)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub freq: Hz,
    pub vco_freq: Hz,
    pub pll: Option<Multisynth>,
}

pub struct ClockGen<B: I2cBus> {
    bus: B,
    xtal_freq: Hz,
    channels: [ChannelState; 2],
}

impl<B: I2cBus> ClockGen<B> {
    /// All outputs disabled and powered down, 10 pF crystal load.
    pub fn init(mut bus: B, config: &ClockConfig) -> Result<Self> {
        if let Err(e) = bus.write_reg(ADDR, ClockReg::OUTPUTENABLE.into(), 0xFF) {
            log::debug!("Si5351 not answering: {e}");
            return Err(Error::DeviceAbsent(ADDR));
        }
        bus.write_block(ADDR, ClockReg::CLK0CTRL.into(), &[ClkControl::PDN.bits(); 8])?;
        bus.write_reg(ADDR, ClockReg::XTALLOAD.into(), XTAL_LOAD_10PF)?;
        log::info!("Si5351 initialized");

        Ok(Self {
            bus,
            xtal_freq: config.xtal_freq,
            channels: [ChannelState::default(); 2],
        })
    }

    pub fn set_output_channel(&mut self, channel: Channel, freq: Hz) -> Result<ChannelPlan> {
        let plan = multisynth::plan(freq, self.xtal_freq)?;
        log::debug!("Si5351 {channel:?} {freq} Hz: {plan:?}");
        let (pll_reg, ms_reg, control_reg) = channel.registers();

        self.bus.write_block(ADDR, pll_reg.into(), &plan.pll.encode().0)?;
        self.bus.write_block(ADDR, ms_reg.into(), &multisynth::output_block(plan.ms_div, 0).0)?;
        self.bus.write_reg(ADDR, ClockReg::PLLRESET.into(), channel.pll_reset().bits())?;
        self.bus.write_reg(ADDR, control_reg.into(), channel.control().bits())?;
        self.enable_output(channel, true)?;

        self.channels[usize::from(u8::from(channel))] = ChannelState {
            freq,
            vco_freq: plan.vco,
            pll: Some(plan.pll),
        };
        Ok(plan)
    }

    /// Read-modify-write so the other outputs keep their state.
    pub fn enable_output(&mut self, channel: Channel, enable: bool) -> Result<()> {
        let oe = self.bus.read_reg(ADDR, ClockReg::OUTPUTENABLE.into())?;
        let oe = if enable {
            oe & !channel.disable_bit()
        } else {
            oe | channel.disable_bit()
        };
        self.bus.write_reg(ADDR, ClockReg::OUTPUTENABLE.into(), oe)
    }

    pub fn channel(&self, channel: Channel) -> &ChannelState {
        &self.channels[usize::from(u8::from(channel))]
    }

    pub fn vco_freq(&self, channel: Channel) -> Hz {
        self.channel(channel).vco_freq
    }

    pub fn xtal_freq(&self) -> Hz {
        self.xtal_freq
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

    fn clock(bus: &mut MockI2c) -> ClockGen<&mut MockI2c> {
        ClockGen::init(bus, &board::SI5351).unwrap()
    }

    #[test]
    fn init_sequence() {
        let mut bus = MockI2c::default().with_device(ADDR);
        let clk = clock(&mut bus);
        assert_eq!(0, clk.vco_freq(Channel::Clk0));
        assert_eq!(0, clk.vco_freq(Channel::Clk1));
        drop(clk);
        assert_eq!(
            vec![(3, vec![0xFF]), (16, vec![0x80; 8]), (183, vec![0xD2])],
            bus.writes_to(ADDR)
        );
    }

    #[test]
    fn absent() {
        let mut bus = MockI2c::default().with_tuner();
        assert!(matches!(
            ClockGen::init(&mut bus, &board::SI5351),
            Err(Error::DeviceAbsent(ADDR))
        ));
    }

    #[test]
    fn both_channels() {
        let mut bus = MockI2c::default().with_device(ADDR);
        let mut clk = clock(&mut bus);
        clk.set_output_channel(Channel::Clk0, 50_000_000).unwrap();
        assert_eq!(900_000_000, clk.vco_freq(Channel::Clk0));
        clk.set_output_channel(Channel::Clk1, 25_000_000).unwrap();
        assert_eq!(900_000_000, clk.vco_freq(Channel::Clk1));
        assert_eq!(50_000_000, clk.channel(Channel::Clk0).freq);
        drop(clk);

        let writes = bus.writes_to(ADDR);
        #[rustfmt::skip]
        assert_eq!(
            vec![
                (26,  vec![0xFF, 0xFF, 0x00, 0x10, 0x00, 0xF0, 0x00, 0x00]),
                (42,  vec![0x00, 0x01, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00]),
                (177, vec![0x20]),
                (16,  vec![0x4F]),
                (3,   vec![0xFE]),
                (34,  vec![0xFF, 0xFF, 0x00, 0x10, 0x00, 0xF0, 0x00, 0x00]),
                (50,  vec![0x00, 0x01, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00]),
                (177, vec![0x80]),
                (17,  vec![0x6F]),
                (3,   vec![0xFC]),
            ],
            &writes[3..]
        );
    }

    #[test]
    fn disable_keeps_other_output() {
        let mut bus = MockI2c::default().with_device(ADDR);
        let mut clk = clock(&mut bus);
        clk.set_output_channel(Channel::Clk0, 50_000_000).unwrap();
        clk.set_output_channel(Channel::Clk1, 25_000_000).unwrap();
        clk.enable_output(Channel::Clk0, false).unwrap();
        drop(clk);
        assert_eq!(0xFD, bus.reg(ADDR, 3));
    }

    #[test]
    fn rejected_frequency_writes_nothing() {
        let mut bus = MockI2c::default().with_device(ADDR);
        let mut clk = clock(&mut bus);
        assert!(matches!(
            clk.set_output_channel(Channel::Clk1, 1_000_000),
            Err(Error::FrequencyRange(1_000_000))
        ));
        assert_eq!(ChannelState::default(), *clk.channel(Channel::Clk1));
        drop(clk);
        assert_eq!(3, bus.writes.len());
    }

    proptest! {
        #[test]
        fn stored_vco_matches_plan(channel: Channel, freq in 3_515_626..=225_000_000u64) {
            let mut bus = MockI2c::default().with_device(ADDR);
            let mut clk = clock(&mut bus);
            let plan = clk.set_output_channel(channel, freq).unwrap();
            assert_eq!(plan.vco, clk.vco_freq(channel));
            assert_eq!(Some(plan.pll), clk.channel(channel).pll);
            assert_eq!(plan.vco, plan.pll.output(clk.xtal_freq()));
        }
    }
}
