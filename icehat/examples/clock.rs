// Programs the Si5351 outputs directly, without touching the FPGA or tuner
use anyhow::{Context, Result};
use clap::Parser;
use icehat::{
    bus::LinuxI2c,
    config::{board, ClockConfig},
    si5351::{Channel, ClockGen},
};

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long, default_value = board::I2C_DEV)]
    i2c: String,
    #[arg(long, default_value_t = board::SI5351.clk0)]
    clk0: u64,
    /// 0 leaves the output disabled
    #[arg(long, default_value_t = 0)]
    clk1: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::builder().filter_level(log::LevelFilter::Debug).init();

    let bus = LinuxI2c::open(&args.i2c).with_context(|| format!("opening {}", args.i2c))?;
    let config = ClockConfig {
        clk0: args.clk0,
        clk1: args.clk1,
        ..board::SI5351
    };
    let mut clock = ClockGen::init(bus, &config)?;

    for (channel, freq) in Channel::ALL.into_iter().zip([args.clk0, args.clk1]) {
        if freq == 0 {
            continue;
        }
        let plan = clock.set_output_channel(channel, freq)?;
        println!(
            "{channel:?}: {freq} Hz = {} Hz / {}, pll {:?}",
            plan.vco, plan.ms_div, plan.pll
        );
    }
    Ok(())
}
