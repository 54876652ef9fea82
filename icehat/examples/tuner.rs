// Tunes the R820T2 alone and dumps its shadow registers
use anyhow::{Context, Result};
use clap::Parser;
use icehat::{
    bus::LinuxI2c,
    config::{board, TunerConfig},
    r820t2::{tables, Tuner},
};

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long, default_value = board::I2C_DEV)]
    i2c: String,
    #[arg(short, long, default_value_t = board::R820T2.freq)]
    freq: u64,
    #[arg(short, long, default_value_t = board::R820T2.ppm_error)]
    ppm: i64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::builder().filter_level(log::LevelFilter::Debug).init();

    let bus = LinuxI2c::open(&args.i2c).with_context(|| format!("opening {}", args.i2c))?;
    let config = TunerConfig {
        freq: args.freq,
        ppm_error: args.ppm,
        ..board::R820T2
    };
    let tuner = Tuner::init(bus, &config)?;

    let band = tables::lookup(tuner.freq());
    println!("{} Hz, {:?}, band {} MHz", tuner.freq(), tuner.calibration(), band.mhz);
    for (row, regs) in tuner.regs().chunks(8).enumerate() {
        let hex: Vec<String> = regs.iter().map(|r| format!("{r:02x}")).collect();
        println!("{:02x}: {}", row * 8, hex.join(" "));
    }
    Ok(())
}
