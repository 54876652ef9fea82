// Brings up the receive front end from a config file and reports its state
use anyhow::{Context, Result};
use clap::Parser;
use icehat::{
    bus::{GpioLines, LinuxI2c, SharedI2c},
    config::Config,
    frontend::FrontEnd,
    ice::Ice,
};
use spidev::Spidev;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(short, long, default_value = "/etc/icehat/icehat.toml")]
    config: PathBuf,
    /// Receive frequency in Hz, overrides the tuner setting
    #[arg(short, long)]
    freq: Option<u64>,
    /// LNA gain step, 0 to 15
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..16))]
    lna_gain: Option<u8>,
    /// Mixer gain step, 0 to 15
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..16))]
    mixer_gain: Option<u8>,
    /// VGA gain step, 0 to 15
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..16))]
    vga_gain: Option<u8>,
    #[arg(long)]
    lna_agc: Option<bool>,
    #[arg(long)]
    mixer_agc: Option<bool>,
    /// IF filter code: bits 3:0 channel filter, bits 5:4 filter mode
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..64))]
    bandwidth: Option<u8>,
    /// DDC CIC shift, 6 dB per step
    #[arg(long)]
    if_gain: Option<u8>,
    #[arg(short, long)]
    verbose: bool,
}

fn apply_gains(frontend: &mut FrontEnd<Spidev, GpioLines, LinuxI2c>, args: &Args) -> Result<()> {
    if let Some(shift) = args.if_gain {
        frontend.ddc().set_if_gain(shift)?;
    }
    let Some(tuner) = frontend.tuner_mut() else {
        let gains = [args.lna_gain, args.mixer_gain, args.vga_gain, args.bandwidth];
        if gains.iter().any(Option::is_some) || args.lna_agc.or(args.mixer_agc).is_some() {
            log::warn!("No tuner, ignoring tuner settings");
        }
        return Ok(());
    };
    if let Some(gain) = args.lna_gain {
        tuner.set_lna_gain(gain)?;
    }
    if let Some(gain) = args.mixer_gain {
        tuner.set_mixer_gain(gain)?;
    }
    if let Some(gain) = args.vga_gain {
        tuner.set_vga_gain(gain)?;
    }
    if let Some(enable) = args.lna_agc {
        tuner.set_lna_agc(enable)?;
    }
    if let Some(enable) = args.mixer_agc {
        tuner.set_mixer_agc(enable)?;
    }
    if let Some(bw) = args.bandwidth {
        tuner.set_if_bandwidth(bw)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::builder().filter_level(level).init();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let spi = icehat::open(&config.fpga.spi, config.fpga.spi_speed_hz)
        .with_context(|| format!("opening {}", config.fpga.spi.display()))?;
    let lines = GpioLines::open(&config.fpga.gpio_chip, &config.fpga.pins)
        .with_context(|| format!("requesting lines on {}", config.fpga.gpio_chip.display()))?;
    let i2c = LinuxI2c::open(&config.i2c.bus)
        .with_context(|| format!("opening {}", config.i2c.bus.display()))?;

    let ice = Ice::new(spi, Some(lines));
    let mut frontend = FrontEnd::bring_up(ice, SharedI2c::new(i2c), &config)
        .context("front end bring-up")?;

    if let Some(freq) = args.freq {
        let lo = frontend.tune(freq).with_context(|| format!("tuning to {freq} Hz"))?;
        log::info!("Tuned to {freq} Hz, DDC LO {lo} Hz");
    }

    apply_gains(&mut frontend, &args).context("applying gain settings")?;

    print!("{}", frontend.status()?);
    Ok(())
}
