// Loads an iCE40 bitstream and pokes the design's control registers
use anyhow::{Context, Result};
use clap::Parser;
use icehat::{
    bus::GpioLines,
    config::{board, Pins},
    ice::Ice,
    registers::Frame,
};
use std::path::PathBuf;

fn parse_int(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn parse_addr(s: &str) -> Result<u8, String> {
    let addr = parse_int(s).map_err(|e| e.to_string())?;
    u8::try_from(addr)
        .ok()
        .filter(|a| *a <= 0x7F)
        .ok_or_else(|| format!("{s} is not a 7 bit register address"))
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Bitstream to load into the FPGA
    bitstream: Option<PathBuf>,
    /// Read a control register
    #[arg(short, long, value_name = "ADDR", value_parser = parse_addr)]
    read: Option<u8>,
    /// Write DATA to a control register
    #[arg(short, long, num_args = 2, value_names = ["ADDR", "DATA"], value_parser = parse_int)]
    write: Option<Vec<u32>>,
    #[arg(short, long)]
    verbose: bool,
    #[arg(long, default_value = board::SPI_DEV)]
    spi: PathBuf,
    #[arg(long, default_value = board::GPIO_CHIP)]
    gpio_chip: PathBuf,
}

fn dump(label: &str, bytes: &[u8]) {
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
    eprintln!("{label}: {}", hex.join(" "));
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::builder().filter_level(level).init();

    let spi = icehat::open(&args.spi, board::SPI_SPEED_HZ)
        .with_context(|| format!("opening {}", args.spi.display()))?;
    // configuration lines are only claimed when loading a bitstream
    let lines = match args.bitstream {
        Some(_) => Some(
            GpioLines::open(&args.gpio_chip, &Pins::default())
                .with_context(|| format!("requesting lines on {}", args.gpio_chip.display()))?,
        ),
        None => None,
    };
    let mut ice = Ice::new(spi, lines);

    if let Some(path) = &args.bitstream {
        let done = ice
            .configure_file(path)
            .with_context(|| format!("sending {} to FPGA", path.display()))?;
        log::info!("Loaded {} bytes", done.bytes);
    }

    let frame = match (args.read, args.write.as_deref()) {
        (_, Some(&[addr, data])) => {
            let addr = u8::try_from(addr).context("register address")?;
            eprintln!("Write {addr:#04X} {data:#010X}");
            Some(Frame::write(addr, data))
        }
        (Some(addr), _) => {
            eprintln!("Read {addr:#04X}");
            Some(Frame::read(addr))
        }
        _ => None,
    };

    if let Some(tx) = frame {
        let mut rx = [0; Frame::LEN];
        ice.transfer(&tx.0, &mut rx).context("SPI register exchange")?;
        dump("Sent", &tx.0);
        dump("Received", &rx);
    }
    Ok(())
}
