// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use steno_flash::cmd::{do_debug, do_info, do_mode, do_reset, do_verify};
use steno_flash::config::{Config, FlashOverrides};
use steno_flash::transport::DEFAULT_BAUD;
use steno_flash::{Connector, FirmwareImage, FlashConfig, Flasher, SerialConnector};
use steno_proto::FlashRegion;

#[derive(Debug, Parser)]
enum Command {
    /// Installs a raw application binary and boots into it
    Flash { image: PathBuf },
    /// Prints the identification string of whatever is answering
    Info,
    /// Reports whether the bootloader or the application is running
    Mode,
    /// Reboots the device into the bootloader if it isn't there already
    EnterBootloader,
    /// Resets the device
    Reset {
        /// Stay in the bootloader after the reset
        #[clap(long)]
        bootloader: bool,
    },
    /// Asks the bootloader for the CRC over the start of the image region
    Verify {
        /// Number of words to check; the whole region if omitted
        #[clap(long, value_parser = parse_int::parse::<u32>)]
        words: Option<u32>,
    },
    /// Writes the image exactly as it will be programmed, trailer included.
    /// Does not talk to a device.
    Seal {
        image: PathBuf,
        #[clap(short, long)]
        out: PathBuf,
    },
    /// Sends a DEBUG request with the given payload bytes
    Debug {
        #[clap(value_parser = parse_int::parse::<u8>)]
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Parser)]
#[clap(name = "steno_flash", about = "Stenosaurus firmware updater")]
struct Args {
    /// Serial port the device enumerates as
    #[clap(short, long)]
    port: Option<String>,
    /// Ignored by USB CDC devices, but some hosts insist on one
    #[clap(short, long)]
    baud: Option<u32>,
    /// Bound on each request/response exchange
    #[clap(long)]
    timeout_ms: Option<u64>,
    /// How many times to try reaching the bootloader
    #[clap(long)]
    attempts: Option<u32>,
    /// Pause between attempts to reach the bootloader
    #[clap(long)]
    backoff_ms: Option<u64>,
    /// TOML file with serial, retry and region settings
    #[clap(long)]
    config: Option<PathBuf>,
    /// Log every packet
    #[clap(short, long)]
    verbose: bool,
    #[clap(subcommand)]
    cmd: Command,
}

/// Settings after merging defaults, the config file and the command line.
struct Settings {
    port: Option<String>,
    baud: u32,
    region: FlashRegion,
    flash: FlashConfig,
}

impl Settings {
    fn new(args: &Args) -> Result<Settings> {
        let cfg = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        let flash = cfg.flash_config_with(FlashOverrides {
            attempts: args.attempts,
            backoff_ms: args.backoff_ms,
            timeout_ms: args.timeout_ms,
        });

        Ok(Settings {
            port: args.port.clone().or(cfg.serial.port.clone()),
            baud: args.baud.or(cfg.serial.baud).unwrap_or(DEFAULT_BAUD),
            region: cfg.region()?,
            flash,
        })
    }

    fn connector(&self) -> Result<SerialConnector> {
        let Some(port) = &self.port else {
            bail!("no serial port given; use --port or set serial.port in the config");
        };
        Ok(SerialConnector::new(port.as_str(), self.baud, self.flash.timeout))
    }

    fn flasher(&self) -> Result<Flasher<SerialConnector>> {
        Ok(Flasher::new(self.connector()?, self.flash).with_region(self.region))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "trace" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let settings = Settings::new(&args)?;

    match &args.cmd {
        Command::Flash { image } => {
            settings
                .flasher()?
                .flash(image)
                .with_context(|| format!("failed to flash {}", image.display()))?;
            println!("{}: {} installed", "OK".green(), image.display());
        }
        Command::Info => {
            let mut transport = settings.connector()?.open()?;
            let text = do_info(&mut transport)?;
            println!("{}", String::from_utf8_lossy(text.as_bytes()));
        }
        Command::Mode => {
            let mut transport = settings.connector()?.open()?;
            if do_mode(&mut transport)? {
                println!("bootloader");
            } else {
                println!("application");
            }
        }
        Command::EnterBootloader => {
            settings.flasher()?.enter_bootloader()?;
            println!("{}: bootloader is running", "OK".green());
        }
        Command::Reset { bootloader } => {
            let mut transport = settings.connector()?.open()?;
            do_reset(&mut transport, *bootloader).context("RESET failed")?;
            println!("reset requested");
        }
        Command::Verify { words } => {
            let words = words.unwrap_or(settings.region.word_count());
            let mut transport = settings.connector()?.open()?;
            let crc = do_verify(&mut transport, words).context("VERIFY failed")?;
            println!("crc over {} words: {:#010x}", words, crc);
        }
        Command::Seal { image, out } => {
            let image_path = image;
            let image = FirmwareImage::read(image_path, settings.region)?;

            let mut f = std::fs::OpenOptions::new()
                .write(true)
                .truncate(true)
                .create(true)
                .open(out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            f.write_all(image.sealed())?;

            println!(
                "{} -> {}: {} data words, crc {:#010x}, region crc {:#010x}",
                image_path.display(),
                out.display(),
                image.data_words(),
                image.crc(),
                image.region_crc()
            );
        }
        Command::Debug { bytes } => {
            if bytes.len() > steno_proto::packet::DEBUG_PAYLOAD_SIZE {
                println!(
                    "{}: only the first {} bytes are sent",
                    "WARNING".yellow(),
                    steno_proto::packet::DEBUG_PAYLOAD_SIZE
                );
            }
            let mut transport = settings.connector()?.open()?;
            do_debug(&mut transport, bytes).context("DEBUG failed")?;
        }
    }

    Ok(())
}
