use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use zav_terminal::device::{ZavDevice, PROGRESS_INTERVAL};
use zav_terminal::protocol::IgniteTarget;
use zav_terminal::transport::{self, SerialConfig, BAUD_RATE};
use zav_terminal::{export, filter, logging, readout, DriverError};

#[derive(Parser, Debug)]
#[command(name = "zav", about = "Serial ground terminal for Zenith avionics flight computers")]
struct Args {
    /// Serial port the flight computer is attached to (e.g. /dev/ttyUSB0, COM3)
    #[arg(short, long, global = true)]
    port: Option<String>,
    /// Baud rate
    #[arg(long, global = true, default_value_t = BAUD_RATE)]
    baud: u32,
    /// Read timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<f64>,
    /// Long read timeouts for stepping through firmware in a debugger
    #[arg(long, global = true)]
    debug: bool,
    /// Directory the `output/` tree is created in
    #[arg(long, global = true, default_value = ".")]
    output_root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// Ping the device and time the response
    Ping,
    /// Identify the connected controller and firmware
    Connect,
    /// Fire an ematch or check continuity
    Ignite {
        #[command(subcommand)]
        target: IgniteCommand,
    },
    /// External flash access
    Flash {
        #[command(subcommand)]
        action: FlashCommand,
    },
    /// Sensor readouts
    Sensor {
        #[command(subcommand)]
        action: SensorCommand,
    },
    /// Dual-deploy firmware commands
    DualDeploy {
        #[command(subcommand)]
        action: DualDeployCommand,
    },
    /// Trim the erased tail off a previously exported extract
    Filter {
        input: PathBuf,
        /// Defaults to `<input>_filtered.txt`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum IgniteCommand {
    Main,
    Drogue,
    Cont,
}

#[derive(Subcommand, Debug)]
enum FlashCommand {
    Enable,
    Disable,
    Status,
    Erase,
    /// Read 1-31 bytes
    Read {
        #[arg(short, long, value_parser = parse_address)]
        address: u32,
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u8).range(1..=31))]
        count: u8,
    },
    /// Write 1-31 bytes
    Write {
        #[arg(short, long, value_parser = parse_address)]
        address: u32,
        #[arg(short, long = "byte", value_parser = parse_byte, num_args = 1..=31, required = true)]
        bytes: Vec<u8>,
        /// Enable flash writes for this command and disable them afterwards
        #[arg(long)]
        unprotect: bool,
    },
    /// Dump the whole chip to output/extract/
    Extract {
        /// Keep the erased tail instead of filtering it out
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SensorCommand {
    /// Read every sensor once
    Dump,
    /// Stream the named sensors
    Poll {
        #[arg(required = true)]
        sensors: Vec<String>,
    },
    /// List the controller's sensors
    List,
}

#[derive(Subcommand, Debug)]
enum DualDeployCommand {
    Status,
    /// Download the flight log to output/dual-deploy/
    Extract,
}

/// Decimal or `0x`-prefixed hex.
fn parse_number(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("{s:?}: {e}"))
}

fn parse_address(s: &str) -> std::result::Result<u32, String> {
    let address = parse_number(s)?;
    if address > zav_terminal::codec::MAX_FLASH_ADDRESS {
        return Err(format!("{s}: flash addresses are 24 bits"));
    }
    Ok(address)
}

fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    u8::try_from(parse_number(s)?).map_err(|_| format!("{s}: not a byte"))
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    logging::init_rust_logging();
    let args = Args::parse();

    match &args.command {
        Command::Ports => {
            for port in transport::list_ports()? {
                println!("{port}");
            }
            return Ok(());
        }
        Command::Filter { input, output } => return filter_file(input, output.as_deref()),
        _ => {}
    }

    let config = serial_config(&args);
    let mut device = ZavDevice::open(&config)
        .with_context(|| format!("Failed to open serial port {}", config.port))?;

    if let Command::Ping = args.command {
        println!("Pinging ...");
        println!("{}", device.ping()?);
        return Ok(());
    }

    let state = device.connect().context("Controller connection was unsuccessful")?;
    match args.command {
        Command::Connect => {
            println!("Connection established with {}", state.profile);
            println!("Firmware: {}", state.firmware);
        }
        Command::Ignite { target } => ignite(&mut device, target)?,
        Command::Flash { action } => flash(&mut device, action, &args.output_root)?,
        Command::Sensor { action } => sensor(&mut device, action)?,
        Command::DualDeploy { action } => dual_deploy(&mut device, action, &args.output_root)?,
        Command::Ports | Command::Ping | Command::Filter { .. } => {}
    }
    device.disconnect();
    Ok(())
}

fn serial_config(args: &Args) -> SerialConfig {
    let mut config = match &args.port {
        Some(port) => SerialConfig::new(port.as_str()),
        None => SerialConfig::default(),
    }
    .with_env_overrides();
    config.baud_rate = args.baud;
    if args.debug {
        config = config.debug();
    }
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs_f64(secs);
    }
    config
}

fn ignite(device: &mut ZavDevice, target: IgniteCommand) -> Result<()> {
    let target = match target {
        IgniteCommand::Main => IgniteTarget::Main,
        IgniteCommand::Drogue => IgniteTarget::Drogue,
        IgniteCommand::Cont => {
            let (continuity, status) = device.continuity()?;
            println!("{continuity}");
            match status {
                Some(status) if !status.is_success() => println!("{status}"),
                Some(_) => {}
                None => println!("No status received after continuity check"),
            }
            return Ok(());
        }
    };
    println!("{}", device.ignite(target)?);
    Ok(())
}

fn flash(device: &mut ZavDevice, action: FlashCommand, root: &Path) -> Result<()> {
    match action {
        FlashCommand::Enable => {
            device.flash_enable()?;
            println!("Flash write enabled");
        }
        FlashCommand::Disable => {
            device.flash_disable()?;
            println!("Flash write disabled");
        }
        FlashCommand::Status => {
            let register = device.flash_status()?;
            println!("Status register contents: \n");
            println!("{register}");
        }
        FlashCommand::Erase => {
            device.flash_erase()?;
            println!("Flash erase successful");
        }
        FlashCommand::Read { address, count } => {
            let bytes = device.flash_read(address, count)?;
            println!("Received bytes: \n");
            println!("{bytes:02X?}");
        }
        FlashCommand::Write {
            address,
            bytes,
            unprotect,
        } => {
            if unprotect {
                device.flash_enable()?;
            }
            let written = device.flash_write(address, &bytes);
            if unprotect {
                device.flash_disable()?;
            }
            match written {
                Err(DriverError::ProtocolPrecondition(_)) => {
                    anyhow::bail!("Flash write has not been enabled, pass --unprotect")
                }
                other => other?,
            }
            println!("Flash write successful");
        }
        FlashCommand::Extract { all } => {
            let extract = device.flash_extract(progress)?;
            eprintln!();
            let frames = if all {
                &extract.frames[..]
            } else {
                extract.valid_frames().unwrap_or(&[])
            };
            if frames.is_empty() {
                println!("No recorded data on flash");
            }
            let path = export::save_extract(root, extract.profile, export::today(), frames)?;
            println!("Flash extract successful");
            println!("Extract time: {:.3} sec", extract.elapsed.as_secs_f64());
            println!("Saved {} frames to {}", frames.len(), path.display());
        }
    }
    Ok(())
}

fn sensor(device: &mut ZavDevice, action: SensorCommand) -> Result<()> {
    let profile = device.profile()?;
    match action {
        SensorCommand::Dump => {
            let readouts = device.sensor_dump()?;
            println!("Sensor readouts:");
            for (key, value) in readouts.iter() {
                println!("\t{}", readout::format_readout(profile, key, value)?);
            }
        }
        SensorCommand::Poll { sensors } => {
            let keys: Vec<&str> = sensors.iter().map(String::as_str).collect();
            device.sensor_poll(&keys, |readouts| {
                let line: Vec<String> = readouts
                    .iter()
                    .filter_map(|(key, value)| readout::format_readout(profile, key, value).ok())
                    .collect();
                println!("{}", line.join("\t"));
            })?;
        }
        SensorCommand::List => {
            println!("Sensors on {profile}:");
            for (key, description) in device.sensor_list()? {
                println!("\t{key:<6} {description}");
            }
        }
    }
    Ok(())
}

fn dual_deploy(device: &mut ZavDevice, action: DualDeployCommand, root: &Path) -> Result<()> {
    match action {
        DualDeployCommand::Status => {
            for (label, value, unit) in device.dual_deploy_status()?.entries() {
                println!("{label}: {value} {unit}");
            }
        }
        DualDeployCommand::Extract => {
            let extract = device.dual_deploy_extract(progress)?;
            eprintln!();
            if !extract.header_valid {
                println!("Warning: flight header is not valid");
            }
            let dir = export::save_dual_deploy(
                root,
                export::today(),
                &extract.header.entries(),
                &extract.frames,
            )?;
            if let Some(apogee) = extract.apogee() {
                println!("Apogee: {apogee:.1} ft");
            }
            println!("Saved {} frames to {}", extract.frames.len(), dir.display());
        }
    }
    Ok(())
}

fn filter_file(input: &Path, output: Option<&Path>) -> Result<()> {
    let rows = export::load_rows(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let Some(kept) = filter::valid_prefix(&rows) else {
        println!("No recorded data in {}", input.display());
        return Ok(());
    };

    let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        input.with_file_name(format!("{stem}_filtered.txt"))
    });
    export::save_rows(&output, kept)?;
    println!("Kept {} of {} rows, saved to {}", kept.len(), rows.len(), output.display());
    Ok(())
}

fn progress(done: usize, total: usize) {
    if done % (PROGRESS_INTERVAL * 10) == 0 {
        eprint!("\rReading block {done} of {total}...");
        let _ = std::io::stderr().flush();
    }
}
