#![deny(clippy::unwrap_used)]

use clap::{arg, command, value_parser};
use env_logger::Env;
use std::fmt;
use std::io::{ErrorKind, Stdout, Write};
use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_serial::SerialPortType;
use xdm1041ctrl::measurement::{FlattenReading, Reading};
use xdm1041ctrl::proto::command::Mode;
use xdm1041ctrl::proto::response::Ident;
use xdm1041ctrl::proto::{self, Result};
use xdm1041ctrl::{
    Device, DisplaySink, LinkConfig, PollConfig, Poller, DEFAULT_BAUDRATE, DEFAULT_TTY,
};

#[derive(Debug, Copy, Clone)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

impl clap::ValueEnum for OutputFormat {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Text, Self::Json, Self::Csv]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Text => clap::builder::PossibleValue::new("text"),
            Self::Json => clap::builder::PossibleValue::new("json"),
            Self::Csv => clap::builder::PossibleValue::new("csv"),
        })
    }
}

/// Prints readings to stdout in the selected format.
struct ConsoleSink {
    format: OutputFormat,
    counter: AtomicUsize,
    last_mode: StdMutex<Option<Mode>>,
    csv: StdMutex<Option<csv::Writer<Stdout>>>,
}

impl ConsoleSink {
    fn new(format: OutputFormat) -> Self {
        Self {
            format,
            counter: AtomicUsize::new(1),
            last_mode: StdMutex::new(None),
            csv: StdMutex::new(None),
        }
    }

    fn print(&self, reading: &Reading) -> std::io::Result<()> {
        let c = self.counter.fetch_add(1, Ordering::Relaxed);
        match self.format {
            OutputFormat::Text => {
                if let Ok(mut last) = self.last_mode.lock() {
                    if reading.mode.is_some() && *last != reading.mode {
                        *last = reading.mode;
                        if let Some(mode) = reading.mode {
                            println!("Measurement: [{}], unit: [{}]", mode, mode.unit());
                        }
                    }
                }
                println!("#{:0>4} {} {:#}", c, reading.taken.format("%H:%M:%S%.3f"), reading);
            }
            OutputFormat::Json => {
                let json = serde_json::to_string(reading)
                    .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
                let mut output = std::io::stdout();
                output.write_all(json.as_bytes())?;
                output.write_fmt(format_args!("\n"))?;
            }
            OutputFormat::Csv => {
                let mut guard = self
                    .csv
                    .lock()
                    .map_err(|_| std::io::Error::new(ErrorKind::Other, "CSV writer poisoned"))?;
                let writer = guard.get_or_insert_with(|| csv::Writer::from_writer(std::io::stdout()));
                writer
                    .serialize(FlattenReading::from(reading.clone()))
                    .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
                writer.flush()?;
            }
        }
        Ok(())
    }
}

impl DisplaySink for ConsoleSink {
    fn update(&self, reading: &Reading) {
        if let Err(err) = self.print(reading) {
            eprintln!("Output failed: {}", err);
        }
    }

    fn error(&self, err: &proto::ProtoError) {
        eprintln!("Error: {}", err);
    }
}

#[tokio::main]
async fn main() {
    let matches =
        command!() // requires `cargo` feature
            .arg(
                arg!(
                    -p --device <PORT> "Port for USB adapter"
                )
                .default_value(DEFAULT_TTY)
                .required(false)
                .value_parser(value_parser!(PathBuf)),
            )
            .arg(arg!(
                -d --debug ... "Turn debugging information on"
            ))
            .arg(
                arg!(
                    -b --baudrate <BAUDRATE> "Baudrate"
                )
                .default_value(DEFAULT_BAUDRATE.to_string())
                .value_parser(value_parser!(u32)),
            )
            .arg(
                arg!(
                    --timeout <MS> "Response timeout in milliseconds"
                )
                .default_value(LinkConfig::default().timeout.as_millis().to_string())
                .value_parser(value_parser!(u64).range(1..)),
            )
            .arg(
                arg!(
                    --settle <MS> "Settling time after changing the function, in milliseconds"
                )
                .default_value(LinkConfig::default().settle.as_millis().to_string())
                .value_parser(value_parser!(u64)),
            )
            .subcommand(clap::Command::new("ports").about("List serial ports"))
            .subcommand(clap::Command::new("ident").about("Device identification"))
            .subcommand(
                clap::Command::new("conf")
                    .about("Select measurement function")
                    .arg(arg!(<mode> "Measurement function").value_parser(value_parser!(Mode))),
            )
            .subcommand(
                clap::Command::new("mea")
                    .about("Get current measurement")
                    .arg(
                        arg!(--"mode" <mode> "Select measurement function first")
                            .value_parser(value_parser!(Mode)),
                    )
                    .arg(arg!(
                        --"loop" "Poll current measurement until interrupted"
                    ))
                    .arg(
                        arg!(--"interval" <MS> "Polling interval in milliseconds")
                            .default_value(PollConfig::default().interval.as_millis().to_string())
                            .value_parser(value_parser!(u64).range(1..)),
                    )
                    .arg(
                        arg!(--"max-failures" <N> "Stop polling after N failed measurements in a row")
                            .value_parser(value_parser!(u32).range(1..)),
                    )
                    .arg(
                        arg!(--"format" <fmt> "Output format")
                            .value_parser(value_parser!(OutputFormat)),
                    ),
            )
            .subcommand_required(true)
            .get_matches();

    let level = match matches.get_count("debug") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(e) = handle_args(&matches).await {
        let port = matches
            .get_one::<PathBuf>("device")
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match &e {
            proto::ProtoError::Serial(err) => {
                if err.kind() == tokio_serial::ErrorKind::NoDevice
                    || matches!(err.kind(), tokio_serial::ErrorKind::Io(ErrorKind::NotFound))
                {
                    eprintln!("{}: File not found", port);
                } else {
                    eprintln!("I/O Error: {} [device: {}]", err, port);
                }
            }
            proto::ProtoError::Io(err) => {
                if err.kind() == ErrorKind::NotFound {
                    eprintln!("{}: File not found", port);
                } else {
                    eprintln!("I/O Error: {} [device: {}]", err, port);
                }
            }
            proto::ProtoError::Timeout(_) => {
                eprintln!("{}, is the meter connected to {} and powered on?", e, port);
            }
            proto::ProtoError::Abort | proto::ProtoError::DeviceLost(_) => {
                eprintln!("Failed to communicate with device, aborting! ({})", e);
            }
            err => {
                eprintln!("Error: {}", err);
            }
        }
        exit(-1);
    }
}

async fn handle_args(matches: &clap::ArgMatches) -> Result<()> {
    if let Some(("ports", _)) = matches.subcommand() {
        return list_ports();
    }

    let baud_rate = matches
        .get_one::<u32>("baudrate")
        .unwrap_or(&DEFAULT_BAUDRATE);
    let defaults = LinkConfig::default();
    let config = LinkConfig {
        timeout: matches
            .get_one::<u64>("timeout")
            .map_or(defaults.timeout, |ms| Duration::from_millis(*ms)),
        settle: matches
            .get_one::<u64>("settle")
            .map_or(defaults.settle, |ms| Duration::from_millis(*ms)),
    };

    let Some(port_path) = matches.get_one::<PathBuf>("device") else {
        return Ok(());
    };
    let port = port_path.to_string_lossy();
    let mut device = Device::new(config);
    device.connect(&port, *baud_rate).await?;

    eprintln!("Connected to: {}\n", port_path.display());

    match matches.subcommand() {
        // Device ID
        Some(("ident", _args)) => {
            let id = device.query_identity().await?;
            match id.parse::<Ident>() {
                Ok(ident) => {
                    println!("Manufacturer: {}", ident.manufacturer);
                    println!("Model: {}", ident.model);
                    println!("Serial: {}", ident.serial.as_deref().unwrap_or("-"));
                    println!("Firmware: {}", ident.firmware.as_deref().unwrap_or("-"));
                }
                Err(_) => println!("Identity: {}", id),
            }
            device.disconnect().await?;
        }
        // Function
        Some(("conf", args)) => {
            if let Some(mode) = args.get_one::<Mode>("mode") {
                device.configure(*mode).await?;
                println!("OK");
            }
            device.disconnect().await?;
        }
        // Measurement
        Some(("mea", args)) => {
            if let Some(mode) = args.get_one::<Mode>("mode") {
                device.configure(*mode).await?;
            }

            let format = args
                .get_one::<OutputFormat>("format")
                .unwrap_or(&OutputFormat::Text);
            let sink = Arc::new(ConsoleSink::new(*format));

            if !args.get_flag("loop") {
                let reading = device.reading().await?;
                sink.update(&reading);
                device.disconnect().await?;
                return Ok(());
            }

            let config = PollConfig {
                interval: args
                    .get_one::<u64>("interval")
                    .map_or(PollConfig::default().interval, |ms| {
                        Duration::from_millis(*ms)
                    }),
                max_failures: args.get_one::<u32>("max-failures").copied(),
            };
            let device = Arc::new(Mutex::new(device));
            let mut poller = Poller::new(device.clone(), sink, config);
            poller.start();

            loop {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        res?;
                        break;
                    }
                    _ = tokio::time::sleep(config.interval) => {
                        if !poller.is_running() {
                            break;
                        }
                    }
                }
            }
            poller.stop().await;
            device.lock().await.disconnect().await?;
        }
        _ => {
            return Err(std::io::Error::new(
                ErrorKind::Unsupported,
                "Unsupported command line argument",
            )
            .into());
        }
    }

    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = tokio_serial::available_ports()?;
    if ports.is_empty() {
        eprintln!("No ports available");
    }
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "{}\tUSB {:04x}:{:04x} {} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.manufacturer.unwrap_or_default(),
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}
