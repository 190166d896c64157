//! Accelerator driver command-line front end.
//!
//! # Usage
//!
//! ```bash
//! # Discover accelerators of an in-memory backend
//! accelctl --server-type memory --arg 'accelerators=["nvme0","nvme1"]' discover
//!
//! # Install one, with chaos injection
//! accelctl --server-type chaotic --arg failure_rate=0.5 \
//!     --arg 'accelerators=["nvme0"]' install --id nvme0 --driver-type nvmf
//! ```

use std::io::Write;

use accel_driver::{DriverRegistry, Options};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Accelerator driver control
#[derive(Parser, Debug)]
#[command(name = "accelctl")]
#[command(about = "Run accelerator driver operations against a registered backend")]
#[command(version)]
struct Args {
    /// Server type of the driver to create
    #[arg(short, long, default_value = "memory")]
    server_type: String,

    /// Driver construction argument (`key=value`, value parsed as JSON)
    #[arg(short, long = "arg", value_parser = parse_key_value)]
    args: Vec<(String, Value)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered server types
    Drivers,
    /// Probe the backend for accelerators
    Discover,
    /// Known (installed) accelerators
    List,
    /// Install a driver for an accelerator
    Install {
        /// Accelerator id
        #[arg(long)]
        id: String,
        /// Driver type
        #[arg(long)]
        driver_type: String,
    },
    /// Uninstall a driver from an accelerator
    Uninstall {
        /// Accelerator id
        #[arg(long)]
        id: String,
        /// Driver type
        #[arg(long)]
        driver_type: String,
    },
    /// Apply options to all accelerators of a driver type
    Update {
        /// Driver type
        #[arg(long)]
        driver_type: String,
        /// Option (`key=value`, value parsed as JSON)
        #[arg(short, long = "option", value_parser = parse_key_value)]
        options: Vec<(String, Value)>,
    },
    /// Attach an instance to a free accelerator
    Attach {
        /// Instance id
        #[arg(long)]
        instance: String,
    },
    /// Detach an instance
    Detach {
        /// Instance id
        #[arg(long)]
        instance: String,
    },
}

/// Parse `key=value`. Values that are not valid JSON are taken as strings.
fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) =
        raw.split_once('=').ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }

    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let registry = DriverRegistry::builtin()?;

    if let Command::Drivers = args.command {
        let drivers: Vec<Value> = registry
            .descriptors()
            .iter()
            .map(|d| {
                serde_json::json!({
                    "server_type": d.server_type(),
                    "description": d.description(),
                })
            })
            .collect();
        return emit(&drivers);
    }

    let construction: Options = args.args.into_iter().collect();
    tracing::debug!(server_type = %args.server_type, "creating driver");
    let driver = registry.create(&args.server_type, &construction)?;

    match args.command {
        Command::Drivers => Ok(()),
        Command::Discover => emit(&driver.discover_accelerator()?),
        Command::List => emit(&driver.accelerator_list()?),
        Command::Install { id, driver_type } => {
            driver.install_accelerator(&id, &driver_type)?;
            emit(&serde_json::json!({ "installed": id, "driver_type": driver_type }))
        },
        Command::Uninstall { id, driver_type } => {
            driver.uninstall_accelerator(&id, &driver_type)?;
            emit(&serde_json::json!({ "uninstalled": id, "driver_type": driver_type }))
        },
        Command::Update { driver_type, options } => {
            let options: Options = options.into_iter().collect();
            driver.update(&driver_type, &options)?;
            emit(&driver.accelerator_list()?)
        },
        Command::Attach { instance } => emit(&driver.attach_instance(&instance)?),
        Command::Detach { instance } => emit(&driver.detach_instance(&instance)?),
    }
}

/// Write a result to stdout as pretty JSON.
fn emit<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
