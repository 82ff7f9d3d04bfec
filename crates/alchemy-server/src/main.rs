//! Alchemy audio effects server
//!
//! Captures audio from an input stream, runs it through the effect chain
//! and plays it back, under the control of a client speaking the JSON
//! control protocol on stdin/stdout.
//!
//! ## Command line flags
//!
//! - `--config <path>`: Config file (default: ~/.config/alchemy/server.yaml)
//! - `--terminal`: Human readable commands instead of JSON on stdin
//! - `--list-devices`: Print the detected devices and exit
//! - `--help`: Show usage

mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use alchemy_core::audio::DeviceManager;
use alchemy_core::config::{self, ServerConfig};
use alchemy_core::effect::EffectCatalog;
use alchemy_core::server::{ClientConnector, DspServer, StreamConnector};

use terminal::TerminalConnector;

const USAGE: &str = "\
usage: alchemy-server [--config <path>] [--terminal] [--list-devices]

  --config <path>   config file (default: ~/.config/alchemy/server.yaml)
  --terminal        read human readable commands instead of JSON
  --list-devices    print detected devices and exit
  --help            show this message";

struct Args {
    config: Option<PathBuf>,
    terminal: bool,
    list_devices: bool,
}

fn parse_args(args: &[String]) -> Result<Option<Args>> {
    let mut parsed = Args {
        config: None,
        terminal: false,
        list_devices: false,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--terminal" => parsed.terminal = true,
            "--list-devices" => parsed.list_devices = true,
            "--help" | "-h" => return Ok(None),
            other => bail!("unknown argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(Some(parsed))
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&args)? else {
        println!("{}", USAGE);
        return Ok(());
    };

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("alchemy-server starting up");

    let config_path = args
        .config
        .unwrap_or_else(|| config::default_config_path(config::CONFIG_FILE));
    let config: ServerConfig = config::load_config(&config_path);

    let mut devices = DeviceManager::from_config(&config.drivers);
    devices.acquire().context("no audio devices available")?;

    if args.list_devices {
        for device in devices.device_list() {
            println!("{} ({})", device.name, device.full_name);
            for stream in &device.input_streams {
                println!("  in  {:>3}  {}", stream.id, stream.name);
            }
            for stream in &device.output_streams {
                println!("  out {:>3}  {}", stream.id, stream.name);
            }
        }
        return Ok(());
    }

    let catalog = EffectCatalog::load_or_builtin(config.effects_catalog.as_deref());
    let delimiter = config.delimiter_byte();
    let server = DspServer::new(config, devices, catalog);
    server.apply_default_streams();

    let connector: Arc<dyn ClientConnector> = if args.terminal {
        Arc::new(TerminalConnector::new()?)
    } else {
        Arc::new(StreamConnector::new(
            "stdio",
            std::io::stdin(),
            std::io::stdout(),
            delimiter,
        )?)
    };
    server.listen_on(connector)?;

    server.start_listening();
    server.shutdown();

    log::info!("alchemy-server stopped");
    Ok(())
}
