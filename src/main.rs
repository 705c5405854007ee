use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use simbridge::bridge::{BridgeServer, BridgeSettings};
use simbridge::config::{Config, LoggingConfig};
use simbridge::modem::{AtCommand, AtFramer, CommandSink, ModemDevice, Record};
use simbridge::pdu;
use simbridge::publish::{JsonLinePublisher, LinkState, Publisher};

#[derive(Parser)]
#[command(name = "simbridge")]
#[command(about = "Forward SMS received by a serial cellular modem to a pub/sub broker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge
    Start {
        /// Modem serial port, overriding the config file (e.g., /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Decode one SMS-DELIVER PDU given as hex and print it as JSON
    Decode {
        pdu: String,
    },
    /// Check that the modem answers and report SIM status as JSON
    Probe {
        /// Modem serial port
        #[arg(short, long)]
        port: String,
        /// Baud rate
        #[arg(short = 'b', long, default_value_t = 115200)]
        baud: u32,
        /// Seconds to wait before giving up
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
    },
}

fn init_logging(verbose: u8, logging: Option<&LoggingConfig>) -> Result<()> {
    let log_level = match (verbose, logging) {
        (0, Some(cfg)) => cfg.level.as_str(),
        (0, None) => "info",
        (1, _) => "debug",
        _ => "trace",
    };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));
    if let Some(path) = logging.and_then(|l| l.file.as_deref()) {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow!("Failed to open log file {}: {}", path, e))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

async fn serve<P: Publisher>(settings: BridgeSettings, port: &str, baud: u32, publisher: P) -> Result<()> {
    let (device, input) = ModemDevice::open(port, baud).await?;
    // The JSON-lines publisher has no connection to lose
    let link = LinkState::new(true);
    let mut bridge = BridgeServer::new(settings, device, publisher, link);
    bridge.run(input).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { port } => {
            let config = Config::load(&cli.config).await?;
            init_logging(cli.verbose, Some(&config.logging))?;
            info!("Starting simbridge v{}", env!("CARGO_PKG_VERSION"));

            let port = port.unwrap_or_else(|| config.modem.port.clone());
            let settings = config.bridge_settings();
            match &config.publish.output {
                Some(path) => {
                    let publisher = JsonLinePublisher::append_to(path)
                        .await?
                        .with_topic_prefix(config.publish.topic_prefix);
                    serve(settings, &port, config.modem.baud_rate, publisher).await?;
                }
                None => {
                    let publisher = JsonLinePublisher::stdout().with_topic_prefix(config.publish.topic_prefix);
                    serve(settings, &port, config.modem.baud_rate, publisher).await?;
                }
            }
        }
        Commands::Init => {
            init_logging(cli.verbose, None)?;
            info!("Initializing new simbridge configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Decode { pdu: hex } => {
            init_logging(cli.verbose, None)?;
            let message = pdu::decode(hex.trim()).map_err(|e| anyhow!("Failed to decode PDU: {}", e))?;
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        Commands::Probe { port, baud, timeout } => {
            init_logging(cli.verbose, None)?;
            let ok = probe(&port, baud, timeout).await?;
            std::process::exit(if ok { 0 } else { 1 });
        }
    }

    Ok(())
}

async fn probe(port: &str, baud: u32, timeout: u64) -> Result<bool> {
    use tokio::time::{sleep, timeout as within, Duration, Instant};

    let (mut device, mut input) = ModemDevice::open(port, baud).await?;
    info!("Probing modem on {} @ {} baud", port, baud);
    let mut framer = AtFramer::default();
    let deadline = Instant::now() + Duration::from_secs(timeout);
    let mut responsive = false;
    let mut sim: Option<String> = None;
    let mut errors = 0u32;

    for command in [AtCommand::Attention, AtCommand::DisableEcho, AtCommand::SimStatus] {
        device.send(&command)?;
        sleep(Duration::from_millis(200)).await;
    }
    while Instant::now() < deadline && (!responsive || sim.is_none()) {
        let chunk = match within(Duration::from_millis(200), input.recv()).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                error!("Modem input closed during probe");
                break;
            }
            Err(_) => {
                if !responsive {
                    device.send(&AtCommand::Attention)?;
                }
                continue;
            }
        };
        if let Err(e) = framer.push(&chunk) {
            warn!("{}", e);
        }
        for record in framer.records() {
            match record {
                Record::Ok => responsive = true,
                Record::Status { tag, value } if tag == "CPIN" => {
                    responsive = true;
                    sim = Some(value);
                }
                Record::Error { .. } => errors += 1,
                _ => {}
            }
        }
    }

    let sim_ready = sim.as_deref() == Some("READY");
    if responsive && !sim_ready {
        warn!("Modem answered but the SIM is not ready; check PIN and seating");
    }
    let payload = serde_json::json!({
        "status": if responsive && sim_ready { "ok" } else { "incomplete" },
        "responsive": responsive,
        "sim": sim,
        "errors": errors,
        "port": device.port_name(),
        "baud": device.baud_rate(),
        "timeout_seconds": timeout,
    });
    println!("{}", payload);
    Ok(responsive && sim_ready)
}
