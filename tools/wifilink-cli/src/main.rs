//! WifiLink CLI tool
//!
//! Drives an AT-command Wi-Fi module attached to a serial port: bring it
//! up, inspect it, and fetch HTTP resources through it.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wifilink_client::prelude::*;
use wifilink_core::json;

#[derive(Parser)]
#[command(name = "wifilink")]
#[command(about = "WifiLink CLI - Drive an AT-command Wi-Fi module")]
#[command(version)]
struct Cli {
    /// Serial port the module is attached to
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Baud rate (overrides the config file)
    #[arg(short, long)]
    baud: Option<u32>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<String>,

    /// Access point SSID (overrides the config file)
    #[arg(long)]
    ssid: Option<String>,

    /// Access point passphrase (overrides the config file)
    #[arg(long)]
    passphrase: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Print the effective configuration as JSON
    Config,

    /// Send one raw command and print the matching response
    At {
        /// Command without the line terminator (e.g., AT+GMR)
        command: String,
        /// Token that ends the response
        #[arg(short, long, default_value = "OK")]
        expect: String,
        /// Timeout in milliseconds
        #[arg(short, long, default_value = "2000")]
        timeout: u64,
    },

    /// Run module initialization and join the access point
    Init,

    /// Show association, connection and link statistics
    Status,

    /// HTTP GET through the module
    Get {
        /// Host name
        host: String,
        /// Request path
        #[arg(default_value = "/")]
        path: String,
        /// Extra header lines (e.g., "Accept: application/json")
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Print only this key from a JSON body (first present key wins)
        #[arg(short, long)]
        key: Vec<String>,
        /// Skip initialization (module already joined)
        #[arg(long)]
        no_init: bool,
    },
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path))?;
            ClientConfig::from_json(&text)?
        }
        None => ClientConfig::default(),
    };

    if let Some(baud) = cli.baud {
        config.link.baud_rate = baud;
    }
    if let Some(ssid) = &cli.ssid {
        config.wifi.ssid = ssid.clone();
    }
    if let Some(passphrase) = &cli.passphrase {
        config.wifi.passphrase = passphrase.clone();
    }
    Ok(config)
}

fn open_link(cli: &Cli, config: ClientConfig) -> Result<LinkHandle<SerialPeripheral>> {
    let (irq, inbox) = irq_channel(config.link.queue_depth);
    let serial = SerialConfig::default().with_baud_rate(config.link.baud_rate);
    let port = SerialPeripheral::open(&cli.port, serial, irq)?;
    Ok(LinkHandle::new(port, inbox, config)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Ports => {
            let ports = SerialPeripheral::list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found.");
            }
            for port in ports {
                println!("  {}", port);
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::At {
            command,
            expect,
            timeout,
        } => {
            let link = open_link(&cli, config)?;
            let mut session = link.lock().await?;
            session.send_command(command).await?;
            let frame = session
                .wait_for(expect.as_bytes(), Duration::from_millis(*timeout))
                .await?;
            println!("{}", String::from_utf8_lossy(frame.bytes()).trim_end());
            frame.release();
        }

        Commands::Init => {
            let link = open_link(&cli, config)?;
            let report = link.initialize().await?;
            for (from, to) in &report.transitions {
                println!("  {} -> {}", from, to);
            }
            match report.station_ip {
                Some(ip) => println!("Station address: {}", ip),
                None => println!("No station address"),
            }
        }

        Commands::Status => {
            let timeout = Duration::from_millis(config.tcp.command_timeout_ms);
            let link = open_link(&cli, config)?;
            let mut session = link.lock().await?;

            session.expect("AT", token::OK, timeout).await?;
            match session.query_association().await? {
                Some(ssid) => println!("Associated with: {}", ssid),
                None => println!("Not associated"),
            }

            session.send_command("AT+CIPSTATUS").await?;
            let frame = session.wait_for(token::OK, timeout).await?;
            println!("{}", String::from_utf8_lossy(frame.bytes()).trim_end());
            frame.release();

            let stats = session.stats();
            println!(
                "Frames: {} captured, {} dropped, {} bytes truncated",
                stats.frames_captured, stats.frames_dropped, stats.bytes_truncated
            );
        }

        Commands::Get {
            host,
            path,
            headers,
            key,
            no_init,
        } => {
            let mut request = HttpRequest::get(host, path)?;
            for header in headers {
                request.add_header(header)?;
            }

            let link = open_link(&cli, config)?;
            if !no_init {
                let report = link.initialize().await?;
                info!(tag = "INIT", "station address {:?}", report.station_ip);
            }

            let body = link.http_get(&mut request).await?;
            link.lock().await?.tcp_disconnect().await?;

            if key.is_empty() {
                println!("{}", String::from_utf8_lossy(&body));
            } else {
                let keys: Vec<&str> = key.iter().map(String::as_str).collect();
                match json::get_string(&body, &keys) {
                    Ok(value) => println!("{}", value),
                    Err(_) => bail!("none of {:?} found in response body", keys),
                }
            }
        }
    }

    Ok(())
}
