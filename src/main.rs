//! camlink - discover and query network video devices
//!
//! ```bash
//! camlink discover --subnet 192.168.1.0/24 --method scan --method hikvision
//! camlink types
//! camlink info --type hikvision --ip 192.168.1.64 -u admin -p secret
//! camlink streams --type onvif --ip 192.168.1.70 --port 8080
//! camlink snapshot --type hikvision --ip 192.168.1.64 --channel 1_1 -o still.jpg
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camlink::connector::{global as registry, Connector};
use camlink::{DiscoveryConfig, DiscoveryEngine, DiscoveryRequest};

#[derive(Parser, Debug)]
#[command(name = "camlink")]
#[command(about = "Discover and query IP cameras, DVRs and NVRs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search local networks for devices
    Discover {
        /// Discovery method (auto, scan, onvif, hikvision, dahua); repeatable
        #[arg(short, long = "method", default_value = "auto")]
        methods: Vec<String>,

        /// Subnet in CIDR notation; repeatable. Defaults to local interfaces
        #[arg(short, long = "subnet")]
        subnets: Vec<String>,

        /// Overall budget in seconds, fractions allowed
        #[arg(short, long, default_value = "5", value_parser = parse_seconds)]
        timeout: Duration,
    },

    /// List registered connector types
    Types,

    /// Show device information
    Info(DeviceArgs),

    /// List streams
    Streams(DeviceArgs),

    /// Resolve one stream URL
    StreamUrl {
        #[command(flatten)]
        device: DeviceArgs,

        /// Driver channel id (e.g. "1_1" for Hikvision, a profile token for ONVIF)
        #[arg(short, long)]
        channel: String,
    },

    /// Save one still image
    Snapshot {
        #[command(flatten)]
        device: DeviceArgs,

        #[arg(short, long)]
        channel: String,

        /// Output file
        #[arg(short, long, default_value = "snapshot.jpg")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct DeviceArgs {
    /// Connector type (see `camlink types`)
    #[arg(long = "type")]
    connector_type: String,

    #[arg(long)]
    ip: String,

    #[arg(long, default_value_t = 80)]
    port: u16,

    #[arg(short, long, env = "CAMLINK_USERNAME", default_value = "")]
    username: String,

    #[arg(short, long, env = "CAMLINK_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Driver option as key=value (rtsp_port=554, use_https=true, timeout=10); repeatable
    #[arg(short = 'x', long = "extra", value_parser = parse_extra)]
    extra: Vec<(String, Value)>,
}

impl DeviceArgs {
    fn connect_target(&self) -> Result<Box<dyn Connector>> {
        let extra: Map<String, Value> = self.extra.iter().cloned().collect();
        Ok(registry().create(
            &self.connector_type,
            &self.ip,
            self.port,
            &self.username,
            &self.password,
            extra,
        )?)
    }
}

fn parse_extra(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {}", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

fn parse_seconds(raw: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("expected seconds, got {}", raw))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid duration: {}", raw))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camlink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Discover {
            methods,
            subnets,
            timeout,
        } => {
            let engine = DiscoveryEngine::with_network(DiscoveryConfig::from_env());
            let candidates = engine
                .discover(DiscoveryRequest {
                    methods,
                    subnets,
                    timeout,
                })
                .await?;
            print_json(&candidates)?;
        }
        Command::Types => {
            for tag in registry().connector_types() {
                println!("{}", tag);
            }
        }
        Command::Info(device) => {
            let mut connector = device.connect_target()?;
            let info = connector.get_device_info().await?;
            connector.disconnect().await?;
            print_json(&info)?;
        }
        Command::Streams(device) => {
            let mut connector = device.connect_target()?;
            let streams = connector.list_streams().await?;
            connector.disconnect().await?;
            print_json(&streams)?;
        }
        Command::StreamUrl { device, channel } => {
            let mut connector = device.connect_target()?;
            let url = connector.get_stream_url(&channel).await?;
            connector.disconnect().await?;
            println!("{}", url);
        }
        Command::Snapshot {
            device,
            channel,
            output,
        } => {
            let mut connector = device.connect_target()?;
            let image = connector.snapshot(&channel).await?;
            connector.disconnect().await?;
            if image.is_empty() {
                return Err(anyhow!("device returned an empty image"));
            }
            tokio::fs::write(&output, &image)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            tracing::info!(path = %output.display(), size = image.len(), "Snapshot saved");
        }
    }

    Ok(())
}
