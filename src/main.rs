use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use temperature_watchdog::transport::MqttTransport;
use temperature_watchdog::{load_config, ConfigOverrides, Session};

#[derive(Parser, Debug)]
#[command(name = "temperature-watchdog", version)]
#[command(about = "Raises alarms when remote temperature readings cross a threshold")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the application.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The hostname of the mqtt broker [default: localhost]
    #[arg(long)]
    host: Option<String>,

    /// The port of the mqtt broker [default: 1883]
    #[arg(short, long)]
    port: Option<u16>,

    /// The id of this application [default: temperature-alarm]
    #[arg(short, long)]
    application_id: Option<String>,

    /// The temperature threshold in °C that raises an alarm [default: 65]
    #[arg(short, long)]
    threshold: Option<f64>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            application_id: self.application_id.clone(),
            threshold: self.threshold,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), &args.overrides())
        .context("failed to load configuration")?;

    init_tracing(&config.log_level);

    info!("Connecting to {}:{} ..", config.host, config.port);
    let connection = MqttTransport::connect(config.mqtt_settings())
        .await
        .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;

    let session = Session::new(connection, config.controller_settings());
    let reason = session.run(local_shutdown()).await?;
    info!("Session ended ({:?})", reason);

    Ok(())
}

/// Completes on Ctrl-C. If the handler cannot be installed, never completes.
async fn local_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
