//! huemon - Hue bridge motion sensor monitor.
//!
//! Run with: `cargo run -p huemon-service -- run`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use huemon_service::config::default_config_path;
use huemon_service::{Config, ExitStatus, app};

/// huemon - Hue bridge motion sensor monitor.
#[derive(Parser, Debug)]
#[command(name = "huemon")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bridge address (overrides config).
    #[arg(short, long, global = true)]
    bridge: Option<String>,

    /// Application key (overrides config).
    #[arg(long, global = true)]
    app_key: Option<String>,

    /// Export directory (overrides config).
    #[arg(long, global = true)]
    export_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitor in the foreground (default behavior).
    Run,

    /// Pair with the bridge and print the new application key.
    Pair {
        /// Store the key in the configuration file.
        #[arg(long)]
        save: bool,
    },

    /// Validate the configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitStatus::Setup.into();
    }

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitStatus::Setup.into();
        }
    };

    // Override config with CLI args
    if let Some(bridge) = args.bridge {
        config.bridge.address = bridge;
    }
    if let Some(app_key) = args.app_key {
        config.bridge.app_key = Some(app_key);
    }
    if let Some(dir) = args.export_dir {
        config.export.directory = dir;
    }

    match args.command {
        Some(Command::Run) | None => app::run(config).await.into(),
        Some(Command::Pair { save }) => match pair(config, save, &config_path).await {
            Ok(()) => ExitStatus::Clean.into(),
            Err(e) => {
                error!("{:#}", e);
                ExitStatus::Setup.into()
            }
        },
        Some(Command::CheckConfig) => match config.validate() {
            Ok(()) => {
                println!("Configuration OK ({} sensor policies)", config.sensors.len());
                for warning in config.warnings() {
                    println!("Warning: {}", warning);
                }
                if config.bridge.app_key.is_none() {
                    println!("No application key yet; run `huemon pair`");
                }
                ExitStatus::Clean.into()
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitStatus::Setup.into()
            }
        },
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("huemon={}", level).parse()?)
                .add_directive(format!("huemon_core={}", level).parse()?)
                .add_directive(format!("huemon_service={}", level).parse()?),
        )
        .init();
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    Ok(match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    })
}

async fn pair(mut config: Config, save: bool, path: &std::path::Path) -> anyhow::Result<()> {
    let credentials = app::pair(&config).await?;
    println!("Application key: {}", credentials.app_key);
    if let Some(client_key) = &credentials.client_key {
        println!("Client key:      {}", client_key);
    }

    if save {
        config.bridge.app_key = Some(credentials.app_key);
        config.save(path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}
