use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cardio2e_gateway::{gateway, Config};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (default: ./cardio2e.toml, then the user config dir)
    #[arg(long, value_name = "PATH", value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (default: info, or debug with global.debug)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path = args.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&path)?;

    let default_level = if config.global.debug { "debug" } else { "info" };
    let level = args.log_level.unwrap_or_else(|| default_level.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Cardio2e gateway {} starting with {}",
        env!("CARGO_PKG_VERSION"),
        path.display()
    );
    gateway::run(config)
}
