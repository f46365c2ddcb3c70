use clap::Parser;
use skimmer::app::App;
use skimmer::config::Config;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

/// Cross-venue arbitrage detection and execution engine.
#[derive(Parser)]
#[command(name = "skimmer", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Force paper trading regardless of configuration.
    #[arg(long)]
    paper: bool,

    /// Detect and record opportunities without executing them.
    #[arg(long)]
    detect_only: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    if cli.paper {
        config.arbitrage.paper_trading = true;
    }
    if cli.detect_only {
        config.arbitrage.auto_trade = false;
    }

    config.init_logging();
    info!("skimmer starting");

    tokio::select! {
        result = App::run(config) => {
            if let Err(e) = result {
                error!(error = %e, "Fatal error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("skimmer stopped");
}
