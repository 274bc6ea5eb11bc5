use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use talon_tuner::config::TunerConfig;
use talon_tuner::controller::SimController;

/// Configure a master controller and its followers, then run the tuning loop
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Tuner file (JSON)
    #[arg(short, long, default_value = "tuner.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let tuner = match TunerConfig::load(&args.config) {
        Ok(tuner) => tuner,
        Err(e) => {
            eprintln!("{}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    // No hardware binding is linked into this build
    info!("Driving simulated controllers");
    if let Err(e) = talon_tuner::runtime::run(tuner, SimController::new).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
