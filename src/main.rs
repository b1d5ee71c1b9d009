use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mimicd::config::{load_config, ConfigError};
use mimicd::lifecycle::Supervisor;

#[derive(Parser)]
#[command(name = "mimicd")]
#[command(version, about = "Declarative mock/fixture server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the mock server
    Serve {
        /// Host and port to bind
        #[arg(short, long, default_value = "localhost:8080")]
        address: String,

        /// Path to the configuration document
        #[arg(short, long)]
        config: PathBuf,

        /// Rebuild the instance when watched files change
        #[arg(short, long)]
        watch: bool,
    },
    /// Validate a configuration document
    Validate {
        /// Config file path
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mimicd=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            address,
            config,
            watch,
        } => {
            tracing::info!(
                address = %address,
                config = %config.display(),
                watch,
                "mimicd starting"
            );
            let supervisor = Supervisor::new(address, config, watch);
            if let Err(err) = supervisor.run().await {
                tracing::error!("{err}");
                std::process::exit(1);
            }
            tracing::info!("Shutdown complete");
        }
        Commands::Validate { path } => match load_config(&path) {
            Ok(snapshot) => {
                println!(
                    "config is valid ({} http routes, {} socket routes)",
                    snapshot.document.http.len(),
                    snapshot.document.socket.len()
                );
            }
            Err(ConfigError::Validation(errors)) => {
                eprintln!("config is invalid:");
                for error in &errors {
                    eprintln!("  {error}");
                }
                std::process::exit(1);
            }
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        },
    }
}
