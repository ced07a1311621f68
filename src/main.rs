//! Tradepost - Main Server
//!
//! A community barter marketplace with real-time change notifications.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tradepost::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tradepost")]
#[command(about = "Community barter marketplace server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the marketplace server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tradepost=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            tradepost::start_server(config).await
        }
        Commands::Migrate => run_migrate(config).await,
    }
}

async fn run_migrate(config: Config) -> Result<()> {
    tracing::info!("Applying migrations");
    // Store::connect runs embedded migrations before returning
    let store = tradepost::store::Store::connect(&config.database_url, 1).await?;
    store.health_check().await?;
    tracing::info!("Migrations applied, database healthy");
    Ok(())
}
