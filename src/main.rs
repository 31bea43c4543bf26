use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pixiv_courier::app::AppContext;
use pixiv_courier::cli::{commands, Cli, Commands};
use pixiv_courier::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Sync => {
            commands::sync(ctx).await?;
        }
        Commands::Status => {
            commands::status(&ctx)?;
        }
    }

    Ok(())
}
