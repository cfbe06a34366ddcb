use clap::Parser;
use noit_api::config::Config;
use noit_api::gateway;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "noit-api", version, about = "Research Q&A backend")]
struct Cli {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    if config.uses_dev_secret() {
        tracing::warn!(
            "SECRET_KEY is not set — running with the built-in development secret; \
             set SECRET_KEY before exposing this service"
        );
    }

    gateway::run_gateway(&cli.host, cli.port, config).await
}
