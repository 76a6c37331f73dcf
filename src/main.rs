use clap::Parser;
use tracing_subscriber::EnvFilter;

use papers_explorer::config::LOG_ENV;

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = papers_explorer::Cli::parse();
    papers_explorer::run(cli)
}
