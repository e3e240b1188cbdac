use std::path::PathBuf;

use capswriter_foundation::Lifecycle;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "capswriter-client", author, version, about = "CapsWriter push-to-talk client")]
struct Cli {
    /// Path to a TOML config file; defaults to ./capswriter-client.toml if present
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = capswriter_client::logging::init()?;

    let settings = capswriter_client::config::load(cli.config.as_deref())?;

    let lifecycle = Lifecycle::new();
    lifecycle.install();

    tracing::info!(server_uri = %settings.server_uri, "starting capswriter-client");
    capswriter_client::run(settings, lifecycle).await
}
