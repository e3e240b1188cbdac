use std::path::PathBuf;

use capswriter_foundation::Lifecycle;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "capswriter-server", author, version, about = "CapsWriter recognizer-queue network service")]
struct Cli {
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = capswriter_server::logging::init()?;

    let settings = capswriter_server::config::load(cli.config.as_deref())?;

    let lifecycle = Lifecycle::new();
    lifecycle.install();

    tracing::info!(addr = %settings.addr, port = settings.port, "starting capswriter-server");
    capswriter_server::run(settings, lifecycle).await
}
