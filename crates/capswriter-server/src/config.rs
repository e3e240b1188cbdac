//! Config loading: `ServerSettings::default()` layered under an optional
//! TOML file, then under `CAPSWRITER__*` environment overrides.

use std::path::Path;

use anyhow::Context;
use capswriter_protocol::config::ServerSettings;
use config::{Config, Environment, File, FileFormat};
use tokio::sync::watch;

pub fn load(path: Option<&Path>) -> anyhow::Result<ServerSettings> {
    let defaults = toml::to_string(&ServerSettings::default())
        .context("failed to serialize default server settings")?;

    let mut builder =
        Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

    builder = match path {
        Some(path) => builder.add_source(File::from(path).required(false)),
        None => builder.add_source(File::with_name("capswriter-server").required(false)),
    };
    builder = builder.add_source(Environment::with_prefix("CAPSWRITER").separator("__"));

    let mut settings: ServerSettings = builder
        .build()
        .context("failed to build server configuration")?
        .try_deserialize()
        .context("failed to deserialize server configuration")?;
    settings.validate();
    Ok(settings)
}

/// A watch channel components can subscribe to for config changes. Nothing
/// publishes to the sender yet — wiring a file watcher onto it is a
/// non-goal here — but the shape exists so a future reload path doesn't
/// need to touch every subscriber's plumbing.
pub fn reload_channel(settings: ServerSettings) -> (watch::Sender<ServerSettings>, watch::Receiver<ServerSettings>) {
    watch::channel(settings)
}
