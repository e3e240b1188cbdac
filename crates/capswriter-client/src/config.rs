//! Config loading: `ClientSettings::default()` layered under an optional
//! TOML file, then under `CAPSWRITER__*` environment overrides.

use std::path::Path;

use anyhow::Context;
use capswriter_protocol::config::ClientSettings;
use config::{Config, Environment, File, FileFormat};
use tokio::sync::watch;

pub fn load(path: Option<&Path>) -> anyhow::Result<ClientSettings> {
    let defaults = toml::to_string(&ClientSettings::default())
        .context("failed to serialize default client settings")?;

    let mut builder =
        Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

    builder = match path {
        Some(path) => builder.add_source(File::from(path).required(false)),
        None => builder.add_source(File::with_name("capswriter-client").required(false)),
    };
    builder = builder.add_source(Environment::with_prefix("CAPSWRITER").separator("__"));

    let mut settings: ClientSettings = builder
        .build()
        .context("failed to build client configuration")?
        .try_deserialize()
        .context("failed to deserialize client configuration")?;
    settings.validate();
    Ok(settings)
}

/// A watch channel components can subscribe to for config changes. Nothing
/// publishes to the sender yet — wiring a file watcher onto it is a
/// non-goal here — but the shape exists so a future reload path doesn't
/// need to touch every subscriber's plumbing.
pub fn reload_channel(settings: ClientSettings) -> (watch::Sender<ClientSettings>, watch::Receiver<ClientSettings>) {
    watch::channel(settings)
}
