//! Provider configuration loading.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::Path;
use stratum_core::ProviderConfig;

/// Load the provider configuration.
///
/// Sources, later ones winning: the TOML file at `path` if it exists, then
/// `STORJ_` environment variables with `__` separating nested keys
/// (`STORJ_ACCESS_GRANT`, `STORJ_NETWORK__TYPE`, `STORJ_NETWORK__ROOT_SECRET`).
pub fn load(path: Option<&Path>) -> Result<ProviderConfig> {
    let mut figment = Figment::new();

    match path {
        Some(path) if path.exists() => {
            tracing::debug!(config_path = %path.display(), "loading configuration from file");
            figment = figment.merge(Toml::file(path));
        }
        Some(path) => {
            tracing::debug!(config_path = %path.display(), "no config file found");
        }
        None => {}
    }

    figment
        .merge(Env::prefixed("STORJ_").split("__"))
        .extract()
        .context("failed to load provider configuration")
}
