//! Config command implementation.

use anyhow::Context;
use broker_core::BrokerConfig;
use std::path::Path;

/// Execute the config command.
///
/// Prints the configuration after layering defaults, the file and `BROKER_*`
/// environment variables.
pub fn execute(path: Option<&Path>) -> anyhow::Result<()> {
    let config = BrokerConfig::load(path).context("Failed to load broker configuration")?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
