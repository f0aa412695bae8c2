//! Configuration loader
//!
//! Evaluates a `conveyor.lua` file in the sandbox and converts the returned
//! table into a [`DeployConfig`] through mlua's serde bridge. The resulting
//! configuration is validated before it is handed out.

use anyhow::{Context, Result};
use mlua::{LuaSerdeExt, Value};
use std::path::Path;

use conveyor_core::config::DeployConfig;

use crate::sandbox::create_sandbox;

/// Parse a deployment configuration from Lua source
///
/// # Errors
/// Returns an error if:
/// - The Lua source is invalid or raises an error
/// - The chunk does not return a table
/// - Fields are missing or have the wrong type
/// - Field values fail validation
///
/// # Example
/// ```no_run
/// use conveyor_lua::loader::parse_config;
///
/// let config = parse_config(r#"
///     return conveyor.define {
///         image = "shop/web",
///         registry = { url = "registry.example.com", credential = "REGISTRY_CREDS" },
///         strategy = conveyor.kubernetes { deployment = "web" },
///     }
/// "#)?;
/// assert_eq!(config.strategy.name(), "kubernetes");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn parse_config(source: &str) -> Result<DeployConfig> {
    let lua = create_sandbox().context("Failed to create configuration sandbox")?;

    let value: Value = lua
        .load(source)
        .set_name("conveyor.lua")
        .eval()
        .context("Failed to evaluate configuration")?;

    if !value.is_table() {
        anyhow::bail!(
            "Configuration must return a table, got {}",
            value.type_name()
        );
    }

    let config: DeployConfig = lua
        .from_value(value)
        .context("Configuration has an invalid structure")?;

    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Load and parse a configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<DeployConfig> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

    parse_config(&source).with_context(|| format!("Failed to load {}", path.display()))
}
