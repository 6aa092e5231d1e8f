//! `lean config get|set|list`

use anyhow::{Context, Result};
use lean_core::config::{self, KNOWN_KEYS, LeanConfig};
use lean_core::paths;

/// Print the value of `key`, after environment overrides.
pub fn get(key: &str) -> Result<()> {
    let config = LeanConfig::load()?;
    match config.get(key)? {
        Some(value) => println!("{value}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// Write `key = value` into config.toml.
pub fn set(key: &str, value: &str) -> Result<()> {
    let path = paths::config_path()
        .context("Could not determine home directory. Set LEAN_HOME to override.")?;
    config::set_value(&path, key, value)?;
    println!("{key} = {value}");
    Ok(())
}

/// Print every known key with its current value.
pub fn list() -> Result<()> {
    let config = LeanConfig::load()?;
    let width = KNOWN_KEYS.iter().map(|k| k.len()).max().unwrap_or(0);
    for key in KNOWN_KEYS {
        let value = config.get(key)?.unwrap_or_else(|| "(not set)".to_string());
        println!("{key:<width$}  {value}");
    }
    Ok(())
}
