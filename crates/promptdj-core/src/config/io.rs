//! YAML files for config and stored data
//!
//! Reads tell a missing file (`Ok(None)`) apart from a broken one, so each
//! caller picks its own fallback. Writes land in a sibling temp file that is
//! renamed over the target, so an interrupted save keeps the old file.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;

/// Read and parse a YAML file; `None` when it doesn't exist
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .with_context(|| format!("Failed to parse {:?}", path))
}

/// Serialize to YAML and replace `path`, creating parent directories
pub fn write_yaml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(value).context("Failed to serialize to YAML")?;
    let staging = path.with_extension("yaml.tmp");
    std::fs::write(&staging, yaml).with_context(|| format!("Failed to write {:?}", staging))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}
