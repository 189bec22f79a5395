//! Default locations for config and stored data

use std::path::PathBuf;

const APP_DIR: &str = "promptdj";

/// `<config_dir>/promptdj/config.yaml` (~/.config on Linux)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.yaml")
}

/// `<data_dir>/promptdj`, home of the stored prompts and bindings
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
