//! Configuration for the live controller
//!
//! - YAML reads and atomic writes shared with the store
//! - Config and data path utilities
//! - Per-component settings ([`LiveConfig`] and its sections)
//!
//! # Usage
//!
//! ```ignore
//! use promptdj_core::config::{default_config_path, LiveConfig};
//!
//! let config = LiveConfig::load(&default_config_path());
//! ```

mod io;
mod live;
mod paths;

pub use io::{read_yaml, write_yaml};
pub use live::{AudioConfig, EffectsConfig, LiveConfig, MixerConfig, RelayConfig, SessionConfig};
pub use paths::{default_config_path, default_data_dir};
