//! MIDI settings and stored binding profiles
//!
//! Bindings are stored as YAML, one profile per device name.
//! Default location: ~/.local/share/promptdj/midi-bindings.yaml

use crate::learn::DEFAULT_LONG_PRESS;
use crate::normalize::DEFAULT_TRIGGER_THRESHOLD;
use crate::types::CcBinding;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Tunables for MIDI handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Hold time on the learn toggle that clears all bindings
    pub long_press_ms: u64,
    /// Raw CC values above this trigger actions
    pub trigger_threshold: u8,
    /// Device selected in the last session (reconnected on startup)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_device: Option<String>,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            long_press_ms: DEFAULT_LONG_PRESS.as_millis() as u64,
            trigger_threshold: DEFAULT_TRIGGER_THRESHOLD,
            last_device: None,
        }
    }
}

impl MidiSettings {
    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }
}

/// Bindings of one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceBindings {
    /// Device identity (input port name)
    pub device: String,
    #[serde(default)]
    pub bindings: Vec<CcBinding>,
}

/// Root of the bindings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingProfiles {
    pub devices: Vec<DeviceBindings>,
}

impl BindingProfiles {
    pub fn get(&self, device: &str) -> Option<&DeviceBindings> {
        self.devices.iter().find(|d| d.device == device)
    }

    /// Replace the bindings of a device (an empty list removes the profile)
    pub fn set(&mut self, device: &str, bindings: Vec<CcBinding>) {
        self.devices.retain(|d| d.device != device);
        if !bindings.is_empty() {
            self.devices.push(DeviceBindings {
                device: device.to_string(),
                bindings,
            });
        }
    }
}

/// Load binding profiles
///
/// Missing or invalid files yield empty profiles (logged).
pub fn load_binding_profiles(path: &Path) -> BindingProfiles {
    if !path.exists() {
        log::info!("MIDI: No bindings file at {:?}, starting empty", path);
        return BindingProfiles::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str(&contents) {
            Ok(profiles) => profiles,
            Err(e) => {
                log::warn!("MIDI: Failed to parse bindings file {:?}: {}", path, e);
                BindingProfiles::default()
            }
        },
        Err(e) => {
            log::warn!("MIDI: Failed to read bindings file {:?}: {}", path, e);
            BindingProfiles::default()
        }
    }
}

/// Save binding profiles, creating parent directories
pub fn save_binding_profiles(profiles: &BindingProfiles, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create bindings directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(profiles).context("Failed to serialize MIDI bindings")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write bindings file: {:?}", path))?;

    log::debug!("MIDI: Bindings saved to {:?}", path);
    Ok(())
}

/// Persistence for device-scoped bindings
pub trait BindingStore {
    fn load_bindings(&self, device: &str) -> Vec<CcBinding>;
    fn save_bindings(&self, device: &str, bindings: &[CcBinding]) -> Result<()>;
}

/// YAML-file-backed binding store
pub struct YamlBindingStore {
    path: PathBuf,
    profiles: Mutex<BindingProfiles>,
}

impl YamlBindingStore {
    /// Open the store at `path` (read once, written on every save)
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let profiles = load_binding_profiles(&path);
        Self {
            path,
            profiles: Mutex::new(profiles),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BindingStore for YamlBindingStore {
    fn load_bindings(&self, device: &str) -> Vec<CcBinding> {
        self.profiles
            .lock()
            .map(|profiles| {
                profiles
                    .get(device)
                    .map(|d| d.bindings.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn save_bindings(&self, device: &str, bindings: &[CcBinding]) -> Result<()> {
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|_| anyhow::anyhow!("binding store lock poisoned"))?;
        profiles.set(device, bindings.to_vec());
        save_binding_profiles(&profiles, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionTag, LearnTarget};

    #[test]
    fn test_missing_file_is_empty() {
        let profiles = load_binding_profiles(Path::new("/nonexistent/promptdj/bindings.yaml"));
        assert!(profiles.devices.is_empty());
    }

    #[test]
    fn test_store_roundtrip_per_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.yaml");

        let store = YamlBindingStore::open(&path);
        let bindings = vec![
            CcBinding {
                cc: 1,
                target: LearnTarget::prompt("prompt-1"),
            },
            CcBinding {
                cc: 64,
                target: LearnTarget::action(ActionTag::Drop),
            },
        ];
        store.save_bindings("nanoKONTROL2", &bindings).unwrap();
        store.save_bindings("Launch Control", &bindings[..1]).unwrap();

        let reopened = YamlBindingStore::open(&path);
        assert_eq!(reopened.load_bindings("nanoKONTROL2"), bindings);
        assert_eq!(reopened.load_bindings("Launch Control").len(), 1);
        assert!(reopened.load_bindings("unknown").is_empty());
    }

    #[test]
    fn test_saving_empty_removes_profile() {
        let mut profiles = BindingProfiles::default();
        let binding = CcBinding {
            cc: 1,
            target: LearnTarget::prompt("a"),
        };
        profiles.set("dev", vec![binding]);
        profiles.set("dev", Vec::new());
        assert!(profiles.get("dev").is_none());
    }

    #[test]
    fn test_invalid_file_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.yaml");
        std::fs::write(&path, "devices: [[[not yaml").unwrap();
        assert!(load_binding_profiles(&path).devices.is_empty());
    }
}
