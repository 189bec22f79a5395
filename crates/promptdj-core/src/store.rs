//! Persistent prompts and MIDI bindings
//!
//! ```text
//! <data_dir>/promptdj/
//!   prompts.yaml        # base prompts (effect tracks never written)
//!   midi-bindings.yaml  # CC bindings per device
//! ```

use crate::config::{read_yaml, write_yaml};
use crate::types::Prompt;
use anyhow::Result;
use promptdj_midi::{BindingStore, CcBinding, YamlBindingStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bindings plus prompts
pub trait PromptStore: BindingStore {
    /// This store as a plain binding store
    fn bindings(&self) -> &dyn BindingStore;

    /// Stored prompts, `None` when nothing was ever saved
    fn load_prompts(&self) -> Option<Vec<Prompt>>;
    fn save_prompts(&self, prompts: &[Prompt]) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PromptsFile {
    prompts: Vec<Prompt>,
}

/// YAML files under one data directory
pub struct YamlStore {
    prompts_path: PathBuf,
    bindings: YamlBindingStore,
}

impl YamlStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            prompts_path: data_dir.join("prompts.yaml"),
            bindings: YamlBindingStore::open(data_dir.join("midi-bindings.yaml")),
        }
    }

    pub fn prompts_path(&self) -> &Path {
        &self.prompts_path
    }
}

impl BindingStore for YamlStore {
    fn load_bindings(&self, device: &str) -> Vec<CcBinding> {
        self.bindings.load_bindings(device)
    }

    fn save_bindings(&self, device: &str, bindings: &[CcBinding]) -> Result<()> {
        self.bindings.save_bindings(device, bindings)
    }
}

impl PromptStore for YamlStore {
    fn bindings(&self) -> &dyn BindingStore {
        self
    }

    fn load_prompts(&self) -> Option<Vec<Prompt>> {
        match read_yaml::<PromptsFile>(&self.prompts_path) {
            Ok(file) => file.map(|file| file.prompts),
            Err(e) => {
                log::warn!("Store: {:#}", e);
                None
            }
        }
    }

    fn save_prompts(&self, prompts: &[Prompt]) -> Result<()> {
        let file = PromptsFile {
            prompts: prompts
                .iter()
                .filter(|p| !p.is_effect_track)
                .cloned()
                .collect(),
        };
        write_yaml(&file, &self.prompts_path)?;
        log::debug!("Store: Saved {} prompts", file.prompts.len());
        Ok(())
    }
}
