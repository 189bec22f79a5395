//! Prompt mixer
//!
//! Owns the base prompts, the set of filtered texts and the active effect
//! overlay. Every mutation is synchronous; the controller requests a
//! throttled push afterwards and the mix is recomputed when the push fires.

mod overlay;
mod throttle;

pub use overlay::{apply_overlay, compute_mix, MixOverlay, OverlayEntry};
pub use throttle::{PushDecision, PushThrottle, DEFAULT_PUSH_INTERVAL};

use crate::types::{clamp_weight, Prompt, PromptId, WeightedPrompt};
use std::collections::HashSet;
use thiserror::Error;

/// Default weight at or below which a prompt is muted
pub const DEFAULT_ACTIVITY_THRESHOLD: f32 = 0.01;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixerError {
    #[error("Unknown prompt: {0}")]
    UnknownPrompt(PromptId),

    #[error("Prompt id already in use: {0}")]
    DuplicateId(PromptId),
}

#[derive(Debug, Clone)]
pub struct PromptMixer {
    prompts: Vec<Prompt>,
    filtered: HashSet<String>,
    overlay: Option<MixOverlay>,
    threshold: f32,
    next_id: u64,
}

impl Default for PromptMixer {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_THRESHOLD)
    }
}

impl PromptMixer {
    pub fn new(threshold: f32) -> Self {
        Self {
            prompts: Vec::new(),
            filtered: HashSet::new(),
            overlay: None,
            threshold,
            next_id: 1,
        }
    }

    /// Mixer seeded with stored prompts (effect tracks are skipped)
    pub fn with_prompts(threshold: f32, prompts: Vec<Prompt>) -> Self {
        let mut mixer = Self::new(threshold);
        for prompt in prompts {
            if let Err(e) = mixer.insert_prompt(prompt) {
                log::warn!("Mixer: Skipping stored prompt: {}", e);
            }
        }
        mixer
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Base prompts in display order
    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn prompt(&self, id: &PromptId) -> Option<&Prompt> {
        self.prompts.iter().find(|p| &p.id == id)
    }

    fn prompt_mut(&mut self, id: &PromptId) -> Result<&mut Prompt, MixerError> {
        self.prompts
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| MixerError::UnknownPrompt(id.clone()))
    }

    /// Add a new prompt with a generated id
    pub fn add_prompt(
        &mut self,
        text: impl Into<String>,
        weight: f32,
        color: impl Into<String>,
    ) -> PromptId {
        let id = self.generate_id();
        self.prompts
            .push(Prompt::new(id.clone(), text, weight).with_color(color));
        id
    }

    /// Insert a prompt that already carries an id
    pub fn insert_prompt(&mut self, mut prompt: Prompt) -> Result<(), MixerError> {
        if self.prompt(&prompt.id).is_some() {
            return Err(MixerError::DuplicateId(prompt.id));
        }
        prompt.weight = clamp_weight(prompt.weight);
        prompt.is_effect_track = false;
        self.prompts.push(prompt);
        Ok(())
    }

    pub fn set_prompt_text(
        &mut self,
        id: &PromptId,
        text: impl Into<String>,
    ) -> Result<(), MixerError> {
        self.prompt_mut(id)?.text = text.into();
        Ok(())
    }

    pub fn set_prompt_weight(&mut self, id: &PromptId, weight: f32) -> Result<(), MixerError> {
        self.prompt_mut(id)?.weight = clamp_weight(weight);
        Ok(())
    }

    pub fn set_prompt(
        &mut self,
        id: &PromptId,
        text: impl Into<String>,
        weight: f32,
    ) -> Result<(), MixerError> {
        let prompt = self.prompt_mut(id)?;
        prompt.text = text.into();
        prompt.weight = clamp_weight(weight);
        Ok(())
    }

    pub fn set_prompt_color(
        &mut self,
        id: &PromptId,
        color: impl Into<String>,
    ) -> Result<(), MixerError> {
        self.prompt_mut(id)?.color = color.into();
        Ok(())
    }

    pub fn remove_prompt(&mut self, id: &PromptId) -> Result<Prompt, MixerError> {
        let index = self
            .prompts
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| MixerError::UnknownPrompt(id.clone()))?;
        Ok(self.prompts.remove(index))
    }

    /// Replace the base prompts wholesale (effect restore)
    pub fn restore(&mut self, prompts: Vec<Prompt>) {
        self.prompts = prompts;
    }

    /// Start over from `prompts`: overlay and filtered texts are dropped
    pub fn reset(&mut self, prompts: Vec<Prompt>) {
        self.prompts.clear();
        self.filtered.clear();
        self.overlay = None;
        for prompt in prompts {
            if let Err(e) = self.insert_prompt(prompt) {
                log::warn!("Mixer: Skipping reset prompt: {}", e);
            }
        }
    }

    /// Exclude a literal text from every future mix; returns false if already filtered
    pub fn mark_filtered(&mut self, text: impl Into<String>) -> bool {
        self.filtered.insert(text.into())
    }

    pub fn clear_filtered(&mut self, text: &str) -> bool {
        self.filtered.remove(text)
    }

    pub fn filtered(&self) -> &HashSet<String> {
        &self.filtered
    }

    pub fn set_overlay(&mut self, overlay: MixOverlay) {
        self.overlay = Some(overlay);
    }

    pub fn clear_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn overlay(&self) -> Option<&MixOverlay> {
        self.overlay.as_ref()
    }

    /// Whether a base prompt passes `is_active` (weight above threshold, not filtered)
    pub fn is_active(&self, prompt: &Prompt) -> bool {
        prompt.weight > self.threshold && !self.filtered.contains(&prompt.text)
    }

    pub fn has_active_prompt(&self) -> bool {
        self.prompts.iter().any(|p| self.is_active(p))
    }

    /// The weighted mix as it would be pushed now
    pub fn snapshot(&self) -> Vec<WeightedPrompt> {
        compute_mix(&self.prompts, self.overlay.as_ref(), &self.filtered, self.threshold)
    }

    /// Prompts as displayed, including effect substitutions and tracks
    pub fn display_prompts(&self) -> Vec<Prompt> {
        apply_overlay(&self.prompts, self.overlay.as_ref())
    }

    fn generate_id(&mut self) -> PromptId {
        loop {
            let id = PromptId::new(format!("prompt-{}", self.next_id));
            self.next_id += 1;
            if self.prompt(&id).is_none() {
                return id;
            }
        }
    }
}

/// Starter palette used when nothing is stored; only the first is audible
pub fn default_prompts() -> Vec<Prompt> {
    const PALETTE: [(&str, &str); 8] = [
        ("Bossa Nova", "#9900ff"),
        ("Chillwave", "#5200ff"),
        ("Drum and Bass", "#ff25f6"),
        ("Post Punk", "#2af6de"),
        ("Shoegaze", "#ffdd28"),
        ("Funk", "#3dffab"),
        ("Lush Strings", "#d8ff3e"),
        ("Sparkling Arpeggios", "#d9b2ff"),
    ];

    PALETTE
        .iter()
        .enumerate()
        .map(|(i, (text, color))| {
            let weight = if i == 0 { 1.0 } else { 0.0 };
            Prompt::new(format!("prompt-{}", i + 1), *text, weight).with_color(*color)
        })
        .collect()
}
