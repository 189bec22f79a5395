//! Mix computation
//!
//! The mix sent to the service is a pure function of the base prompts, an
//! optional effect overlay, the filtered texts and the activity threshold.
//! Effects never rewrite base prompts; they install an overlay.

use crate::types::{clamp_weight, Prompt, PromptId, WeightedPrompt};
use std::collections::{HashMap, HashSet};

/// Override for one base prompt
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEntry {
    /// Replacement text; base text when `None`
    pub text: Option<String>,
    pub weight: f32,
}

/// Temporary effect view on top of the base prompts
///
/// Overridden prompts and effect tracks are included whenever their weight
/// is above zero, so an effect can hold prompts just above silence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixOverlay {
    entries: HashMap<PromptId, OverlayEntry>,
    tracks: Vec<Prompt>,
}

impl MixOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the weight of a base prompt
    pub fn set_weight(&mut self, id: PromptId, weight: f32) {
        self.entries.insert(
            id,
            OverlayEntry {
                text: None,
                weight: clamp_weight(weight),
            },
        );
    }

    /// Override text and weight of a base prompt
    pub fn set(&mut self, id: PromptId, text: impl Into<String>, weight: f32) {
        self.entries.insert(
            id,
            OverlayEntry {
                text: Some(text.into()),
                weight: clamp_weight(weight),
            },
        );
    }

    /// Add a synthetic track (marked as an effect track)
    pub fn add_track(&mut self, mut track: Prompt) {
        track.is_effect_track = true;
        track.weight = clamp_weight(track.weight);
        self.tracks.push(track);
    }

    pub fn entry(&self, id: &PromptId) -> Option<&OverlayEntry> {
        self.entries.get(id)
    }

    pub fn tracks(&self) -> &[Prompt] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.tracks.is_empty()
    }
}

/// Compute the weighted mix to push
///
/// Base prompts without an overlay entry need `weight > threshold`; overlay
/// entries and tracks need `weight > 0`. Filtered texts never appear.
pub fn compute_mix(
    prompts: &[Prompt],
    overlay: Option<&MixOverlay>,
    filtered: &HashSet<String>,
    threshold: f32,
) -> Vec<WeightedPrompt> {
    let mut mix = Vec::with_capacity(prompts.len());

    for prompt in prompts {
        let entry = overlay.and_then(|o| o.entry(&prompt.id));
        let (text, weight, included) = match entry {
            Some(entry) => {
                let text = entry.text.as_deref().unwrap_or(&prompt.text);
                (text, entry.weight, entry.weight > 0.0)
            }
            None => (prompt.text.as_str(), prompt.weight, prompt.weight > threshold),
        };
        if included && !filtered.contains(text) {
            mix.push(WeightedPrompt::new(text, weight));
        }
    }

    if let Some(overlay) = overlay {
        for track in overlay.tracks() {
            if track.weight > 0.0 && !filtered.contains(&track.text) {
                mix.push(WeightedPrompt::new(track.text.clone(), track.weight));
            }
        }
    }

    mix
}

/// Prompts as seen through the overlay (entries substituted, tracks appended)
pub fn apply_overlay(prompts: &[Prompt], overlay: Option<&MixOverlay>) -> Vec<Prompt> {
    let Some(overlay) = overlay else {
        return prompts.to_vec();
    };

    let mut view: Vec<Prompt> = prompts
        .iter()
        .map(|prompt| match overlay.entry(&prompt.id) {
            Some(entry) => Prompt {
                text: entry.text.clone().unwrap_or_else(|| prompt.text.clone()),
                weight: entry.weight,
                ..prompt.clone()
            },
            None => prompt.clone(),
        })
        .collect();
    view.extend(overlay.tracks().iter().cloned());
    view
}
