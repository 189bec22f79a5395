//! Overlays for each effect phase
//!
//! Pure functions of the prompts an effect starts from. `base` is the
//! prompt list the phase works on: the live prompts for a Drop, the
//! build-up view for the Drop inside a Transition.

use crate::config::EffectsConfig;
use crate::mixer::{apply_overlay, MixOverlay};
use crate::types::{clamp_weight, Prompt};
use std::collections::HashSet;

/// Id of the synthetic track injected during silence
pub const DROP_TRACK_ID: &str = "effect-drop";

/// Id of the synthetic riser injected during build-up
pub const RISER_TRACK_ID: &str = "effect-riser";

const RHYTHM_KEYWORDS: [&str; 13] = [
    "drum",
    "drums",
    "beat",
    "percussion",
    "kick",
    "snare",
    "hi-hat",
    "hihat",
    "bass",
    "rhythm",
    "groove",
    "808",
    "breakbeat",
];

/// Whether a prompt text names rhythm or percussion
pub fn is_rhythmic(text: &str) -> bool {
    let text = text.to_lowercase();
    RHYTHM_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// Inputs shared by every phase
pub struct MixContext<'a> {
    pub filtered: &'a HashSet<String>,
    pub threshold: f32,
    pub config: &'a EffectsConfig,
}

impl MixContext<'_> {
    fn is_audible(&self, prompt: &Prompt) -> bool {
        prompt.weight > self.threshold && !self.filtered.contains(&prompt.text)
    }
}

/// Silence: every audible prompt held just above zero, plus a drop track
pub fn silence_overlay(base: &[Prompt], ctx: &MixContext<'_>) -> MixOverlay {
    let mut overlay = MixOverlay::new();
    let mut names = Vec::new();

    for prompt in base.iter().filter(|p| ctx.is_audible(p)) {
        overlay.set(prompt.id.clone(), prompt.text.clone(), ctx.config.silence_weight);
        names.push(prompt.text.as_str());
    }

    let text = if names.is_empty() {
        "Sudden silence, breath before the drop".to_string()
    } else {
        format!("Sudden silence, breath before the drop of {}", names.join(", "))
    };
    overlay.add_track(Prompt::new(DROP_TRACK_ID, text, ctx.config.drop_track_weight));
    overlay
}

/// Impact: audible prompts boosted, rhythm harder than the rest
pub fn impact_overlay(base: &[Prompt], ctx: &MixContext<'_>) -> MixOverlay {
    let config = ctx.config;
    let mut overlay = MixOverlay::new();
    let mut any_audible = false;

    for prompt in base {
        let weight = if prompt.weight <= ctx.threshold {
            0.0
        } else if is_rhythmic(&prompt.text) {
            clamp_weight(prompt.weight * config.rhythm_boost_mult + config.rhythm_boost_add)
        } else {
            clamp_weight(prompt.weight * config.other_boost_mult + config.other_boost_add)
        };
        any_audible |= weight > ctx.threshold && !ctx.filtered.contains(&prompt.text);
        overlay.set(prompt.id.clone(), prompt.text.clone(), weight);
    }

    if !any_audible {
        let strongest = base
            .iter()
            .filter(|p| !ctx.filtered.contains(&p.text))
            .fold(None::<&Prompt>, |best, p| match best {
                Some(b) if b.weight >= p.weight => Some(b),
                _ => Some(p),
            });
        if let Some(prompt) = strongest {
            log::debug!("Effects: Nothing audible after impact, forcing '{}'", prompt.text);
            overlay.set(prompt.id.clone(), prompt.text.clone(), config.fallback_weight);
        }
    }
    overlay
}

/// Build-up entries only (no riser): significant prompts boosted with the suffix
fn buildup_entries(base: &[Prompt], ctx: &MixContext<'_>) -> MixOverlay {
    let config = ctx.config;
    let mut overlay = MixOverlay::new();
    for prompt in base.iter().filter(|p| ctx.is_audible(p)) {
        overlay.set(
            prompt.id.clone(),
            format!("{}{}", prompt.text, config.buildup_suffix),
            prompt.weight * config.buildup_boost,
        );
    }
    overlay
}

/// Build-up overlay and the prompt view the following Drop starts from
pub fn buildup_overlay(base: &[Prompt], ctx: &MixContext<'_>) -> (MixOverlay, Vec<Prompt>) {
    let mut overlay = buildup_entries(base, ctx);
    let drop_base = apply_overlay(base, Some(&overlay));
    overlay.add_track(Prompt::new(
        RISER_TRACK_ID,
        ctx.config.riser_text.clone(),
        ctx.config.riser_weight,
    ));
    (overlay, drop_base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::compute_mix;
    use crate::types::WeightedPrompt;

    fn ctx<'a>(filtered: &'a HashSet<String>, config: &'a EffectsConfig) -> MixContext<'a> {
        MixContext {
            filtered,
            threshold: 0.01,
            config,
        }
    }

    #[test]
    fn test_rhythm_keywords() {
        assert!(is_rhythmic("Punchy Kick"));
        assert!(is_rhythmic("Drum and Bass"));
        assert!(is_rhythmic("TR-808 cowbell"));
        assert!(!is_rhythmic("Lush Strings"));
        assert!(!is_rhythmic("piano"));
    }

    #[test]
    fn test_silence_holds_prompts_above_zero() {
        let filtered = HashSet::new();
        let config = EffectsConfig::default();
        let base = vec![
            Prompt::new("a", "drums", 1.0),
            Prompt::new("b", "piano", 1.0),
            Prompt::new("c", "choir", 0.0),
        ];
        let overlay = silence_overlay(&base, &ctx(&filtered, &config));
        let mix = compute_mix(&base, Some(&overlay), &filtered, 0.01);

        assert_eq!(mix.len(), 3);
        assert_eq!(mix[0], WeightedPrompt::new("drums", 0.001));
        assert_eq!(mix[1], WeightedPrompt::new("piano", 0.001));
        assert_eq!(mix[2].weight, 1.8);
        assert!(mix[2].text.contains("drums, piano"));
        assert!(overlay.tracks()[0].is_effect_track);
        assert!(overlay.entry(&"c".into()).is_none());
    }

    #[test]
    fn test_impact_drums_vs_piano() {
        let filtered = HashSet::new();
        let config = EffectsConfig::default();
        let base = vec![
            Prompt::new("a", "drums", 1.0),
            Prompt::new("b", "piano", 1.0),
            Prompt::new("c", "choir", 0.0),
        ];
        let overlay = impact_overlay(&base, &ctx(&filtered, &config));
        let mix = compute_mix(&base, Some(&overlay), &filtered, 0.01);

        // drums: 1.0 * 1.75 + 0.3 clamped to 2.0; piano: 1.0 * 1.1 + 0.1
        assert_eq!(mix.len(), 2);
        assert_eq!(mix[0], WeightedPrompt::new("drums", 2.0));
        assert_eq!(mix[1].text, "piano");
        assert!((mix[1].weight - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_impact_fallback_forces_strongest() {
        let filtered: HashSet<String> = ["drums".to_string()].into_iter().collect();
        let config = EffectsConfig::default();
        let base = vec![
            Prompt::new("a", "drums", 1.5),
            Prompt::new("b", "piano", 0.005),
            Prompt::new("c", "choir", 0.008),
        ];
        let overlay = impact_overlay(&base, &ctx(&filtered, &config));
        let mix = compute_mix(&base, Some(&overlay), &filtered, 0.01);
        assert_eq!(mix, vec![WeightedPrompt::new("choir", 1.0)]);
    }

    #[test]
    fn test_buildup_boosts_and_suffixes() {
        let filtered = HashSet::new();
        let config = EffectsConfig::default();
        let base = vec![Prompt::new("a", "drums", 1.0), Prompt::new("b", "piano", 0.0)];
        let (overlay, drop_base) = buildup_overlay(&base, &ctx(&filtered, &config));

        let mix = compute_mix(&base, Some(&overlay), &filtered, 0.01);
        assert_eq!(mix.len(), 2);
        assert_eq!(mix[0].text, "drums, building tension, rising energy");
        assert!((mix[0].weight - 1.3).abs() < 1e-6);
        assert_eq!(mix[1].weight, 1.5);

        // The drop starts from the boosted view, without the riser
        assert_eq!(drop_base.len(), 2);
        assert_eq!(drop_base[0].text, "drums, building tension, rising energy");
        assert!(drop_base.iter().all(|p| !p.is_effect_track));
    }
}
