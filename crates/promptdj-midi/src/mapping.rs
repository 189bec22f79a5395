//! CC mapping engine
//!
//! Owns the active device, its bindings and the learn state. Incoming CC
//! messages either complete a learn pair or are mapped to a [`MidiCommand`].

use crate::bindings::BindingMap;
use crate::config::{BindingStore, MidiSettings};
use crate::learn::{LearnState, LearnToggle, ToggleGesture};
use crate::normalize::{is_trigger, normalize_cc_value};
use crate::types::{CcBinding, LearnTarget, MidiCommand};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Result of feeding a CC message to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum CcOutcome {
    /// Learn mode bound the CC to the selected target
    Bound(CcBinding),
    /// The CC maps to a command for the controller
    Command(MidiCommand),
    /// Nothing to do (unbound, learning without target, released or held button)
    Ignored,
}

/// Result of a learn toggle gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Entered,
    Exited,
    /// Long press while idle cleared every binding of the device
    Cleared,
}

/// Mapping engine - converts CC events to controller commands
pub struct MappingEngine {
    settings: MidiSettings,
    /// Active device identity (bindings are scoped to it)
    device: Option<String>,
    bindings: BindingMap,
    learn: LearnState,
    toggle: LearnToggle,
    /// Last raw value per action CC outside learn mode
    last_values: HashMap<u8, u8>,
    /// Action CCs that have sent a release; only these count as held
    releasing: HashSet<u8>,
}

impl MappingEngine {
    pub fn new(settings: MidiSettings) -> Self {
        let toggle = LearnToggle::new(settings.long_press());
        Self {
            settings,
            device: None,
            bindings: BindingMap::new(),
            learn: LearnState::Idle,
            toggle,
            last_values: HashMap::new(),
            releasing: HashSet::new(),
        }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn bindings(&self) -> &BindingMap {
        &self.bindings
    }

    pub fn learn_state(&self) -> &LearnState {
        &self.learn
    }

    pub fn is_learning(&self) -> bool {
        self.learn.is_learning()
    }

    pub fn selected_target(&self) -> Option<&LearnTarget> {
        self.learn.selected()
    }

    /// Switch to another input device (or none)
    ///
    /// Clears the previous device's bindings from memory, cancels learn mode
    /// and loads the stored bindings of the new device.
    pub fn select_device(&mut self, device: Option<String>, store: &dyn BindingStore) {
        if self.device == device {
            return;
        }

        if self.learn.exit() {
            log::info!("MIDI: Learn mode cancelled by device change");
        }
        self.bindings.clear();
        self.last_values.clear();
        self.releasing.clear();

        if let Some(ref name) = device {
            self.bindings = BindingMap::from_bindings(&store.load_bindings(name));
            log::info!(
                "MIDI: Selected device '{}' ({} stored bindings)",
                name,
                self.bindings.len()
            );
        } else {
            log::info!("MIDI: Device deselected");
        }
        self.device = device;
    }

    pub fn enter_learn_mode(&mut self) {
        self.learn.enter();
        log::info!("MIDI: Learn mode entered");
    }

    /// Leave learn mode and persist the bindings of the active device
    pub fn exit_learn_mode(&mut self, store: &dyn BindingStore) {
        if self.learn.exit() {
            log::info!("MIDI: Learn mode exited ({} bindings)", self.bindings.len());
            self.persist(store);
        }
    }

    /// Short click on the learn toggle
    pub fn toggle_learn_mode(&mut self, store: &dyn BindingStore) -> ToggleOutcome {
        if self.learn.is_learning() {
            self.exit_learn_mode(store);
            ToggleOutcome::Exited
        } else {
            self.enter_learn_mode();
            ToggleOutcome::Entered
        }
    }

    pub fn press_learn_toggle(&mut self, now: Instant) {
        self.toggle.press(now);
    }

    /// Release of the learn toggle; a long press while idle clears bindings
    pub fn release_learn_toggle(
        &mut self,
        now: Instant,
        store: &dyn BindingStore,
    ) -> ToggleOutcome {
        match self.toggle.release(now) {
            ToggleGesture::Long if !self.learn.is_learning() => {
                self.clear_bindings(store);
                ToggleOutcome::Cleared
            }
            _ => self.toggle_learn_mode(store),
        }
    }

    /// Select (or deselect) the target for the next CC
    ///
    /// Returns false when not learning.
    pub fn select_learn_target(&mut self, target: LearnTarget) -> bool {
        let accepted = self.learn.select(target);
        if accepted {
            log::debug!("MIDI: Learn target {:?}", self.learn.selected());
        }
        accepted
    }

    /// Remove every binding of the active device (memory and store)
    pub fn clear_bindings(&mut self, store: &dyn BindingStore) {
        self.bindings.clear();
        log::info!("MIDI: All bindings cleared");
        self.persist(store);
    }

    /// Drop a binding whose target no longer exists
    pub fn forget_target(&mut self, target: &LearnTarget) -> bool {
        self.bindings.unbind_target(target).is_some()
    }

    /// Feed a control change message
    pub fn handle_cc(&mut self, cc: u8, value: u8) -> CcOutcome {
        if self.learn.is_learning() {
            return match self.learn.take_selected() {
                Some(target) => {
                    self.bindings.bind(cc, target.clone());
                    log::info!("MIDI: Learned CC {} -> {}", cc, target);
                    CcOutcome::Bound(CcBinding { cc, target })
                }
                None => CcOutcome::Ignored,
            };
        }

        match self.bindings.target(cc) {
            Some(LearnTarget::Prompt(prompt_id)) => {
                CcOutcome::Command(MidiCommand::SetPromptWeight {
                    prompt_id: prompt_id.clone(),
                    weight: normalize_cc_value(value),
                })
            }
            Some(LearnTarget::Action(tag)) => {
                let threshold = self.settings.trigger_threshold;
                let previous = self.last_values.insert(cc, value);
                if !is_trigger(value, threshold) {
                    self.releasing.insert(cc);
                    return CcOutcome::Ignored;
                }

                // Press-only buttons never send a release, so every press fires
                let held = self.releasing.contains(&cc)
                    && previous.is_some_and(|v| is_trigger(v, threshold));
                if held {
                    CcOutcome::Ignored
                } else {
                    CcOutcome::Command(MidiCommand::Trigger(tag.clone()))
                }
            }
            None => {
                log::trace!("MIDI: CC {} unbound", cc);
                CcOutcome::Ignored
            }
        }
    }

    fn persist(&self, store: &dyn BindingStore) {
        let Some(ref device) = self.device else {
            log::debug!("MIDI: No device selected, bindings not persisted");
            return;
        };
        if let Err(e) = store.save_bindings(device, &self.bindings.to_bindings()) {
            log::warn!("MIDI: Failed to save bindings for '{}': {:#}", device, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionTag;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        devices: RefCell<HashMap<String, Vec<CcBinding>>>,
        saves: RefCell<usize>,
    }

    impl BindingStore for MemoryStore {
        fn load_bindings(&self, device: &str) -> Vec<CcBinding> {
            self.devices.borrow().get(device).cloned().unwrap_or_default()
        }

        fn save_bindings(&self, device: &str, bindings: &[CcBinding]) -> anyhow::Result<()> {
            *self.saves.borrow_mut() += 1;
            self.devices
                .borrow_mut()
                .insert(device.to_string(), bindings.to_vec());
            Ok(())
        }
    }

    fn engine_with_device(store: &MemoryStore) -> MappingEngine {
        let mut engine = MappingEngine::new(MidiSettings::default());
        engine.select_device(Some("pad".to_string()), store);
        engine
    }

    #[test]
    fn test_learn_binds_and_clears_selection() {
        let store = MemoryStore::default();
        let mut engine = engine_with_device(&store);

        engine.enter_learn_mode();
        engine.select_learn_target(LearnTarget::prompt("p1"));
        let outcome = engine.handle_cc(12, 40);

        assert_eq!(
            outcome,
            CcOutcome::Bound(CcBinding {
                cc: 12,
                target: LearnTarget::prompt("p1"),
            })
        );
        assert!(engine.is_learning());
        assert_eq!(engine.selected_target(), None);

        // No target selected: further CCs are ignored while learning
        assert_eq!(engine.handle_cc(13, 40), CcOutcome::Ignored);
    }

    #[test]
    fn test_binding_exclusivity_through_learn() {
        let store = MemoryStore::default();
        let mut engine = engine_with_device(&store);
        engine.enter_learn_mode();

        engine.select_learn_target(LearnTarget::prompt("a"));
        engine.handle_cc(12, 0);
        engine.select_learn_target(LearnTarget::prompt("b"));
        engine.handle_cc(12, 0);

        assert_eq!(engine.bindings().target(12), Some(&LearnTarget::prompt("b")));
        assert_eq!(engine.bindings().cc_for(&LearnTarget::prompt("a")), None);

        engine.select_learn_target(LearnTarget::prompt("b"));
        engine.handle_cc(30, 0);
        assert_eq!(engine.bindings().target(12), None);
        assert_eq!(engine.bindings().cc_for(&LearnTarget::prompt("b")), Some(30));
    }

    #[test]
    fn test_prompt_cc_scales_to_weight() {
        let store = MemoryStore::default();
        let mut engine = engine_with_device(&store);
        engine.enter_learn_mode();
        engine.select_learn_target(LearnTarget::prompt("p"));
        engine.handle_cc(1, 0);
        engine.exit_learn_mode(&store);

        assert_eq!(
            engine.handle_cc(1, 127),
            CcOutcome::Command(MidiCommand::SetPromptWeight {
                prompt_id: "p".to_string(),
                weight: 2.0
            })
        );
        assert_eq!(
            engine.handle_cc(1, 0),
            CcOutcome::Command(MidiCommand::SetPromptWeight {
                prompt_id: "p".to_string(),
                weight: 0.0
            })
        );
    }

    #[test]
    fn test_press_only_button_fires_every_press() {
        let store = MemoryStore::default();
        let mut engine = engine_with_device(&store);
        engine.enter_learn_mode();
        engine.select_learn_target(LearnTarget::action(ActionTag::Drop));
        engine.handle_cc(40, 127);
        engine.exit_learn_mode(&store);

        // The learning press doesn't count as held
        let drop = CcOutcome::Command(MidiCommand::Trigger(ActionTag::Drop));
        assert_eq!(engine.handle_cc(40, 127), drop);
        assert_eq!(engine.handle_cc(40, 127), drop);
    }

    #[test]
    fn test_action_with_release_does_not_repeat_while_held() {
        let store = MemoryStore::default();
        let mut engine = engine_with_device(&store);
        engine.enter_learn_mode();
        engine.select_learn_target(LearnTarget::action(ActionTag::Drop));
        engine.handle_cc(64, 127);
        engine.exit_learn_mode(&store);

        // Release first, then press
        assert_eq!(engine.handle_cc(64, 0), CcOutcome::Ignored);
        assert_eq!(
            engine.handle_cc(64, 127),
            CcOutcome::Command(MidiCommand::Trigger(ActionTag::Drop))
        );
        // Held: no repeat
        assert_eq!(engine.handle_cc(64, 100), CcOutcome::Ignored);
        assert_eq!(engine.handle_cc(64, 64), CcOutcome::Ignored);
        assert_eq!(
            engine.handle_cc(64, 65),
            CcOutcome::Command(MidiCommand::Trigger(ActionTag::Drop))
        );
    }

    #[test]
    fn test_exit_persists_bindings() {
        let store = MemoryStore::default();
        let mut engine = engine_with_device(&store);
        engine.enter_learn_mode();
        engine.select_learn_target(LearnTarget::prompt("p"));
        engine.handle_cc(3, 10);
        engine.exit_learn_mode(&store);

        assert_eq!(store.load_bindings("pad").len(), 1);
        assert_eq!(*store.saves.borrow(), 1);

        // Exiting while idle doesn't save again
        engine.exit_learn_mode(&store);
        assert_eq!(*store.saves.borrow(), 1);
    }

    #[test]
    fn test_device_change_clears_bindings_and_learn() {
        let store = MemoryStore::default();
        let stored = CcBinding {
            cc: 9,
            target: LearnTarget::prompt("x"),
        };
        store.save_bindings("other", &[stored]).unwrap();

        let mut engine = engine_with_device(&store);
        engine.enter_learn_mode();
        engine.select_learn_target(LearnTarget::prompt("p"));
        engine.handle_cc(1, 0);

        engine.select_device(Some("other".to_string()), &store);
        assert!(!engine.is_learning());
        assert_eq!(engine.bindings().target(1), None);
        assert_eq!(engine.bindings().target(9), Some(&LearnTarget::prompt("x")));

        engine.select_device(None, &store);
        assert!(engine.bindings().is_empty());
    }

    #[test]
    fn test_long_press_clears_only_when_idle() {
        let store = MemoryStore::default();
        let mut engine = engine_with_device(&store);
        engine.enter_learn_mode();
        engine.select_learn_target(LearnTarget::prompt("p"));
        engine.handle_cc(1, 0);
        engine.exit_learn_mode(&store);

        let t0 = Instant::now();
        engine.press_learn_toggle(t0);
        let outcome = engine.release_learn_toggle(t0 + Duration::from_millis(2000), &store);
        assert_eq!(outcome, ToggleOutcome::Cleared);
        assert!(engine.bindings().is_empty());
        assert!(store.load_bindings("pad").is_empty());
        assert!(!engine.is_learning());

        engine.press_learn_toggle(t0);
        let outcome = engine.release_learn_toggle(t0 + Duration::from_millis(100), &store);
        assert_eq!(outcome, ToggleOutcome::Entered);

        // Long press while learning behaves as a normal toggle
        engine.press_learn_toggle(t0);
        let outcome = engine.release_learn_toggle(t0 + Duration::from_millis(2000), &store);
        assert_eq!(outcome, ToggleOutcome::Exited);
    }

    #[test]
    fn test_unbound_cc_ignored() {
        let store = MemoryStore::default();
        let mut engine = engine_with_device(&store);
        assert_eq!(engine.handle_cc(77, 127), CcOutcome::Ignored);
    }
}
