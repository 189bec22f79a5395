//! CC binding map
//!
//! Keyed by CC number. Both sides are exclusive: a CC drives one target,
//! and a target is driven by at most one CC.

use crate::types::{CcBinding, LearnTarget};
use std::collections::BTreeMap;

/// Bindings for the active device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingMap {
    by_cc: BTreeMap<u8, LearnTarget>,
}

impl BindingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored bindings, applying the same exclusivity rules as
    /// [`bind`](Self::bind) (later entries win).
    pub fn from_bindings(bindings: &[CcBinding]) -> Self {
        let mut map = Self::new();
        for binding in bindings {
            map.bind(binding.cc, binding.target.clone());
        }
        map
    }

    /// Bind `cc` to `target`
    ///
    /// Replaces whatever `cc` was bound to, and removes the previous CC of
    /// `target` if it had one. Returns the CC numbers that lost a binding.
    pub fn bind(&mut self, cc: u8, target: LearnTarget) -> Vec<u8> {
        let mut displaced = Vec::new();

        if let Some(previous_cc) = self.cc_for(&target) {
            if previous_cc != cc {
                self.by_cc.remove(&previous_cc);
                displaced.push(previous_cc);
            }
        }

        if let Some(previous_target) = self.by_cc.insert(cc, target) {
            log::debug!("MIDI: CC {} rebound (was {})", cc, previous_target);
        }

        displaced
    }

    /// Target bound to a CC
    pub fn target(&self, cc: u8) -> Option<&LearnTarget> {
        self.by_cc.get(&cc)
    }

    /// CC bound to a target
    pub fn cc_for(&self, target: &LearnTarget) -> Option<u8> {
        self.by_cc
            .iter()
            .find(|(_, bound)| *bound == target)
            .map(|(cc, _)| *cc)
    }

    /// Remove the binding of a target (e.g. when its prompt is deleted)
    pub fn unbind_target(&mut self, target: &LearnTarget) -> Option<u8> {
        let cc = self.cc_for(target)?;
        self.by_cc.remove(&cc);
        Some(cc)
    }

    pub fn clear(&mut self) {
        self.by_cc.clear();
    }

    pub fn len(&self) -> usize {
        self.by_cc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cc.is_empty()
    }

    /// Bindings ordered by CC number
    pub fn to_bindings(&self) -> Vec<CcBinding> {
        self.by_cc
            .iter()
            .map(|(cc, target)| CcBinding {
                cc: *cc,
                target: target.clone(),
            })
            .collect()
    }
}
