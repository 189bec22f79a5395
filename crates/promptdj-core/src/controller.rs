//! Live controller - the single transition function
//!
//! Every state change of the application goes through
//! [`LiveController::handle`] (inputs) or [`LiveController::poll_timers`]
//! (deadlines). Both take `now` explicitly and never block.

use crate::audio::{AudioFormat, AudioOutput};
use crate::config::LiveConfig;
use crate::effects::{AbortMode, EffectProgress, EffectSequencer};
use crate::messages::{ControllerInput, Notifier, UiCommand, UiNotice};
use crate::mixer::{default_prompts, PromptMixer, PushDecision, PushThrottle};
use crate::relay::AudioRelay;
use crate::session::{
    ConnectPolicy, GenerationService, GenerationSessionManager, SessionDeps, SessionUpdate,
};
use crate::store::PromptStore;
use crate::timer::earliest;
use crate::types::{PlaybackState, PromptId};
use flume::Sender;
use promptdj_midi::{
    ActionTag, CcOutcome, LearnTarget, MappingEngine, MidiCommand, MidiInputEvent, ToggleOutcome,
};
use std::ops::ControlFlow;
use std::time::Instant;

/// Collaborators of the controller
pub struct ControllerDeps {
    pub service: Box<dyn GenerationService>,
    pub output: Box<dyn AudioOutput>,
    pub relay: Option<Box<dyn AudioRelay>>,
    pub store: Box<dyn PromptStore>,
    /// Controller input channel, handed to every session
    pub events_tx: Sender<ControllerInput>,
    pub notifier: Notifier,
}

/// Where a prompt edit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditSource {
    Ui,
    Midi,
}

pub struct LiveController {
    mixer: PromptMixer,
    throttle: PushThrottle,
    session: GenerationSessionManager,
    effects: EffectSequencer,
    midi: MappingEngine,
    store: Box<dyn PromptStore>,
    notifier: Notifier,
    /// Effect run whose MIDI edit rejection was already shown
    midi_guard_reported: Option<u64>,
}

impl LiveController {
    pub fn new(config: LiveConfig, deps: ControllerDeps) -> Self {
        let prompts = match deps.store.load_prompts() {
            Some(prompts) if !prompts.is_empty() => prompts,
            _ => {
                log::info!("No stored prompts, using the default palette");
                default_prompts()
            }
        };
        let mixer = PromptMixer::with_prompts(config.mixer.activity_threshold, prompts);

        let session = GenerationSessionManager::new(
            SessionDeps {
                service: deps.service,
                output: deps.output,
                relay: deps.relay,
                events_tx: deps.events_tx,
                notifier: deps.notifier.clone(),
            },
            config.session.clone(),
            AudioFormat::from_config(&config.audio),
            config.audio.lookahead_secs,
            config.audio.gain_ramp(),
        );

        Self {
            mixer,
            throttle: PushThrottle::new(config.mixer.push_interval()),
            session,
            effects: EffectSequencer::new(config.effects.clone()),
            midi: MappingEngine::new(config.midi.clone()),
            store: deps.store,
            notifier: deps.notifier,
            midi_guard_reported: None,
        }
    }

    pub fn mixer(&self) -> &PromptMixer {
        &self.mixer
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state()
    }

    pub fn session(&self) -> &GenerationSessionManager {
        &self.session
    }

    pub fn effects(&self) -> &EffectSequencer {
        &self.effects
    }

    pub fn midi(&self) -> &MappingEngine {
        &self.midi
    }

    /// Earliest pending timer
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.throttle.deadline(),
            self.effects.next_deadline(),
            self.session.next_deadline(),
        ])
    }

    /// Apply one input; `Break` after shutdown
    pub fn handle(&mut self, input: ControllerInput, now: Instant) -> ControlFlow<()> {
        match input {
            ControllerInput::Ui(command) => self.handle_ui(command, now),
            ControllerInput::Midi(event) => self.handle_midi(event, now),
            ControllerInput::Session(message) => {
                match self.session.handle_event(message, &mut self.mixer, now) {
                    SessionUpdate::None => {}
                    SessionUpdate::Filtered => {
                        self.push_now(now);
                        self.notify_prompts();
                    }
                    SessionUpdate::Ended => self.on_session_ended(),
                }
            }
            ControllerInput::Shutdown => {
                self.shutdown();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Fire every due timer
    pub fn poll_timers(&mut self, now: Instant) {
        if self.throttle.poll(now) {
            self.push_now(now);
        }

        if let Some(progress) = self.effects.poll(&mut self.mixer, now) {
            self.push_now(now);
            if let EffectProgress::Finished(kind) = progress {
                log::debug!("Effects: {} done, mix restored", kind);
            }
            self.notify_prompts();
        }

        if self.session.poll_timers(&self.mixer, now) == SessionUpdate::Ended {
            self.on_session_ended();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // UI
    // ─────────────────────────────────────────────────────────────

    fn handle_ui(&mut self, command: UiCommand, now: Instant) {
        match command {
            UiCommand::AddPrompt { text, weight, color } => {
                if self.guard_edit(EditSource::Ui) {
                    let id = self.mixer.add_prompt(text, weight, color);
                    log::debug!("Prompt {} added", id);
                    self.after_structure_change(now);
                }
            }
            UiCommand::RemovePrompt { id } => self.remove_prompt(&id, now),
            UiCommand::SetPromptText { id, text } => {
                if self.guard_edit(EditSource::Ui) {
                    let result = self.mixer.set_prompt_text(&id, text);
                    self.after_edit(result, now);
                }
            }
            UiCommand::SetPromptWeight { id, weight } => {
                self.set_weight(&id, weight, EditSource::Ui, now);
            }
            UiCommand::SetPromptColor { id, color } => {
                // Display only, nothing to push
                match self.mixer.set_prompt_color(&id, color) {
                    Ok(()) => self.notify_prompts(),
                    Err(e) => self.notifier.error(e.to_string()),
                }
            }
            UiCommand::ResetPrompts => self.reset_prompts(now),
            UiCommand::ClearFiltered { text } => {
                if self.mixer.clear_filtered(&text) {
                    self.request_push(now);
                    self.notify_prompts();
                }
            }

            UiCommand::Play => self.play(now, ConnectPolicy::Once),
            UiCommand::Pause => self.pause(),
            UiCommand::Stop => self.stop(),
            UiCommand::TogglePlayPause => self.toggle_play_pause(now, ConnectPolicy::Once),

            UiCommand::Drop => self.trigger(&ActionTag::Drop, now),
            UiCommand::Transition => self.trigger(&ActionTag::Transition, now),

            UiCommand::SelectMidiDevice(device) => {
                self.midi.select_device(device, self.store.bindings());
                self.notify_learn();
                self.notify_bindings();
            }
            UiCommand::EnterLearn => {
                self.midi.enter_learn_mode();
                self.notify_learn();
            }
            UiCommand::ExitLearn | UiCommand::CancelLearn => {
                self.midi.exit_learn_mode(self.store.bindings());
                self.notify_learn();
            }
            UiCommand::LearnTogglePressed => self.midi.press_learn_toggle(now),
            UiCommand::LearnToggleReleased => {
                match self.midi.release_learn_toggle(now, self.store.bindings()) {
                    ToggleOutcome::Cleared => self.notify_bindings(),
                    ToggleOutcome::Entered | ToggleOutcome::Exited => self.notify_learn(),
                }
            }
            UiCommand::SelectLearnTarget(target) => self.select_learn_target(target),
            UiCommand::ClearBindings => {
                self.midi.clear_bindings(self.store.bindings());
                self.notify_bindings();
            }
        }
    }

    fn select_learn_target(&mut self, target: LearnTarget) {
        if let LearnTarget::Prompt(id) = &target {
            if self.mixer.prompt(&PromptId::new(id.as_str())).is_none() {
                self.notifier.error(format!("Unknown prompt: {}", id));
                return;
            }
        }
        if self.midi.select_learn_target(target) {
            self.notify_learn();
        } else {
            log::debug!("MIDI: Learn target ignored outside learn mode");
        }
    }

    // ─────────────────────────────────────────────────────────────
    // MIDI
    // ─────────────────────────────────────────────────────────────

    fn handle_midi(&mut self, event: MidiInputEvent, now: Instant) {
        let Some((cc, value)) = event.as_cc() else {
            return;
        };

        match self.midi.handle_cc(cc, value) {
            CcOutcome::Bound(_) => {
                self.notify_bindings();
                self.notify_learn();
            }
            CcOutcome::Command(MidiCommand::SetPromptWeight { prompt_id, weight }) => {
                self.set_weight(&PromptId::new(prompt_id), weight, EditSource::Midi, now);
            }
            CcOutcome::Command(MidiCommand::Trigger(tag)) => match tag {
                ActionTag::PlayPause => self.toggle_play_pause(now, ConnectPolicy::WithRetry),
                other => self.trigger(&other, now),
            },
            CcOutcome::Ignored => {}
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Prompts
    // ─────────────────────────────────────────────────────────────

    /// Whether a prompt edit may proceed; reports the rejection otherwise
    ///
    /// MIDI rejections are shown once per effect run.
    fn guard_edit(&mut self, source: EditSource) -> bool {
        match self.effects.check_edit() {
            Ok(()) => true,
            Err(e) if source == EditSource::Midi => {
                log::debug!("MIDI: {}", e);
                let run = self.effects.current().map(|run| run.id);
                if run != self.midi_guard_reported {
                    self.midi_guard_reported = run;
                    self.notifier.error(e.to_string());
                }
                false
            }
            Err(e) => {
                self.notifier.error(e.to_string());
                false
            }
        }
    }

    fn set_weight(&mut self, id: &PromptId, weight: f32, source: EditSource, now: Instant) {
        if !self.guard_edit(source) {
            return;
        }
        let result = self.mixer.set_prompt_weight(id, weight);
        if source == EditSource::Midi {
            if let Err(e) = &result {
                log::debug!("MIDI: {}", e);
                return;
            }
        }
        self.after_edit(result, now);
    }

    fn remove_prompt(&mut self, id: &PromptId, now: Instant) {
        if !self.guard_edit(EditSource::Ui) {
            return;
        }
        match self.mixer.remove_prompt(id) {
            Ok(prompt) => {
                log::debug!("Prompt {} ('{}') removed", prompt.id, prompt.text);
                if self.midi.forget_target(&LearnTarget::prompt(id.as_str())) {
                    self.notify_bindings();
                }
                self.after_structure_change(now);
            }
            Err(e) => self.notifier.error(e.to_string()),
        }
    }

    /// Full reset: session stopped, effect discarded, default palette back
    fn reset_prompts(&mut self, now: Instant) {
        log::info!("Resetting prompts to the default palette");
        self.throttle.cancel();
        self.effects.abort(&mut self.mixer, AbortMode::Discard);
        self.session.stop();

        let removed: Vec<PromptId> = self.mixer.prompts().iter().map(|p| p.id.clone()).collect();
        self.mixer.reset(default_prompts());
        let mut forgot = false;
        for id in removed {
            if self.mixer.prompt(&id).is_none() {
                forgot |= self.midi.forget_target(&LearnTarget::prompt(id.as_str()));
            }
        }
        if forgot {
            self.notify_bindings();
        }
        self.after_structure_change(now);
    }

    fn after_edit<E: std::fmt::Display>(&mut self, result: Result<(), E>, now: Instant) {
        match result {
            Ok(()) => {
                self.request_push(now);
                self.notify_prompts();
            }
            Err(e) => self.notifier.error(e.to_string()),
        }
    }

    fn after_structure_change(&mut self, now: Instant) {
        self.request_push(now);
        self.notify_prompts();
        self.save_prompts();
    }

    fn save_prompts(&self) {
        if let Err(e) = self.store.save_prompts(self.mixer.prompts()) {
            log::warn!("Failed to save prompts: {:#}", e);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Pushes
    // ─────────────────────────────────────────────────────────────

    fn request_push(&mut self, now: Instant) {
        match self.throttle.request(now) {
            PushDecision::PushNow => self.push_now(now),
            PushDecision::Deferred(at) => log::trace!("Push deferred by {:?}", at - now),
            PushDecision::Coalesced => {}
        }
    }

    /// Push the mix as it is right now
    fn push_now(&mut self, now: Instant) {
        let mix = self.mixer.snapshot();
        match self.session.push_mix(&mix) {
            Ok(true) => self.throttle.record_push(now),
            Ok(false) => {}
            Err(e) => {
                log::error!("Session: Mix push failed: {}", e);
                self.throttle.cancel();
                if self.effects.abort(&mut self.mixer, AbortMode::Restore).is_some() {
                    self.notify_prompts();
                }
                self.session.fail(&e);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Transport and effects
    // ─────────────────────────────────────────────────────────────

    fn play(&mut self, now: Instant, policy: ConnectPolicy) {
        if let Err(e) = self.session.play(&self.mixer, now, policy) {
            log::info!("Session: Play rejected: {}", e);
            self.notifier.error(e.to_string());
        }
    }

    fn pause(&mut self) {
        if let Err(e) = self.session.pause() {
            log::info!("Session: Pause rejected: {}", e);
            self.notifier.error(e.to_string());
        }
    }

    fn toggle_play_pause(&mut self, now: Instant, policy: ConnectPolicy) {
        match self.session.state() {
            PlaybackState::Playing | PlaybackState::Loading => self.pause(),
            PlaybackState::Stopped | PlaybackState::Paused => self.play(now, policy),
        }
    }

    fn stop(&mut self) {
        self.throttle.cancel();
        if self.effects.abort(&mut self.mixer, AbortMode::Restore).is_some() {
            self.notify_prompts();
        }
        self.session.stop();
        self.save_prompts();
    }

    fn trigger(&mut self, tag: &ActionTag, now: Instant) {
        let state = self.session.state();
        let result = match tag {
            ActionTag::Drop => self.effects.start_drop(&mut self.mixer, state, now),
            ActionTag::Transition => self.effects.start_transition(&mut self.mixer, state, now),
            ActionTag::PlayPause => {
                self.toggle_play_pause(now, ConnectPolicy::Once);
                return;
            }
            ActionTag::Effect(name) => {
                self.notifier.error(format!("Unknown effect: {}", name));
                return;
            }
        };

        match result {
            Ok(()) => {
                self.push_now(now);
                self.notify_prompts();
            }
            Err(e) => {
                log::info!("Effects: {} rejected: {}", tag, e);
                self.notifier.error(e.to_string());
            }
        }
    }

    fn on_session_ended(&mut self) {
        self.throttle.cancel();
        if self.effects.abort(&mut self.mixer, AbortMode::Restore).is_some() {
            self.notify_prompts();
        }
    }

    fn shutdown(&mut self) {
        log::info!("Controller shutting down");
        self.throttle.cancel();
        self.effects.abort(&mut self.mixer, AbortMode::Restore);
        self.session.stop();
        self.midi.exit_learn_mode(self.store.bindings());
        self.save_prompts();
    }

    // ─────────────────────────────────────────────────────────────
    // Notices
    // ─────────────────────────────────────────────────────────────

    fn notify_prompts(&self) {
        self.notifier
            .notify(UiNotice::PromptsChanged(self.mixer.display_prompts()));
    }

    fn notify_learn(&self) {
        self.notifier.notify(UiNotice::LearnStateChanged {
            is_learning: self.midi.is_learning(),
            selected_target: self.midi.selected_target().cloned(),
        });
    }

    fn notify_bindings(&self) {
        self.notifier
            .notify(UiNotice::BindingsChanged(self.midi.bindings().to_bindings()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::DROP_TRACK_ID;
    use crate::session::SessionEvent;
    use crate::testing::{FakeOutput, FakeService, MemoryStore, ServiceLog};
    use crate::types::{Prompt, WeightedPrompt};
    use flume::Receiver;
    use promptdj_midi::{BindingStore, CcBinding};
    use std::time::Duration;

    struct Fixture {
        controller: LiveController,
        log: ServiceLog,
        output: FakeOutput,
        store: MemoryStore,
        inputs: Receiver<ControllerInput>,
        notices: Receiver<UiNotice>,
    }

    fn band() -> Vec<Prompt> {
        vec![
            Prompt::new("a", "drums", 1.0),
            Prompt::new("b", "piano", 1.0),
            Prompt::new("c", "choir", 0.0),
        ]
    }

    fn fixture_with(service: FakeService, store: MemoryStore) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let log = service.log();
        let output = FakeOutput::new();
        let (events_tx, inputs) = flume::unbounded();
        let (notice_tx, notices) = flume::unbounded();
        let controller = LiveController::new(
            LiveConfig::default(),
            ControllerDeps {
                service: Box::new(service),
                output: Box::new(output.clone()),
                relay: None,
                store: Box::new(store.clone()),
                events_tx,
                notifier: Notifier::new(notice_tx),
            },
        );
        Fixture {
            controller,
            log,
            output,
            store,
            inputs,
            notices,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeService::new(), MemoryStore::with_prompts(band()))
    }

    fn ui(f: &mut Fixture, command: UiCommand, now: Instant) {
        let _ = f.controller.handle(command.into(), now);
    }

    fn cc(f: &mut Fixture, cc: u8, value: u8, now: Instant) {
        let event = MidiInputEvent::ControlChange {
            channel: 0,
            cc,
            value,
        };
        let _ = f.controller.handle(event.into(), now);
    }

    /// Handle everything the fake service sent
    fn pump(f: &mut Fixture, now: Instant) {
        while let Ok(input) = f.inputs.try_recv() {
            let _ = f.controller.handle(input, now);
        }
    }

    fn session_event(f: &mut Fixture, event: SessionEvent, now: Instant) {
        let events = f.log.events().unwrap();
        assert!(events.send(event));
        pump(f, now);
    }

    fn start_playing(f: &mut Fixture, now: Instant) {
        ui(f, UiCommand::Play, now);
        session_event(f, SessionEvent::SetupComplete, now);
        session_event(f, SessionEvent::AudioFrame(vec![0u8; 48_000 * 2]), now);
        assert_eq!(f.controller.state(), PlaybackState::Playing);
    }

    fn errors(f: &Fixture) -> Vec<String> {
        f.notices
            .try_iter()
            .filter_map(|n| match n {
                UiNotice::Error { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn bind(store: &MemoryStore, device: &str, cc: u8, target: LearnTarget) {
        store
            .save_bindings(device, &[CcBinding { cc, target }])
            .unwrap();
    }

    fn weight(f: &Fixture, id: &str) -> f32 {
        f.controller.mixer().prompt(&PromptId::new(id)).unwrap().weight
    }

    #[test]
    fn test_empty_store_loads_default_palette() {
        let f = fixture_with(FakeService::new(), MemoryStore::new());
        let prompts = f.controller.mixer().prompts();
        assert_eq!(prompts.len(), 8);
        assert_eq!(prompts[0].text, "Bossa Nova");
        assert!(f.controller.mixer().has_active_prompt());
    }

    #[test]
    fn test_play_rejected_without_active_prompt() {
        let store = MemoryStore::with_prompts(vec![
            Prompt::new("a", "drums", 0.0),
            Prompt::new("b", "piano", 0.005),
        ]);
        let mut f = fixture_with(FakeService::new(), store);

        ui(&mut f, UiCommand::Play, Instant::now());

        assert_eq!(f.controller.state(), PlaybackState::Stopped);
        assert_eq!(f.log.connects(), 0);
        assert!(f.log.mixes().is_empty());
        assert_eq!(errors(&f), vec!["need an active prompt".to_string()]);
    }

    #[test]
    fn test_play_pushes_active_mix() {
        let mut f = fixture();
        start_playing(&mut f, Instant::now());

        assert_eq!(f.log.plays(), 1);
        assert_eq!(
            f.log.last_mix(),
            Some(vec![
                WeightedPrompt::new("drums", 1.0),
                WeightedPrompt::new("piano", 1.0),
            ])
        );
        assert_eq!(f.output.scheduled_starts(), vec![1.5]);
    }

    #[test]
    fn test_weight_edits_are_throttled() {
        let mut f = fixture();
        let t0 = Instant::now();
        start_playing(&mut f, t0);
        let pushes = f.log.mixes().len();

        let t1 = t0 + Duration::from_secs(1);
        let id = PromptId::new("b");
        for (offset, value) in [(0, 0.5), (10, 0.6), (20, 0.7)] {
            ui(
                &mut f,
                UiCommand::SetPromptWeight {
                    id: id.clone(),
                    weight: value,
                },
                t1 + Duration::from_millis(offset),
            );
        }

        // Leading edge only; the rest waits for the trailing push
        assert_eq!(f.log.mixes().len(), pushes + 1);
        assert_eq!(f.log.last_mix().unwrap()[1].weight, 0.5);
        assert_eq!(f.controller.next_deadline(), Some(t1 + Duration::from_millis(250)));

        f.controller.poll_timers(t1 + Duration::from_millis(250));
        assert_eq!(f.log.mixes().len(), pushes + 2);
        assert_eq!(f.log.last_mix().unwrap()[1].weight, 0.7);
        assert_eq!(f.controller.next_deadline(), None);
    }

    #[test]
    fn test_color_edit_does_not_push() {
        let mut f = fixture();
        start_playing(&mut f, Instant::now());
        let pushes = f.log.mixes().len();

        ui(
            &mut f,
            UiCommand::SetPromptColor {
                id: PromptId::new("a"),
                color: "#ff0000".to_string(),
            },
            Instant::now(),
        );
        assert_eq!(f.log.mixes().len(), pushes);
        assert_eq!(f.controller.mixer().prompt(&"a".into()).unwrap().color, "#ff0000");
    }

    #[test]
    fn test_filtered_prompt_is_excluded_until_cleared() {
        let mut f = fixture();
        let t0 = Instant::now();
        start_playing(&mut f, t0);
        f.notices.drain();

        session_event(
            &mut f,
            SessionEvent::FilteredPrompt {
                text: "piano".to_string(),
                reason: "policy".to_string(),
            },
            t0,
        );

        assert_eq!(f.log.last_mix(), Some(vec![WeightedPrompt::new("drums", 1.0)]));
        assert!(f.notices.try_iter().any(|n| n
            == UiNotice::PromptFiltered {
                text: "piano".to_string(),
                reason: "policy".to_string(),
            }));
        // Still shown with its weight
        assert_eq!(weight(&f, "b"), 1.0);

        // Raising the weight does not bring it back
        let t1 = t0 + Duration::from_secs(1);
        ui(
            &mut f,
            UiCommand::SetPromptWeight {
                id: PromptId::new("b"),
                weight: 1.5,
            },
            t1,
        );
        assert_eq!(f.log.last_mix(), Some(vec![WeightedPrompt::new("drums", 1.0)]));

        let t2 = t1 + Duration::from_secs(1);
        ui(
            &mut f,
            UiCommand::ClearFiltered {
                text: "piano".to_string(),
            },
            t2,
        );
        assert_eq!(
            f.log.last_mix(),
            Some(vec![
                WeightedPrompt::new("drums", 1.0),
                WeightedPrompt::new("piano", 1.5),
            ])
        );
    }

    #[test]
    fn test_drop_runs_phases_and_restores_exactly() {
        let mut f = fixture();
        let t0 = Instant::now();
        start_playing(&mut f, t0);
        let before = f.controller.mixer().prompts().to_vec();

        ui(&mut f, UiCommand::Drop, t0);
        let silence = f.log.last_mix().unwrap();
        assert_eq!(silence.len(), 3);
        assert_eq!(silence[0], WeightedPrompt::new("drums", 0.001));
        assert_eq!(silence[1], WeightedPrompt::new("piano", 0.001));
        assert_eq!(silence[2].weight, 1.8);
        assert!(f
            .controller
            .mixer()
            .display_prompts()
            .iter()
            .any(|p| p.id.as_str() == DROP_TRACK_ID));

        f.controller.poll_timers(t0 + Duration::from_millis(3000));
        let impact = f.log.last_mix().unwrap();
        assert_eq!(impact.len(), 2);
        assert_eq!(impact[0], WeightedPrompt::new("drums", 2.0));
        assert!((impact[1].weight - 1.2).abs() < 1e-6);

        f.controller.poll_timers(t0 + Duration::from_millis(11_000));
        assert!(!f.controller.effects().is_running());
        assert_eq!(f.controller.mixer().prompts(), before.as_slice());
        assert_eq!(
            f.log.last_mix(),
            Some(vec![
                WeightedPrompt::new("drums", 1.0),
                WeightedPrompt::new("piano", 1.0),
            ])
        );
        assert!(errors(&f).is_empty());
    }

    #[test]
    fn test_drop_rejected_when_not_playing() {
        let mut f = fixture();
        ui(&mut f, UiCommand::Drop, Instant::now());

        assert!(!f.controller.effects().is_running());
        let errors = errors(&f);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("stopped"), "{}", errors[0]);
    }

    #[test]
    fn test_edits_rejected_while_effect_runs() {
        let store = MemoryStore::with_prompts(band());
        bind(&store, "nano", 20, LearnTarget::prompt("b"));
        let mut f = fixture_with(FakeService::new(), store);
        let t0 = Instant::now();
        ui(&mut f, UiCommand::SelectMidiDevice(Some("nano".to_string())), t0);
        start_playing(&mut f, t0);
        ui(&mut f, UiCommand::Drop, t0);
        f.notices.drain();

        ui(
            &mut f,
            UiCommand::SetPromptWeight {
                id: PromptId::new("a"),
                weight: 0.2,
            },
            t0,
        );
        let ui_errors = errors(&f);
        assert_eq!(ui_errors.len(), 1);
        assert!(ui_errors[0].contains("locked"));
        assert_eq!(weight(&f, "a"), 1.0);

        // A knob sweep shows the rejection once per run
        cc(&mut f, 20, 10, t0);
        cc(&mut f, 20, 30, t0);
        cc(&mut f, 20, 50, t0);
        assert_eq!(weight(&f, "b"), 1.0);
        let midi_errors = errors(&f);
        assert_eq!(midi_errors.len(), 1);
        assert!(midi_errors[0].contains("locked"));

        // Next run reports again
        f.controller.poll_timers(t0 + Duration::from_secs(60));
        f.controller.poll_timers(t0 + Duration::from_secs(120));
        assert!(!f.controller.effects().is_running());
        ui(&mut f, UiCommand::Drop, t0 + Duration::from_secs(120));
        f.notices.drain();
        cc(&mut f, 20, 70, t0 + Duration::from_secs(120));
        assert_eq!(errors(&f).len(), 1);
    }

    #[test]
    fn test_stop_aborts_transition_and_restores() {
        let mut f = fixture();
        let t0 = Instant::now();
        start_playing(&mut f, t0);
        let before = f.controller.mixer().prompts().to_vec();

        ui(&mut f, UiCommand::Transition, t0);
        assert!(f.controller.effects().is_running());
        assert!(f.log.last_mix().unwrap()[0].text.contains("building tension"));

        ui(&mut f, UiCommand::Stop, t0 + Duration::from_secs(1));
        assert_eq!(f.controller.state(), PlaybackState::Stopped);
        assert!(!f.controller.effects().is_running());
        assert_eq!(f.controller.mixer().prompts(), before.as_slice());
        assert_eq!(f.controller.mixer().overlay(), None);
        assert_eq!(f.log.stops(), 1);
        assert_eq!(f.output.gain_target(), 0.0);
        assert_eq!(f.controller.next_deadline(), None);
    }

    #[test]
    fn test_push_failure_during_effect_restores_and_stops() {
        let mut f = fixture();
        let t0 = Instant::now();
        start_playing(&mut f, t0);
        let before = f.controller.mixer().prompts().to_vec();
        ui(&mut f, UiCommand::Drop, t0);
        f.notices.drain();

        f.log.set_fail_pushes(true);
        f.controller.poll_timers(t0 + Duration::from_millis(3000));

        assert_eq!(f.controller.state(), PlaybackState::Stopped);
        assert!(!f.controller.effects().is_running());
        assert_eq!(f.controller.mixer().prompts(), before.as_slice());
        assert_eq!(errors(&f).len(), 1);
    }

    #[test]
    fn test_session_close_during_effect_restores() {
        let mut f = fixture();
        let t0 = Instant::now();
        start_playing(&mut f, t0);
        let before = f.controller.mixer().prompts().to_vec();
        ui(&mut f, UiCommand::Drop, t0);

        session_event(&mut f, SessionEvent::Closed, t0);
        assert_eq!(f.controller.state(), PlaybackState::Stopped);
        assert!(!f.controller.effects().is_running());
        assert_eq!(f.controller.mixer().prompts(), before.as_slice());
    }

    #[test]
    fn test_midi_learn_binds_and_persists_on_exit() {
        let mut f = fixture();
        let now = Instant::now();
        ui(&mut f, UiCommand::SelectMidiDevice(Some("nano".to_string())), now);
        ui(&mut f, UiCommand::EnterLearn, now);
        ui(&mut f, UiCommand::SelectLearnTarget(LearnTarget::prompt("b")), now);
        f.notices.drain();

        cc(&mut f, 20, 0, now);
        let binding = CcBinding {
            cc: 20,
            target: LearnTarget::prompt("b"),
        };
        assert!(f
            .notices
            .try_iter()
            .any(|n| n == UiNotice::BindingsChanged(vec![binding.clone()])));
        // Not persisted before learn mode ends
        assert!(f.store.stored_bindings("nano").is_empty());

        ui(&mut f, UiCommand::ExitLearn, now);
        assert_eq!(f.store.stored_bindings("nano"), vec![binding]);

        cc(&mut f, 20, 127, now);
        assert_eq!(weight(&f, "b"), 2.0);
    }

    #[test]
    fn test_learn_target_must_exist() {
        let mut f = fixture();
        let now = Instant::now();
        ui(&mut f, UiCommand::EnterLearn, now);
        ui(&mut f, UiCommand::SelectLearnTarget(LearnTarget::prompt("nope")), now);

        assert_eq!(f.controller.midi().selected_target(), None);
        assert_eq!(errors(&f), vec!["Unknown prompt: nope".to_string()]);
    }

    #[test]
    fn test_midi_trigger_fires_per_press() {
        let store = MemoryStore::with_prompts(band());
        bind(&store, "nano", 21, LearnTarget::action(ActionTag::Drop));
        let mut f = fixture_with(FakeService::new(), store);
        let t0 = Instant::now();
        ui(&mut f, UiCommand::SelectMidiDevice(Some("nano".to_string())), t0);
        start_playing(&mut f, t0);

        cc(&mut f, 21, 127, t0);
        assert!(f.controller.effects().is_running());
        f.notices.drain();

        // No release sent: the second press is a trigger too
        cc(&mut f, 21, 127, t0);
        let repeated = errors(&f);
        assert_eq!(repeated.len(), 1);
        assert!(repeated[0].contains("already running"));

        // Once the button has sent a release, holding it doesn't retrigger
        cc(&mut f, 21, 0, t0);
        cc(&mut f, 21, 127, t0);
        assert_eq!(errors(&f).len(), 1);
        cc(&mut f, 21, 120, t0);
        assert!(errors(&f).is_empty());
    }

    #[test]
    fn test_midi_play_retries_connect() {
        let store = MemoryStore::with_prompts(band());
        bind(&store, "nano", 22, LearnTarget::action(ActionTag::PlayPause));
        let mut f = fixture_with(FakeService::failing(1), store);
        let t0 = Instant::now();
        ui(&mut f, UiCommand::SelectMidiDevice(Some("nano".to_string())), t0);

        cc(&mut f, 22, 127, t0);
        assert_eq!(f.controller.state(), PlaybackState::Loading);
        assert_eq!(f.log.connects(), 1);
        assert_eq!(f.controller.next_deadline(), Some(t0 + Duration::from_millis(500)));

        f.controller.poll_timers(t0 + Duration::from_millis(500));
        assert_eq!(f.log.connects(), 2);
        assert_eq!(f.controller.state(), PlaybackState::Loading);
    }

    #[test]
    fn test_reset_discards_running_effect() {
        let store = MemoryStore::with_prompts(band());
        bind(&store, "nano", 20, LearnTarget::prompt("b"));
        let mut f = fixture_with(FakeService::new(), store);
        let t0 = Instant::now();
        ui(&mut f, UiCommand::SelectMidiDevice(Some("nano".to_string())), t0);
        start_playing(&mut f, t0);
        ui(&mut f, UiCommand::Drop, t0);
        f.notices.drain();

        ui(&mut f, UiCommand::ResetPrompts, t0 + Duration::from_secs(1));

        assert_eq!(f.controller.state(), PlaybackState::Stopped);
        assert!(!f.controller.effects().is_running());
        assert_eq!(f.controller.mixer().prompts(), default_prompts().as_slice());
        assert_eq!(f.controller.mixer().overlay(), None);
        assert_eq!(f.controller.next_deadline(), None);
        assert!(f.controller.midi().bindings().is_empty());
        assert_eq!(f.store.stored_prompts(), Some(default_prompts()));
        assert!(errors(&f).is_empty());
    }

    #[test]
    fn test_remove_prompt_forgets_its_binding() {
        let store = MemoryStore::with_prompts(band());
        bind(&store, "nano", 20, LearnTarget::prompt("b"));
        let mut f = fixture_with(FakeService::new(), store);
        let now = Instant::now();
        ui(&mut f, UiCommand::SelectMidiDevice(Some("nano".to_string())), now);
        f.notices.drain();

        ui(&mut f, UiCommand::RemovePrompt { id: PromptId::new("b") }, now);

        assert!(f.controller.midi().bindings().is_empty());
        assert!(f
            .notices
            .try_iter()
            .any(|n| n == UiNotice::BindingsChanged(Vec::new())));
        let saved = f.store.stored_prompts().unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|p| p.id.as_str() != "b"));
    }

    #[test]
    fn test_add_prompt_is_saved() {
        let mut f = fixture();
        ui(
            &mut f,
            UiCommand::AddPrompt {
                text: "Acid Bass".to_string(),
                weight: 0.8,
                color: "#00ff00".to_string(),
            },
            Instant::now(),
        );

        let prompts = f.controller.mixer().prompts();
        assert_eq!(prompts.len(), 4);
        assert_eq!(prompts[3].text, "Acid Bass");
        assert_eq!(f.store.prompt_saves(), 1);
    }

    #[test]
    fn test_shutdown_stops_and_saves() {
        let mut f = fixture();
        start_playing(&mut f, Instant::now());

        let flow = f.controller.handle(ControllerInput::Shutdown, Instant::now());
        assert!(flow.is_break());
        assert_eq!(f.controller.state(), PlaybackState::Stopped);
        assert_eq!(f.log.stops(), 1);
        assert_eq!(f.store.stored_prompts(), Some(band()));
    }
}
