//! Scripted fakes for the service, the output and the stores

use crate::audio::{AudioBuffer, AudioOutput, AudioResult};
use crate::session::{
    GenerationConfig, GenerationService, ServiceError, SessionEvents, SessionHandle,
};
use crate::store::PromptStore;
use crate::types::{Prompt, WeightedPrompt};
use promptdj_midi::{BindingStore, CcBinding};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Default)]
struct ServiceState {
    connects: usize,
    fail_connects: usize,
    fail_pushes: bool,
    plays: usize,
    pauses: usize,
    stops: usize,
    configs: usize,
    mixes: Vec<Vec<WeightedPrompt>>,
    events: Option<SessionEvents>,
}

/// Shared view of everything the fake service received
#[derive(Clone, Default)]
pub struct ServiceLog(Rc<RefCell<ServiceState>>);

impl ServiceLog {
    pub fn connects(&self) -> usize {
        self.0.borrow().connects
    }

    pub fn plays(&self) -> usize {
        self.0.borrow().plays
    }

    pub fn pauses(&self) -> usize {
        self.0.borrow().pauses
    }

    pub fn stops(&self) -> usize {
        self.0.borrow().stops
    }

    pub fn configs(&self) -> usize {
        self.0.borrow().configs
    }

    pub fn mixes(&self) -> Vec<Vec<WeightedPrompt>> {
        self.0.borrow().mixes.clone()
    }

    pub fn last_mix(&self) -> Option<Vec<WeightedPrompt>> {
        self.0.borrow().mixes.last().cloned()
    }

    /// Event sink of the latest session
    pub fn events(&self) -> Option<SessionEvents> {
        self.0.borrow().events.clone()
    }

    pub fn set_fail_pushes(&self, fail: bool) {
        self.0.borrow_mut().fail_pushes = fail;
    }
}

pub struct FakeService {
    log: ServiceLog,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            log: ServiceLog::default(),
        }
    }

    /// The first `n` connects fail
    pub fn failing(n: usize) -> Self {
        let service = Self::new();
        service.log.0.borrow_mut().fail_connects = n;
        service
    }

    pub fn log(&self) -> ServiceLog {
        self.log.clone()
    }
}

impl GenerationService for FakeService {
    fn connect(&mut self, events: SessionEvents) -> Result<Box<dyn SessionHandle>, ServiceError> {
        let mut state = self.log.0.borrow_mut();
        state.connects += 1;
        if state.connects <= state.fail_connects {
            return Err(ServiceError::Connect("refused".to_string()));
        }
        state.events = Some(events);
        Ok(Box::new(FakeHandle {
            log: self.log.clone(),
        }))
    }
}

struct FakeHandle {
    log: ServiceLog,
}

impl SessionHandle for FakeHandle {
    fn play(&mut self) -> Result<(), ServiceError> {
        self.log.0.borrow_mut().plays += 1;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), ServiceError> {
        self.log.0.borrow_mut().pauses += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        self.log.0.borrow_mut().stops += 1;
        Ok(())
    }

    fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> Result<(), ServiceError> {
        let mut state = self.log.0.borrow_mut();
        if state.fail_pushes {
            return Err(ServiceError::Send("broken pipe".to_string()));
        }
        state.mixes.push(prompts.to_vec());
        Ok(())
    }

    fn set_config(&mut self, _config: &GenerationConfig) -> Result<(), ServiceError> {
        self.log.0.borrow_mut().configs += 1;
        Ok(())
    }
}

#[derive(Default)]
struct OutputState {
    time: f64,
    scheduled: Vec<f64>,
    gain_target: f32,
    clears: usize,
}

/// Output with a hand-driven clock
#[derive(Clone, Default)]
pub struct FakeOutput(Rc<RefCell<OutputState>>);

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, secs: f64) {
        self.0.borrow_mut().time = secs;
    }

    pub fn scheduled_starts(&self) -> Vec<f64> {
        self.0.borrow().scheduled.clone()
    }

    pub fn gain_target(&self) -> f32 {
        self.0.borrow().gain_target
    }

    pub fn clears(&self) -> usize {
        self.0.borrow().clears
    }
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        self.0.borrow().time
    }

    fn schedule(&mut self, start: f64, _buffer: AudioBuffer) -> AudioResult<()> {
        self.0.borrow_mut().scheduled.push(start);
        Ok(())
    }

    fn ramp_gain(&mut self, target: f32, _duration: Duration) {
        self.0.borrow_mut().gain_target = target;
    }

    fn clear(&mut self) {
        let mut state = self.0.borrow_mut();
        state.scheduled.clear();
        state.clears += 1;
    }
}

#[derive(Default)]
struct StoreState {
    bindings: HashMap<String, Vec<CcBinding>>,
    prompts: Option<Vec<Prompt>>,
    prompt_saves: usize,
}

/// In-memory prompt and binding store
#[derive(Clone, Default)]
pub struct MemoryStore(Rc<RefCell<StoreState>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings(device: &str, bindings: Vec<CcBinding>) -> Self {
        let store = Self::new();
        store
            .0
            .borrow_mut()
            .bindings
            .insert(device.to_string(), bindings);
        store
    }

    pub fn with_prompts(prompts: Vec<Prompt>) -> Self {
        let store = Self::new();
        store.0.borrow_mut().prompts = Some(prompts);
        store
    }

    pub fn stored_bindings(&self, device: &str) -> Vec<CcBinding> {
        self.load_bindings(device)
    }

    pub fn stored_prompts(&self) -> Option<Vec<Prompt>> {
        self.0.borrow().prompts.clone()
    }

    pub fn prompt_saves(&self) -> usize {
        self.0.borrow().prompt_saves
    }
}

impl BindingStore for MemoryStore {
    fn load_bindings(&self, device: &str) -> Vec<CcBinding> {
        self.0
            .borrow()
            .bindings
            .get(device)
            .cloned()
            .unwrap_or_default()
    }

    fn save_bindings(&self, device: &str, bindings: &[CcBinding]) -> anyhow::Result<()> {
        self.0
            .borrow_mut()
            .bindings
            .insert(device.to_string(), bindings.to_vec());
        Ok(())
    }
}

impl PromptStore for MemoryStore {
    fn bindings(&self) -> &dyn BindingStore {
        self
    }

    fn load_prompts(&self) -> Option<Vec<Prompt>> {
        self.0.borrow().prompts.clone()
    }

    fn save_prompts(&self, prompts: &[Prompt]) -> anyhow::Result<()> {
        let mut state = self.0.borrow_mut();
        state.prompts = Some(
            prompts
                .iter()
                .filter(|p| !p.is_effect_track)
                .cloned()
                .collect(),
        );
        state.prompt_saves += 1;
        Ok(())
    }
}
