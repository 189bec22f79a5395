//! Runtime driver
//!
//! Owns the [`LiveController`] and feeds it from one flume channel. Between
//! inputs it sleeps until the controller's next deadline and polls its
//! timers. The controller and its collaborators are not `Send`, so the
//! driver runs on a current-thread tokio runtime.

use crate::audio::{AudioFormat, CpalOutput};
use crate::config::{default_config_path, default_data_dir, LiveConfig};
use crate::controller::{ControllerDeps, LiveController};
use crate::messages::{ControllerInput, Notifier, UiCommand, UiNotice};
use crate::relay::{AudioRelay, HttpAudioRelay};
use crate::session::GenerationService;
use crate::store::YamlStore;
use anyhow::Context;
use flume::{Receiver, Sender};
use promptdj_midi::{list_input_devices, MidiInputHandler};
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Instant;

/// Notices buffered for the UI before new ones are dropped
const NOTICE_QUEUE_SIZE: usize = 256;

/// Channels of an assembled runtime
pub struct RuntimeHandles {
    /// Send UI commands (and `Shutdown`) here
    pub inputs: Sender<ControllerInput>,
    pub notices: Receiver<UiNotice>,
}

pub struct LiveRuntime {
    controller: LiveController,
    inputs: Receiver<ControllerInput>,
    /// Handed to the MIDI callback thread
    inputs_tx: Sender<ControllerInput>,
    notifier: Notifier,
    midi_input: Option<MidiInputHandler>,
    startup_device: Option<String>,
}

impl LiveRuntime {
    pub fn new(
        controller: LiveController,
        inputs: Receiver<ControllerInput>,
        inputs_tx: Sender<ControllerInput>,
        notifier: Notifier,
    ) -> Self {
        Self {
            controller,
            inputs,
            inputs_tx,
            notifier,
            midi_input: None,
            startup_device: None,
        }
    }

    /// Wire a runtime to the output device, the YAML store under `data_dir`
    /// and, when configured, the audio relay
    ///
    /// The MIDI device of the last session is reconnected on start.
    pub fn assemble(
        config: LiveConfig,
        service: Box<dyn GenerationService>,
        data_dir: &Path,
    ) -> anyhow::Result<(Self, RuntimeHandles)> {
        let format = AudioFormat::from_config(&config.audio);
        let output = CpalOutput::open(format, config.audio.output_device.as_deref())
            .context("Failed to open audio output")?;

        let relay: Option<Box<dyn AudioRelay>> = match config.relay.base_url.as_deref() {
            Some(url) => match HttpAudioRelay::start(url, config.relay.queue_frames) {
                Ok(relay) => Some(Box::new(relay)),
                Err(e) => {
                    log::warn!("Relay: Disabled: {}", e);
                    None
                }
            },
            None => None,
        };

        let (inputs_tx, inputs) = flume::unbounded();
        let (notice_tx, notices) = flume::bounded(NOTICE_QUEUE_SIZE);
        let notifier = Notifier::new(notice_tx);
        let startup_device = config.midi.last_device.clone();

        let controller = LiveController::new(
            config,
            ControllerDeps {
                service,
                output: Box::new(output),
                relay,
                store: Box::new(YamlStore::open(data_dir)),
                events_tx: inputs_tx.clone(),
                notifier: notifier.clone(),
            },
        );
        let runtime = Self::new(controller, inputs, inputs_tx.clone(), notifier)
            .with_midi_device(startup_device);
        Ok((
            runtime,
            RuntimeHandles {
                inputs: inputs_tx,
                notices,
            },
        ))
    }

    /// Assemble from the config file and data directory in their default
    /// locations
    pub fn from_default_config(
        service: Box<dyn GenerationService>,
    ) -> anyhow::Result<(Self, RuntimeHandles)> {
        let config = LiveConfig::load(&default_config_path());
        Self::assemble(config, service, &default_data_dir())
    }

    /// Connect this MIDI device before the first input
    pub fn with_midi_device(mut self, device: Option<String>) -> Self {
        self.startup_device = device;
        self
    }

    pub fn controller(&self) -> &LiveController {
        &self.controller
    }

    /// Run on a fresh current-thread runtime until shutdown
    pub fn block_on(self) -> anyhow::Result<LiveController> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(runtime.block_on(self.run()))
    }

    /// Drive the controller until `Shutdown` or until every sender is gone
    pub async fn run(mut self) -> LiveController {
        log::info!("Controller running");

        if let Some(device) = self.startup_device.take() {
            let _ = self.dispatch(UiCommand::SelectMidiDevice(Some(device)).into());
        }

        loop {
            let received = match self.controller.next_deadline() {
                Some(deadline) => {
                    let deadline = tokio::time::Instant::from_std(deadline);
                    tokio::select! {
                        received = self.inputs.recv_async() => Some(received),
                        _ = tokio::time::sleep_until(deadline) => None,
                    }
                }
                None => Some(self.inputs.recv_async().await),
            };

            match received {
                Some(Ok(input)) => {
                    if self.dispatch(input).is_break() {
                        break;
                    }
                }
                Some(Err(_)) => {
                    log::info!("All input senders dropped, shutting down");
                    let _ = self.dispatch(ControllerInput::Shutdown);
                    break;
                }
                None => {}
            }
            self.controller.poll_timers(Instant::now());
        }

        self.midi_input = None;
        log::info!("Controller stopped");
        self.controller
    }

    fn dispatch(&mut self, input: ControllerInput) -> ControlFlow<()> {
        let input = match input {
            ControllerInput::Ui(UiCommand::SelectMidiDevice(device)) => {
                UiCommand::SelectMidiDevice(self.connect_midi(device)).into()
            }
            other => other,
        };
        self.controller.handle(input, Instant::now())
    }

    /// Swap the MIDI connection; returns the connected port name
    fn connect_midi(&mut self, device: Option<String>) -> Option<String> {
        // Close the old port first so a reconnect to the same device works
        self.midi_input = None;
        let port_match = device?;

        match MidiInputHandler::connect(&port_match, self.inputs_tx.clone()) {
            Ok(handler) => {
                let port = handler.port_name().to_string();
                self.midi_input = Some(handler);
                Some(port)
            }
            Err(e) => {
                log::warn!("MIDI: Could not connect to '{}': {}", port_match, e);
                if let Ok(devices) = list_input_devices() {
                    let names: Vec<_> = devices.iter().map(|d| d.name.as_str()).collect();
                    log::info!("MIDI: Available inputs: {:?}", names);
                }
                self.notifier
                    .error(format!("MIDI device '{}' unavailable: {}", port_match, e));
                None
            }
        }
    }
}

/// Run `controller` until shutdown on a current-thread runtime
pub fn run_controller(
    controller: LiveController,
    inputs: Receiver<ControllerInput>,
    inputs_tx: Sender<ControllerInput>,
    notifier: Notifier,
) -> anyhow::Result<LiveController> {
    LiveRuntime::new(controller, inputs, inputs_tx, notifier).block_on()
}
