//! Audio relay sink
//!
//! Forwards every received audio frame to a casting endpoint. Upload
//! failures are logged and counted; they never affect the session.

use flume::{Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// HTTP timeout per relay request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Relay queue full, frame dropped")]
    QueueFull,

    #[error("Relay worker stopped")]
    WorkerGone,

    #[error("Failed to start relay worker: {0}")]
    Spawn(String),
}

pub trait AudioRelay {
    /// Queue one raw frame for upload
    fn upload(&mut self, frame: &[u8]) -> Result<(), RelayError>;

    /// Tell the sink the stream restarted
    fn reset(&mut self) -> Result<(), RelayError>;
}

enum RelayJob {
    Upload(Vec<u8>),
    Reset,
}

/// Relay posting frames to `{base}/audio` and resets to `{base}/reset`
///
/// Requests run on a dedicated thread fed by a bounded queue.
pub struct HttpAudioRelay {
    tx: Sender<RelayJob>,
    failed: Arc<AtomicU64>,
}

impl HttpAudioRelay {
    pub fn start(base_url: &str, queue_frames: usize) -> Result<Self, RelayError> {
        let base = base_url.trim_end_matches('/').to_string();
        let (tx, rx) = flume::bounded::<RelayJob>(queue_frames.max(1));
        let failed = Arc::new(AtomicU64::new(0));
        let worker_failed = Arc::clone(&failed);

        thread::Builder::new()
            .name("audio-relay".to_string())
            .spawn(move || {
                let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
                log::info!("Relay: Forwarding audio to {}", base);

                for job in rx.iter() {
                    let result = match job {
                        RelayJob::Upload(frame) => agent
                            .post(&format!("{}/audio", base))
                            .set("Content-Type", "application/octet-stream")
                            .send_bytes(&frame),
                        RelayJob::Reset => agent.post(&format!("{}/reset", base)).call(),
                    };
                    if let Err(e) = result {
                        let count = worker_failed.fetch_add(1, Ordering::Relaxed) + 1;
                        // First failure loud, the rest quiet
                        if count == 1 {
                            log::warn!("Relay: Request failed: {}", e);
                        } else {
                            log::debug!("Relay: Request failed ({} total): {}", count, e);
                        }
                    }
                }
                log::debug!("Relay: Worker stopped");
            })
            .map_err(|e| RelayError::Spawn(e.to_string()))?;

        Ok(Self { tx, failed })
    }

    /// Requests that failed so far
    pub fn failed_uploads(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn enqueue(&self, job: RelayJob) -> Result<(), RelayError> {
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::QueueFull,
            TrySendError::Disconnected(_) => RelayError::WorkerGone,
        })
    }
}

impl AudioRelay for HttpAudioRelay {
    fn upload(&mut self, frame: &[u8]) -> Result<(), RelayError> {
        self.enqueue(RelayJob::Upload(frame.to_vec()))
    }

    fn reset(&mut self) -> Result<(), RelayError> {
        self.enqueue(RelayJob::Reset)
    }
}
