//! Voice capture coordination.
//!
//! One capture session runs two independent consumers against the same
//! input: a sample accumulator (finalized and uploaded for server-side
//! transcription at stop) and, when available, a live caption stream
//! (ephemeral draft text while speaking). Either consumer can fail or be
//! absent without blocking the other; they are independently cancellable
//! and join only at session stop.
//!
//! States: `idle → recording → (stopped_for_edit | stopped_for_send) → idle`.
//! The coordinator is single-flight by construction: starting while a
//! session is live is rejected.

pub mod audio;
pub mod captions;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{BuddyError, Result};

pub use audio::{AudioInput, AudioStreamHandle, CpalInput, encode_wav};
pub use captions::{CaptionEvent, CaptionSource};

/// How a recording session was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Plain stop: the transcription replaces the input draft.
    Edit,
    /// Stop-and-send: the transcription goes straight to the send path.
    Send,
}

/// Finalized output of a capture session, ready for upload.
#[derive(Debug)]
pub struct CapturedAudio {
    pub mode: StopMode,
    /// In-memory WAV encoding of the accumulated samples.
    pub wav: Vec<u8>,
    pub duration_secs: f32,
}

/// A live recording session.
struct CaptureSession {
    id: Uuid,
    cancel: CancellationToken,
    samples: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    audio_task: JoinHandle<()>,
    caption_task: Option<JoinHandle<()>>,
}

/// Coordinates the audio-recording and live-captioning consumers of one
/// capture session.
pub struct VoiceCaptureCoordinator {
    audio: Arc<dyn AudioInput>,
    captions: Option<Arc<dyn CaptionSource>>,
    active: Option<CaptureSession>,
}

impl VoiceCaptureCoordinator {
    /// Create a coordinator. `captions` is optional; without it sessions
    /// run draft-only-on-stop.
    pub fn new(audio: Arc<dyn AudioInput>, captions: Option<Arc<dyn CaptionSource>>) -> Self {
        Self {
            audio,
            captions,
            active: None,
        }
    }

    /// Whether a session is currently recording.
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Start a capture session. Caption events are forwarded on
    /// `caption_tx` as they arrive.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Device`] if a session is already live or the
    /// input device cannot be acquired; state stays idle on failure.
    pub async fn start(&mut self, caption_tx: mpsc::UnboundedSender<CaptionEvent>) -> Result<()> {
        if self.active.is_some() {
            return Err(BuddyError::Device("capture session already active".into()));
        }

        let cancel = CancellationToken::new();
        let handle = self.audio.start(cancel.child_token()).await?;
        let sample_rate = handle.sample_rate;

        let samples = Arc::new(Mutex::new(Vec::new()));
        let audio_task = tokio::spawn(accumulate(handle.chunks, Arc::clone(&samples)));

        // Captions are best-effort; a recognition failure never blocks
        // the recording consumer.
        let caption_task = match &self.captions {
            Some(source) => match source.start(cancel.child_token()).await {
                Ok(mut rx) => Some(tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if caption_tx.send(event).is_err() {
                            break;
                        }
                    }
                })),
                Err(e) => {
                    warn!("live captions unavailable, recording continues: {e}");
                    None
                }
            },
            None => None,
        };

        let id = Uuid::new_v4();
        info!("capture session {id} started at {sample_rate}Hz");
        self.active = Some(CaptureSession {
            id,
            cancel,
            samples,
            sample_rate,
            audio_task,
            caption_task,
        });
        Ok(())
    }

    /// Stop the live session, finalizing the accumulated audio.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Device`] if no session is live or nothing
    /// was captured.
    pub async fn stop(&mut self, mode: StopMode) -> Result<CapturedAudio> {
        let session = self
            .active
            .take()
            .ok_or_else(|| BuddyError::Device("no active capture session".into()))?;

        session.cancel.cancel();
        let _ = session.audio_task.await;
        if let Some(task) = session.caption_task {
            let _ = task.await;
        }

        let samples = session
            .samples
            .lock()
            .map_err(|_| BuddyError::Device("capture buffer lock poisoned".into()))?
            .clone();

        if samples.is_empty() {
            return Err(BuddyError::Device("no audio captured".into()));
        }

        let duration_secs = samples.len() as f32 / session.sample_rate as f32;
        info!(
            "capture session {} stopped: {duration_secs:.1}s of audio",
            session.id
        );

        let wav = encode_wav(&samples, session.sample_rate)?;
        Ok(CapturedAudio {
            mode,
            wav,
            duration_secs,
        })
    }
}

/// Drain capture chunks into the session's sample buffer.
async fn accumulate(mut chunks: mpsc::Receiver<Vec<f32>>, samples: Arc<Mutex<Vec<f32>>>) {
    while let Some(chunk) = chunks.recv().await {
        if let Ok(mut buf) = samples.lock() {
            buf.extend_from_slice(&chunk);
        }
    }
}
