//! Shared test doubles used across unit test modules.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capture::audio::{AudioInput, AudioStreamHandle};
use crate::capture::captions::{CaptionEvent, CaptionSource};
use crate::error::{BuddyError, Result};

/// Audio input that plays back a fixed chunk script, then idles until
/// cancelled.
pub struct ScriptedAudioInput {
    sample_rate: u32,
    chunks: Vec<Vec<f32>>,
}

impl ScriptedAudioInput {
    pub fn new(sample_rate: u32, chunks: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            chunks,
        }
    }
}

#[async_trait]
impl AudioInput for ScriptedAudioInput {
    async fn start(&self, cancel: CancellationToken) -> Result<AudioStreamHandle> {
        let (tx, rx) = mpsc::channel(64);
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            // Keep the channel open like a live device until cancelled.
            cancel.cancelled().await;
        });
        Ok(AudioStreamHandle {
            sample_rate: self.sample_rate,
            chunks: rx,
        })
    }
}

/// Audio input whose device acquisition always fails.
pub struct FailingAudioInput;

#[async_trait]
impl AudioInput for FailingAudioInput {
    async fn start(&self, _cancel: CancellationToken) -> Result<AudioStreamHandle> {
        Err(BuddyError::Device("no input device (scripted)".into()))
    }
}

/// Caption source that emits a fixed event script.
pub struct ScriptedCaptions {
    events: Vec<CaptionEvent>,
    fail: bool,
}

impl ScriptedCaptions {
    pub fn new(events: Vec<CaptionEvent>) -> Self {
        Self {
            events,
            fail: false,
        }
    }

    /// A source that fails to start, for degradation tests.
    pub fn failing() -> Self {
        Self {
            events: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl CaptionSource for ScriptedCaptions {
    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<CaptionEvent>> {
        if self.fail {
            return Err(BuddyError::Device("speech recognition unavailable".into()));
        }
        let (tx, rx) = mpsc::channel(16);
        let events = self.events.clone();
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            cancel.cancelled().await;
        });
        Ok(rx)
    }
}
