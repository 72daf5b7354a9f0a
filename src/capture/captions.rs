//! Live caption stream from an on-device speech recognizer.
//!
//! Optional: when no recognition facility is available the capture
//! session degrades gracefully to draft-only-on-stop behavior. Caption
//! events never feed the transcription upload; the two pipelines are
//! independent and join only at session stop.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// One live-captioning result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionEvent {
    /// Unfinalized result; overwrites the current draft in place for the
    /// ephemeral "typing" feel. May still change.
    Interim(String),
    /// Authoritative replacement of the draft for one recognized
    /// utterance. Replaces, never appends.
    Final(String),
}

impl CaptionEvent {
    /// The caption text regardless of finality.
    pub fn text(&self) -> &str {
        match self {
            Self::Interim(t) | Self::Final(t) => t,
        }
    }
}

/// A live speech-recognition facility.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Begin recognition against the active input, emitting caption
    /// events until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error when recognition cannot start; the capture
    /// session continues without captions.
    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<CaptionEvent>>;
}
