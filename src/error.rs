//! Error types for the conversation engine.

/// Top-level error type for the buddy engine.
///
/// Every variant is recoverable: failures degrade the relevant in-memory
/// state at the component that produced them, and only the session
/// controller ever turns one into a user-visible notice.
#[derive(Debug, thiserror::Error)]
pub enum BuddyError {
    /// Remote request failed or returned a non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// Streamed reply transport closed or errored mid-reply.
    #[error("stream error: {0}")]
    Stream(String),

    /// Audio input device unavailable or failed.
    #[error("device error: {0}")]
    Device(String),

    /// Transcription upload failed or returned an empty result.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Durable store rejected a read or write.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Operation rejected because another exclusive operation is in
    /// flight (send during send, capture during capture).
    #[error("busy: {0}")]
    Busy(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BuddyError>;
