//! buddy — client-side conversational engine for a multi-persona chat app.
//!
//! The engine owns everything between the presentation layer and the
//! remote buddy service: conversation state, streamed reply assembly,
//! voice capture, and history persistence. It renders nothing; the
//! presentation layer drives it through [`SessionController`] and reacts
//! to [`SessionEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! presentation layer
//!        │ commands            ▲ SessionEvent
//!        ▼                     │
//! ┌─────────────────────────────────────┐
//! │          SessionController          │
//! │  identity · persona · messages ·    │
//! │  draft · loading · epoch            │
//! └──┬───────────┬───────────┬──────────┘
//!    │           │           │
//!    ▼           ▼           ▼
//!  ApiClient   HistoryStore  VoiceCaptureCoordinator
//!  (reqwest,   (Remote |     (cpal input + live
//!   reply      Local/        captions, WAV upload
//!   stream)    rusqlite)     for transcription)
//! ```
//!
//! Identity is the load-bearing switch: identified users read history
//! from the remote message collection, guests from per-persona slots in
//! a device-local database. The two never merge; switching identity
//! invalidates all in-memory timelines and reloads through the newly
//! selected store.
//!
//! Streamed replies grow an in-place placeholder message. An epoch
//! counter, bumped on every persona or identity switch, detaches stale
//! stream writes so text can never land in another persona's timeline.

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod session;
pub mod store;
pub mod timeline;

#[cfg(test)]
pub mod test_utils;

pub use api::{ApiClient, PersonaDraft, ReplyEvent};
pub use capture::{StopMode, VoiceCaptureCoordinator};
pub use config::EngineConfig;
pub use error::{BuddyError, Result};
pub use model::{Identity, Message, Persona, Role};
pub use platform::{NullPlatform, PlatformAdapter, VibrationKind};
pub use session::{SessionController, SessionEvent};
pub use store::HistoryStore;
