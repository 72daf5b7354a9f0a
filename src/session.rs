//! Session controller: the single owner of conversation state.
//!
//! Owns the active persona, the caller identity, the message list, and
//! all in-flight/loading flags, and is the only component that mutates
//! them. The store adapter, reply assembler, and capture coordinator are
//! wired together here; every failure they produce is degraded into state
//! and, where user-relevant, surfaced as a [`SessionEvent::Notice`].
//!
//! Concurrency model: state lives behind a mutex with short critical
//! sections; reply consumption runs on a spawned task whose writes are
//! keyed to the (epoch, persona) captured at send time. Switching the
//! persona or identity bumps the epoch, which detaches any in-flight
//! stream from the now-stale placeholder — streamed text can never land
//! in another persona's timeline.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ReplyEvent};
use crate::capture::{CaptionEvent, StopMode, VoiceCaptureCoordinator};
use crate::capture::audio::AudioInput;
use crate::capture::captions::CaptionSource;
use crate::config::{ChatConfig, EngineConfig};
use crate::error::{BuddyError, Result};
use crate::model::{Identity, Message, Persona};
use crate::platform::{PlatformAdapter, VibrationKind};
use crate::store::{HistoryStore, LocalHistory};
use crate::timeline::{TimelineEntry, annotate_days};

/// Events for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A persona became active and its history load began.
    PersonaOpened { persona_id: i64 },
    /// The message list changed; re-read via [`SessionController::messages`].
    MessagesChanged,
    /// The input draft changed (live captions, transcription, send).
    DraftChanged(String),
    /// The send-in-flight flag flipped.
    LoadingChanged(bool),
    /// A user-visible failure notice.
    Notice(String),
    /// The identity changed and timelines were invalidated.
    IdentityChanged,
    /// A voice capture session started.
    CaptureStarted,
    /// The voice capture session ended.
    CaptureStopped,
}

/// Shared conversation state. All mutation happens under the mutex.
struct SessionState {
    identity: Identity,
    persona: Option<Persona>,
    messages: Vec<Message>,
    /// True from send initiation (or history fetch start) until the reply
    /// resolves or fails; gates the send path.
    loading: bool,
    draft: String,
    /// Bumped on persona/identity switches to detach stale stream writes.
    epoch: u64,
}

/// Context a spawned reply task needs to write back safely.
#[derive(Clone)]
struct SendContext {
    epoch: u64,
    persona_id: i64,
    identity: Identity,
}

/// The conversational engine's orchestrator.
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    api: Arc<ApiClient>,
    local: Arc<LocalHistory>,
    store: Arc<HistoryStore>,
    capture: VoiceCaptureCoordinator,
    caption_pump: Option<JoinHandle<()>>,
    platform: Arc<dyn PlatformAdapter>,
    chat: ChatConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionController {
    /// Create a controller and the event stream for the presentation
    /// layer. The initial identity comes from the platform's hint when
    /// present, otherwise Guest.
    pub fn new(
        config: &EngineConfig,
        platform: Arc<dyn PlatformAdapter>,
        audio: Arc<dyn AudioInput>,
        captions: Option<Arc<dyn CaptionSource>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let api = Arc::new(ApiClient::new(&config.api));
        let local = Arc::new(LocalHistory::open(&config.storage.effective_data_dir())?);

        let identity = match platform.identity_hint() {
            Some(id) => Identity::Identified(id),
            None => Identity::Guest,
        };
        info!(
            "session starting as {}",
            if identity.is_identified() { "identified user" } else { "guest" }
        );

        let store = Arc::new(HistoryStore::select(
            &identity,
            Arc::clone(&api),
            Arc::clone(&local),
        ));

        let (events, event_rx) = mpsc::unbounded_channel();
        let controller = Self {
            state: Arc::new(Mutex::new(SessionState {
                identity,
                persona: None,
                messages: Vec::new(),
                loading: false,
                draft: String::new(),
                epoch: 0,
            })),
            api,
            local,
            store,
            capture: VoiceCaptureCoordinator::new(audio, captions),
            caption_pump: None,
            platform,
            chat: config.chat.clone(),
            events,
        };
        Ok((controller, event_rx))
    }

    // ── Snapshots ─────────────────────────────────────────────

    /// Current identity.
    pub fn identity(&self) -> Identity {
        self.lock().identity.clone()
    }

    /// Snapshot of the active persona's messages.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Day-annotated snapshot of the active timeline.
    pub fn timeline(&self) -> Vec<(Message, bool)> {
        let state = self.lock();
        annotate_days(&state.messages)
            .into_iter()
            .map(|TimelineEntry { message, starts_new_day }| (message.clone(), starts_new_day))
            .collect()
    }

    /// Current input draft.
    pub fn draft(&self) -> String {
        self.lock().draft.clone()
    }

    /// Whether a send or history fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    /// Whether a voice capture session is live.
    pub fn is_capturing(&self) -> bool {
        self.capture.is_recording()
    }

    /// Replace the input draft (typed edits from the presentation layer).
    pub fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        self.lock().draft = text.clone();
        self.emit(SessionEvent::DraftChanged(text));
    }

    // ── Identity & persona ────────────────────────────────────

    /// Switch identity. Invalidates every in-memory timeline, reselects
    /// the store variant, and reloads the active persona through it —
    /// never a merge of the two backends.
    pub async fn set_identity(&mut self, identity: Identity) {
        let reload = {
            let mut state = self.lock();
            if state.identity == identity {
                return;
            }
            state.identity = identity.clone();
            state.epoch += 1;
            state.messages.clear();
            state.loading = false;
            state.persona.clone()
        };

        self.store = Arc::new(HistoryStore::select(
            &identity,
            Arc::clone(&self.api),
            Arc::clone(&self.local),
        ));
        self.emit(SessionEvent::IdentityChanged);
        self.emit(SessionEvent::MessagesChanged);

        if let Some(persona) = reload {
            self.open_persona(persona).await;
        }
    }

    /// Make a persona active and load its history. The send path stays
    /// disabled until the load completes or is superseded by another
    /// switch.
    pub async fn open_persona(&mut self, persona: Persona) {
        self.platform.set_chrome_color(&persona.accent);

        let (epoch, persona_id, identity) = {
            let mut state = self.lock();
            state.epoch += 1;
            state.persona = Some(persona.clone());
            state.messages.clear();
            state.loading = true;
            (state.epoch, persona.id, state.identity.clone())
        };
        self.emit(SessionEvent::PersonaOpened { persona_id });
        self.emit(SessionEvent::MessagesChanged);
        self.emit(SessionEvent::LoadingChanged(true));

        // Remote load failures degrade to an empty timeline; they never
        // fall back to the local variant.
        let loaded = match self.store.load(persona_id, &identity).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("history load for persona {persona_id} failed: {e}");
                Vec::new()
            }
        };

        {
            let mut state = self.lock();
            if state.epoch != epoch {
                debug!("history load for persona {persona_id} superseded");
                return;
            }
            state.messages = loaded;
            state.loading = false;
        }
        self.emit(SessionEvent::MessagesChanged);
        self.emit(SessionEvent::LoadingChanged(false));
    }

    /// List persona records for the current identity.
    pub async fn list_personas(&self) -> Result<Vec<Persona>> {
        let identity = self.identity();
        self.api.list_personas(&identity).await
    }

    /// Delete a persona by id. If it was active, the conversation closes.
    pub async fn delete_persona(&self, id: i64) -> Result<()> {
        let identity = self.identity();
        self.api.delete_persona(id, &identity).await?;

        let was_active = {
            let mut state = self.lock();
            let active = state.persona.as_ref().is_some_and(|p| p.id == id);
            if active {
                state.epoch += 1;
                state.persona = None;
                state.messages.clear();
                state.loading = false;
            }
            active
        };
        if was_active {
            self.emit(SessionEvent::MessagesChanged);
        }
        Ok(())
    }

    // ── Sending ───────────────────────────────────────────────

    /// Send a user message to the active persona.
    ///
    /// Rejected while a send or history fetch is in flight, or while a
    /// capture session is live (voice input reaches this path only via
    /// the stop-and-send transition).
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Busy`] on rejection and
    /// [`BuddyError::Config`] when no persona is active.
    pub fn send_text(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if self.capture.is_recording() {
            return Err(BuddyError::Busy("voice capture is active".into()));
        }

        let (ctx, accent, history) = {
            let mut state = self.lock();
            let persona = state
                .persona
                .as_ref()
                .ok_or_else(|| BuddyError::Config("no active persona".into()))?;
            if state.loading {
                return Err(BuddyError::Busy("a reply is already in flight".into()));
            }

            let persona_id = persona.id;
            let accent = Some(persona.accent.clone());
            state.messages.push(Message::user(text));
            // History for the request excludes the placeholder about to
            // be pushed (streaming messages are filtered at the wire).
            let history = state.messages.clone();
            state
                .messages
                .push(Message::streaming_placeholder(accent.clone()));
            state.loading = true;

            (
                SendContext {
                    epoch: state.epoch,
                    persona_id,
                    identity: state.identity.clone(),
                },
                accent,
                history,
            )
        };

        self.emit(SessionEvent::MessagesChanged);
        self.emit(SessionEvent::LoadingChanged(true));
        self.platform.vibrate(VibrationKind::Light);

        self.spawn_reply_task(ctx, accent, history);
        Ok(())
    }

    /// Spawn the reply exchange for a prepared send.
    fn spawn_reply_task(&self, ctx: SendContext, accent: Option<String>, history: Vec<Message>) {
        let state = Arc::clone(&self.state);
        let store = Arc::clone(&self.store);
        let api = Arc::clone(&self.api);
        let platform = Arc::clone(&self.platform);
        let events = self.events.clone();
        let chat = self.chat.clone();

        tokio::spawn(async move {
            // Guest timelines are mirrored after each user message.
            if let Err(e) = store.append(ctx.persona_id, &history).await {
                warn!("history append after user send failed: {e}");
            }

            let outcome = if chat.streaming {
                run_streamed_reply(&api, &chat, &ctx, &history, &state, &events).await
            } else {
                run_complete_reply(&api, &chat, &ctx, &history, accent, &state).await
            };

            match outcome {
                ReplyOutcome::Completed => {
                    let timeline = {
                        let Ok(guard) = state.lock() else { return };
                        guard.messages.clone()
                    };
                    emit_to(&events, SessionEvent::MessagesChanged);
                    emit_to(&events, SessionEvent::LoadingChanged(false));
                    platform.vibrate(VibrationKind::Notify);
                    if let Err(e) = store.append(ctx.persona_id, &timeline).await {
                        warn!("history append after reply failed: {e}");
                    }
                }
                ReplyOutcome::Failed(notice) => {
                    emit_to(&events, SessionEvent::MessagesChanged);
                    emit_to(&events, SessionEvent::LoadingChanged(false));
                    emit_to(&events, SessionEvent::Notice(notice));
                    platform.vibrate(VibrationKind::Error);
                }
                ReplyOutcome::Detached => {
                    debug!("reply for persona {} detached mid-stream", ctx.persona_id);
                }
            }
        });
    }

    // ── History clearing ──────────────────────────────────────

    /// Clear the active persona's stored history. On success the
    /// in-memory timeline empties; on failure it is left untouched and a
    /// notice is raised.
    pub async fn clear_history(&self) {
        let Some((persona_id, identity)) = ({
            let state = self.lock();
            state
                .persona
                .as_ref()
                .map(|p| (p.id, state.identity.clone()))
        }) else {
            return;
        };

        match self.store.clear(persona_id, &identity).await {
            Ok(()) => {
                self.lock().messages.clear();
                self.emit(SessionEvent::MessagesChanged);
                info!("history cleared for persona {persona_id}");
            }
            Err(e) => {
                warn!("history clear for persona {persona_id} failed: {e}");
                self.emit(SessionEvent::Notice("Couldn't clear the chat.".into()));
                self.platform.vibrate(VibrationKind::Error);
            }
        }
    }

    // ── Voice capture ─────────────────────────────────────────

    /// Start a voice capture session. Live captions (when available)
    /// overwrite the draft in place while speaking.
    pub async fn start_capture(&mut self) -> Result<()> {
        let (caption_tx, mut caption_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.capture.start(caption_tx).await {
            warn!("capture start failed: {e}");
            self.emit(SessionEvent::Notice("Microphone unavailable.".into()));
            return Err(e);
        }

        // Interim results overwrite the draft in place; a final result is
        // the authoritative replacement for the utterance. Both replace.
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        self.caption_pump = Some(tokio::spawn(async move {
            while let Some(event) = caption_rx.recv().await {
                let text = match event {
                    CaptionEvent::Interim(t) | CaptionEvent::Final(t) => t,
                };
                if let Ok(mut guard) = state.lock() {
                    guard.draft = text.clone();
                }
                emit_to(&events, SessionEvent::DraftChanged(text));
            }
        }));

        self.emit(SessionEvent::CaptureStarted);
        Ok(())
    }

    /// Stop the capture session.
    ///
    /// The finalized audio is uploaded for transcription; the returned
    /// text *replaces* the draft (`StopMode::Edit`) or goes straight to
    /// the send path (`StopMode::Send`). It never merges with live
    /// caption text. A transcription failure surfaces a notice and, for
    /// stop-and-send, aborts the send silently.
    pub async fn stop_capture(&mut self, mode: StopMode) -> Result<()> {
        let captured = match self.capture.stop(mode).await {
            Ok(captured) => captured,
            Err(e) => {
                warn!("capture stop failed: {e}");
                self.finish_caption_pump();
                self.emit(SessionEvent::CaptureStopped);
                self.emit(SessionEvent::Notice("Nothing was recorded.".into()));
                return Err(e);
            }
        };
        self.finish_caption_pump();
        self.emit(SessionEvent::CaptureStopped);

        match self.api.transcribe(captured.wav).await {
            Ok(text) => match mode {
                StopMode::Edit => {
                    self.lock().draft = text.clone();
                    self.emit(SessionEvent::DraftChanged(text));
                    Ok(())
                }
                StopMode::Send => {
                    // The draft (live captions) is discarded; only the
                    // transcription result is sent.
                    self.lock().draft.clear();
                    self.emit(SessionEvent::DraftChanged(String::new()));
                    self.send_text(&text)
                }
            },
            Err(e) => {
                warn!("transcription failed: {e}");
                self.emit(SessionEvent::Notice("Couldn't transcribe that.".into()));
                self.platform.vibrate(VibrationKind::Error);
                Err(e)
            }
        }
    }

    fn finish_caption_pump(&mut self) {
        // The pump ends on its own once the capture forwarder drops the
        // sender; just detach the handle.
        self.caption_pump.take();
    }

    // ── Internals ─────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Critical sections never hold the lock across a suspension
        // point, so a poisoned lock only means a writer panicked mid
        // update; recover the guard and keep the session usable.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        emit_to(&self.events, event);
    }
}

fn emit_to(events: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
    // A dropped receiver means the presentation layer is gone; the engine
    // keeps running (e.g. to finish persisting a reply).
    let _ = events.send(event);
}

/// Terminal result of a reply exchange.
enum ReplyOutcome {
    Completed,
    Failed(String),
    Detached,
}

/// Apply one full-accumulator snapshot to the in-flight placeholder.
///
/// Returns false when the write is stale (epoch moved on or the
/// placeholder is gone) and the stream must detach.
fn apply_snapshot(
    state: &Arc<Mutex<SessionState>>,
    ctx: &SendContext,
    text: String,
    finalize: bool,
) -> bool {
    let Ok(mut guard) = state.lock() else {
        return false;
    };
    if guard.epoch != ctx.epoch {
        return false;
    }
    let Some(placeholder) = guard.messages.iter_mut().rev().find(|m| m.streaming) else {
        return false;
    };
    placeholder.set_text(text);
    if finalize {
        placeholder.streaming = false;
        guard.loading = false;
    }
    true
}

/// Replace the placeholder with the fixed failure text and clear loading.
fn apply_failure(state: &Arc<Mutex<SessionState>>, ctx: &SendContext, failure_reply: &str) -> bool {
    let applied = apply_snapshot(state, ctx, failure_reply.to_owned(), true);
    if !applied {
        // Still clear loading if the epoch matches but the placeholder
        // vanished (e.g. a concurrent clear).
        if let Ok(mut guard) = state.lock() {
            if guard.epoch == ctx.epoch {
                guard.loading = false;
            }
        }
    }
    applied
}

/// Drive the streamed reply to completion.
async fn run_streamed_reply(
    api: &ApiClient,
    chat: &ChatConfig,
    ctx: &SendContext,
    history: &[Message],
    state: &Arc<Mutex<SessionState>>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> ReplyOutcome {
    match api.stream_reply(history, ctx.persona_id, &ctx.identity).await {
        Ok(rx) => consume_reply(rx, chat, ctx, state, events).await,
        Err(e) => fail_reply(state, ctx, chat, &e),
    }
}

/// Apply reply events to the in-flight placeholder until a terminal
/// event arrives or the write detaches.
async fn consume_reply(
    mut rx: mpsc::Receiver<ReplyEvent>,
    chat: &ChatConfig,
    ctx: &SendContext,
    state: &Arc<Mutex<SessionState>>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> ReplyOutcome {
    let mut last_snapshot = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            ReplyEvent::Snapshot(text) => {
                last_snapshot = text.clone();
                if !apply_snapshot(state, ctx, text, false) {
                    return ReplyOutcome::Detached;
                }
                emit_to(events, SessionEvent::MessagesChanged);
            }
            ReplyEvent::Done { text } => {
                // An empty reply is a valid, persisted empty message.
                if !apply_snapshot(state, ctx, text, true) {
                    return ReplyOutcome::Detached;
                }
                return ReplyOutcome::Completed;
            }
            ReplyEvent::Failed(detail) => {
                return fail_reply(state, ctx, chat, &BuddyError::Stream(detail));
            }
        }
    }

    // Channel closed without a terminal event: keep what arrived and
    // finalize as a clean close.
    if apply_snapshot(state, ctx, last_snapshot, true) {
        ReplyOutcome::Completed
    } else {
        ReplyOutcome::Detached
    }
}

/// Replace the placeholder with the fixed failure reply.
fn fail_reply(
    state: &Arc<Mutex<SessionState>>,
    ctx: &SendContext,
    chat: &ChatConfig,
    err: &BuddyError,
) -> ReplyOutcome {
    warn!("reply for persona {} failed: {err}", ctx.persona_id);
    if apply_failure(state, ctx, &chat.failure_reply) {
        ReplyOutcome::Failed("The reply didn't make it through.".to_owned())
    } else {
        ReplyOutcome::Detached
    }
}

/// Drive the non-streaming reply exchange, honoring the minimum typing
/// delay for pacing.
async fn run_complete_reply(
    api: &ApiClient,
    chat: &ChatConfig,
    ctx: &SendContext,
    history: &[Message],
    accent: Option<String>,
    state: &Arc<Mutex<SessionState>>,
) -> ReplyOutcome {
    let started = std::time::Instant::now();
    let result = api.complete(history, ctx.persona_id, &ctx.identity).await;

    let min_delay = Duration::from_millis(chat.min_typing_delay_ms);
    if let Some(remaining) = min_delay.checked_sub(started.elapsed()) {
        tokio::time::sleep(remaining).await;
    }

    match result {
        Ok(reply) => {
            let applied = {
                let Ok(mut guard) = state.lock() else {
                    return ReplyOutcome::Detached;
                };
                if guard.epoch != ctx.epoch {
                    false
                } else if let Some(placeholder) =
                    guard.messages.iter_mut().rev().find(|m| m.streaming)
                {
                    placeholder.set_text(reply.text);
                    placeholder.accent = reply.accent_hint.or(accent);
                    placeholder.streaming = false;
                    guard.loading = false;
                    true
                } else {
                    false
                }
            };
            if applied {
                ReplyOutcome::Completed
            } else {
                ReplyOutcome::Detached
            }
        }
        Err(e) => fail_reply(state, ctx, chat, &e),
    }
}
