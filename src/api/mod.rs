//! HTTP client for the buddy remote service.
//!
//! Covers the full service surface: persona records, stored message
//! history, the chat reply endpoints (streamed and not), and the audio
//! transcription upload. All calls are async and non-blocking; per-request
//! timeouts apply everywhere except the reply stream, which lives until
//! the transport ends.

pub mod stream;

use crate::config::ApiConfig;
use crate::error::{BuddyError, Result};
use crate::model::{Avatar, Identity, Message, Persona, Role};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use stream::{ReplyEvent, ReplyLineParser, ReplyRecord};

/// Buffer size for the reply event channel.
const REPLY_CHANNEL_SIZE: usize = 32;

/// Client for the buddy remote service.
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

/// Reply from the non-streaming `/chat` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub text: String,
    /// Accent color hint for the assistant bubble.
    #[serde(default)]
    pub accent_hint: Option<String>,
}

/// Draft forwarded to the persona authoring endpoint. Validation happens
/// server-side; this engine only carries the fields through.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaDraft {
    pub name: String,
    pub avatar: Avatar,
    pub accent: String,
    /// Behavior prompt, authored externally.
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Wire shape of one history entry sent to the chat endpoints.
#[derive(Debug, Serialize)]
struct WireHistoryMessage<'a> {
    role: &'static str,
    parts: Vec<&'a str>,
}

/// Request body for `/chat` and `/chat/stream`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    history: Vec<WireHistoryMessage<'a>>,
    personality_id: i64,
    user_id: Option<&'a str>,
}

/// Wire shape of one stored message from `GET /messages`.
#[derive(Debug, Deserialize)]
struct StoredMessage {
    role: String,
    #[serde(default)]
    parts: Vec<String>,
    #[serde(default, alias = "visual_hint")]
    accent: Option<String>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TranscribeReply {
    #[serde(default)]
    text: String,
}

impl ApiClient {
    /// Create a client for the configured service.
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            timeout: config.request_timeout(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn identity_query(identity: &Identity) -> Vec<(&'static str, String)> {
        match identity.user_id() {
            Some(id) => vec![("user_id", id.to_owned())],
            None => Vec::new(),
        }
    }

    /// Build the chat request body from the history so far.
    ///
    /// Only the first text segment of each message is sent, and in-flight
    /// (streaming) messages are excluded.
    fn chat_request<'a>(
        history: &'a [Message],
        persona_id: i64,
        identity: &'a Identity,
    ) -> ChatRequest<'a> {
        let history = history
            .iter()
            .filter(|m| !m.streaming)
            .map(|m| WireHistoryMessage {
                role: m.role.wire_name(),
                parts: vec![m.text()],
            })
            .collect();
        ChatRequest {
            history,
            personality_id: persona_id,
            user_id: identity.user_id(),
        }
    }

    // ── Personas ──────────────────────────────────────────────

    /// List persona records visible to this identity.
    pub async fn list_personas(&self, identity: &Identity) -> Result<Vec<Persona>> {
        let response = self
            .client
            .get(self.url("personalities"))
            .query(&Self::identity_query(identity))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BuddyError::Network(format!("persona list failed: {e}")))?;
        Self::check_status(&response, "persona list")?;
        response
            .json()
            .await
            .map_err(|e| BuddyError::Network(format!("persona list decode failed: {e}")))
    }

    /// Forward a persona draft to the authoring endpoint.
    pub async fn create_persona(&self, draft: &PersonaDraft) -> Result<Persona> {
        let response = self
            .client
            .post(self.url("personalities"))
            .json(draft)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BuddyError::Network(format!("persona create failed: {e}")))?;
        Self::check_status(&response, "persona create")?;
        response
            .json()
            .await
            .map_err(|e| BuddyError::Network(format!("persona create decode failed: {e}")))
    }

    /// Delete a persona by id.
    pub async fn delete_persona(&self, id: i64, identity: &Identity) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("personalities/{id}")))
            .query(&Self::identity_query(identity))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BuddyError::Network(format!("persona delete failed: {e}")))?;
        Self::check_status(&response, "persona delete")
    }

    // ── Stored messages ───────────────────────────────────────

    /// Fetch the stored message history for a persona, mapping the
    /// server's role vocabulary (`model`) into [`Role::Assistant`].
    pub async fn fetch_messages(
        &self,
        persona_id: i64,
        identity: &Identity,
    ) -> Result<Vec<Message>> {
        let mut query = vec![("personality_id", persona_id.to_string())];
        query.extend(Self::identity_query(identity));

        let response = self
            .client
            .get(self.url("messages"))
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BuddyError::Network(format!("message fetch failed: {e}")))?;
        Self::check_status(&response, "message fetch")?;

        let stored: Vec<StoredMessage> = response
            .json()
            .await
            .map_err(|e| BuddyError::Network(format!("message fetch decode failed: {e}")))?;

        debug!("fetched {} stored messages for persona {persona_id}", stored.len());
        Ok(stored
            .into_iter()
            .map(|m| Message {
                role: Role::from_wire(&m.role),
                parts: if m.parts.is_empty() {
                    vec![String::new()]
                } else {
                    m.parts
                },
                accent: m.accent,
                created_at: m.timestamp,
                streaming: false,
            })
            .collect())
    }

    /// Bulk-clear the stored history for a persona.
    pub async fn clear_messages(&self, persona_id: i64, identity: &Identity) -> Result<()> {
        let mut query = vec![("personality_id", persona_id.to_string())];
        query.extend(Self::identity_query(identity));

        let response = self
            .client
            .delete(self.url("messages"))
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BuddyError::Network(format!("message clear failed: {e}")))?;
        Self::check_status(&response, "message clear")
    }

    // ── Chat ──────────────────────────────────────────────────

    /// Request a complete (non-streamed) reply.
    pub async fn complete(
        &self,
        history: &[Message],
        persona_id: i64,
        identity: &Identity,
    ) -> Result<ChatReply> {
        let body = Self::chat_request(history, persona_id, identity);
        let response = self
            .client
            .post(self.url("chat"))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BuddyError::Network(format!("chat request failed: {e}")))?;
        Self::check_status(&response, "chat")?;
        response
            .json()
            .await
            .map_err(|e| BuddyError::Network(format!("chat decode failed: {e}")))
    }

    /// Request a streamed reply.
    ///
    /// Returns a receiver of [`ReplyEvent`]s: one `Snapshot` per payload
    /// record (carrying the full accumulator), then exactly one terminal
    /// `Done` or `Failed`. Events preserve record arrival order.
    pub async fn stream_reply(
        &self,
        history: &[Message],
        persona_id: i64,
        identity: &Identity,
    ) -> Result<mpsc::Receiver<ReplyEvent>> {
        let body = Self::chat_request(history, persona_id, identity);
        let response = self
            .client
            .post(self.url("chat/stream"))
            .json(&body)
            .send()
            .await
            .map_err(|e| BuddyError::Network(format!("stream request failed: {e}")))?;
        Self::check_status(&response, "chat stream")?;

        let (tx, rx) = mpsc::channel(REPLY_CHANNEL_SIZE);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            let mut parser = ReplyLineParser::new();
            let mut accumulator = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("reply transport failed mid-stream: {e}");
                        let _ = tx.send(ReplyEvent::Failed(e.to_string())).await;
                        return;
                    }
                };
                for record in parser.push(&chunk) {
                    match record {
                        ReplyRecord::Payload(fragment) => {
                            accumulator.push_str(&fragment);
                            if tx
                                .send(ReplyEvent::Snapshot(accumulator.clone()))
                                .await
                                .is_err()
                            {
                                // Receiver dropped; nothing left to feed.
                                return;
                            }
                        }
                        ReplyRecord::Done => {
                            let _ = tx.send(ReplyEvent::Done { text: accumulator }).await;
                            return;
                        }
                    }
                }
            }

            // Clean transport close without a sentinel is normal completion.
            let _ = tx.send(ReplyEvent::Done { text: accumulator }).await;
        });

        Ok(rx)
    }

    // ── Transcription ─────────────────────────────────────────

    /// Upload captured audio (WAV) for transcription.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Transcription`] when the upload fails or the
    /// service returns an empty result.
    pub async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("capture.wav")
            .mime_str("audio/wav")
            .map_err(|e| BuddyError::Transcription(format!("bad upload part: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("chat/transcribe"))
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BuddyError::Transcription(format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(BuddyError::Transcription(format!(
                "upload rejected: HTTP {}",
                response.status().as_u16()
            )));
        }

        let reply: TranscribeReply = response
            .json()
            .await
            .map_err(|e| BuddyError::Transcription(format!("decode failed: {e}")))?;

        if reply.text.trim().is_empty() {
            return Err(BuddyError::Transcription("empty transcription".to_owned()));
        }
        Ok(reply.text)
    }

    fn check_status(response: &reqwest::Response, what: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BuddyError::Network(format!(
                "{what}: HTTP {}",
                status.as_u16()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: "http://localhost:8000/".to_owned(),
            request_timeout_secs: 5,
        })
    }

    #[test]
    fn base_url_trailing_slash_normalized() {
        let c = client();
        assert_eq!(c.url("messages"), "http://localhost:8000/messages");
        assert_eq!(c.url("/chat/stream"), "http://localhost:8000/chat/stream");
    }

    #[test]
    fn chat_request_sends_first_segment_with_wire_roles() {
        let history = vec![
            Message::user("hi"),
            Message::assistant("hello", Some("#abc".into())),
        ];
        let body = ApiClient::chat_request(&history, 7, &Identity::Guest);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["personality_id"], 7);
        assert!(json["user_id"].is_null());
        assert_eq!(json["history"][0]["role"], "user");
        assert_eq!(json["history"][0]["parts"][0], "hi");
        assert_eq!(json["history"][1]["role"], "model");
    }

    #[test]
    fn chat_request_excludes_streaming_placeholder() {
        let history = vec![
            Message::user("hi"),
            Message::streaming_placeholder(None),
        ];
        let identity = Identity::Identified("u-9".into());
        let body = ApiClient::chat_request(&history, 1, &identity);
        assert_eq!(body.history.len(), 1);
        assert_eq!(body.user_id, Some("u-9"));
    }

    #[test]
    fn identity_query_only_for_identified() {
        assert!(ApiClient::identity_query(&Identity::Guest).is_empty());
        assert_eq!(
            ApiClient::identity_query(&Identity::Identified("u-1".into())),
            vec![("user_id", "u-1".to_owned())]
        );
    }
}
