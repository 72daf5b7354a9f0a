//! Core data model: personas, messages, and caller identity.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person on this device.
    User,
    /// The active persona. The remote service calls this role `"model"`.
    Assistant,
}

impl Role {
    /// Server-side role vocabulary.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "model",
        }
    }

    /// Parse the server-side role vocabulary. Unknown roles map to
    /// `Assistant` so a stored reply is never misattributed to the user.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "user" => Self::User,
            _ => Self::Assistant,
        }
    }
}

/// One message in a persona's timeline.
///
/// `parts` stays a sequence for forward compatibility even though the
/// engine only ever populates and sends the first segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Ordered text segments; exactly one in practice.
    pub parts: Vec<String>,
    /// Accent color, inherited from the owning persona at receipt time.
    /// Only meaningful for assistant messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent: Option<String>,
    /// Creation instant (absolute).
    pub created_at: DateTime<Utc>,
    /// True only while the content is still growing. Transient; never
    /// persisted.
    #[serde(skip)]
    pub streaming: bool,
}

impl Message {
    /// A user message stamped now.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![text.into()],
            accent: None,
            created_at: Utc::now(),
            streaming: false,
        }
    }

    /// A completed assistant message stamped now.
    pub fn assistant(text: impl Into<String>, accent: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![text.into()],
            accent,
            created_at: Utc::now(),
            streaming: false,
        }
    }

    /// The empty in-flight assistant placeholder a streamed reply grows into.
    pub fn streaming_placeholder(accent: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![String::new()],
            accent,
            created_at: Utc::now(),
            streaming: true,
        }
    }

    /// The first (and only exercised) text segment.
    pub fn text(&self) -> &str {
        self.parts.first().map(String::as_str).unwrap_or_default()
    }

    /// Replace the message content with `text` (single segment).
    pub fn set_text(&mut self, text: String) {
        if self.parts.is_empty() {
            self.parts.push(text);
        } else {
            self.parts[0] = text;
        }
    }

    /// Display time in the local timezone, `HH:MM`.
    pub fn display_time(&self) -> String {
        self.created_at
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string()
    }
}

/// Avatar descriptor for a persona: either a generated look (style plus
/// seed) or a literal glyph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Avatar {
    /// Generated avatar: a style identifier and a generation seed.
    Styled { style: String, seed: String },
    /// A literal glyph, e.g. an emoji.
    Glyph(String),
}

impl Default for Avatar {
    fn default() -> Self {
        Self::Glyph("👤".to_owned())
    }
}

/// A selectable chat counterpart. Read-only to this engine; authored and
/// deleted through the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub avatar: Avatar,
    /// Accent color for this persona's messages.
    pub accent: String,
    /// User-authored (true) vs system-provided (false).
    #[serde(default)]
    pub is_custom: bool,
    /// Owning user id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// The caller's authentication state.
///
/// Identity selects the history store variant: `Identified` uses the
/// remote store exclusively, `Guest` the device-local store exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Device-scoped; no server-side account.
    Guest,
    /// Account-scoped, with an opaque user id from the auth collaborator.
    Identified(String),
}

impl Identity {
    /// The user id, when identified.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Guest => None,
            Self::Identified(id) => Some(id),
        }
    }

    /// Whether this identity has a server-side account.
    pub fn is_identified(&self) -> bool {
        matches!(self, Self::Identified(_))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn role_wire_mapping_roundtrips() {
        assert_eq!(Role::Assistant.wire_name(), "model");
        assert_eq!(Role::from_wire("model"), Role::Assistant);
        assert_eq!(Role::from_wire("user"), Role::User);
    }

    #[test]
    fn unknown_wire_role_is_assistant() {
        assert_eq!(Role::from_wire("assistant"), Role::Assistant);
        assert_eq!(Role::from_wire("narrator"), Role::Assistant);
    }

    #[test]
    fn placeholder_starts_empty_and_streaming() {
        let msg = Message::streaming_placeholder(Some("#6366f1".into()));
        assert!(msg.streaming);
        assert_eq!(msg.text(), "");
        assert_eq!(msg.accent.as_deref(), Some("#6366f1"));
    }

    #[test]
    fn set_text_replaces_first_segment_only() {
        let mut msg = Message::user("hi");
        msg.parts.push("second".into());
        msg.set_text("hello".into());
        assert_eq!(msg.parts, vec!["hello".to_owned(), "second".to_owned()]);
        assert_eq!(msg.text(), "hello");
    }

    #[test]
    fn streaming_flag_is_not_serialized() {
        let msg = Message::streaming_placeholder(None);
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("streaming").is_none());
    }

    #[test]
    fn avatar_untagged_forms_deserialize() {
        let glyph: Avatar = serde_json::from_str("\"🤖\"").unwrap();
        assert_eq!(glyph, Avatar::Glyph("🤖".into()));

        let styled: Avatar =
            serde_json::from_str(r#"{"style":"bottts","seed":"max-42"}"#).unwrap();
        assert_eq!(
            styled,
            Avatar::Styled {
                style: "bottts".into(),
                seed: "max-42".into()
            }
        );
    }

    #[test]
    fn identity_user_id() {
        assert_eq!(Identity::Guest.user_id(), None);
        assert_eq!(
            Identity::Identified("u-1".into()).user_id(),
            Some("u-1")
        );
    }
}
