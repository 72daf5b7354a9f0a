//! Remote history store for identified users.
//!
//! Thin adapter over [`ApiClient`]: history reads and bulk clears go to
//! the remote message collection filtered by persona and user id. Appends
//! are a no-op by contract — the service persists both sides of the
//! exchange while handling the chat request itself.

use std::sync::Arc;

use tracing::debug;

use crate::api::ApiClient;
use crate::error::Result;
use crate::model::{Identity, Message};

/// History adapter backed by the remote message collection.
pub struct RemoteHistory {
    api: Arc<ApiClient>,
}

impl RemoteHistory {
    /// Create a remote history adapter.
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Load the stored history for a persona. Role vocabulary mapping
    /// (`model` → assistant) happens in the API layer.
    pub async fn load(&self, persona_id: i64, identity: &Identity) -> Result<Vec<Message>> {
        self.api.fetch_messages(persona_id, identity).await
    }

    /// No-op: the service already appended the message while serving the
    /// chat request.
    pub async fn append(&self, persona_id: i64) -> Result<()> {
        debug!("persona {persona_id}: history persisted server-side, append is a no-op");
        Ok(())
    }

    /// Issue the bulk clear. On a non-success response the caller's
    /// in-memory timeline must be left untouched.
    pub async fn clear(&self, persona_id: i64, identity: &Identity) -> Result<()> {
        self.api.clear_messages(persona_id, identity).await
    }
}
